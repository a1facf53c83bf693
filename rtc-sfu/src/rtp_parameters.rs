//! RTP parameters shared by producers and consumers.

/// Kind of media carried by a producer or consumer.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MediaKind {
    #[default]
    Audio,
    Video,
}

/// Retransmission (RFC 4588) stream bound to an encoding.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RtxParameters {
    pub ssrc: u32,
    pub payload_type: u8,
}

/// Forward error correction stream bound to an encoding.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct FecParameters {
    pub ssrc: u32,
}

/// One encoding (simulcast layer) of an RTP stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RtpEncodingParameters {
    /// Primary SSRC of the encoding.
    pub ssrc: u32,
    /// RID of the encoding, empty when not signalled.
    pub rid: String,
    pub payload_type: u8,
    pub clock_rate: u32,
    pub rtx: Option<RtxParameters>,
    pub fec: Option<FecParameters>,
}

impl RtpEncodingParameters {
    /// Returns true if `ssrc` is the primary, RTX or FEC SSRC of this encoding.
    pub fn has_ssrc(&self, ssrc: u32) -> bool {
        self.ssrc == ssrc
            || self.rtx.is_some_and(|rtx| rtx.ssrc == ssrc)
            || self.fec.is_some_and(|fec| fec.ssrc == ssrc)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RtpParameters {
    pub mid: String,
    pub cname: String,
    pub encodings: Vec<RtpEncodingParameters>,
}

impl RtpParameters {
    pub fn has_ssrc(&self, ssrc: u32) -> bool {
        self.encodings.iter().any(|e| e.has_ssrc(ssrc))
    }

    /// Returns the encoding whose primary, RTX or FEC SSRC is `ssrc`.
    pub fn encoding_for_ssrc(&self, ssrc: u32) -> Option<&RtpEncodingParameters> {
        self.encodings.iter().find(|e| e.has_ssrc(ssrc))
    }

    /// All SSRCs announced by the encodings, primary first then RTX and FEC.
    pub fn ssrcs(&self) -> Vec<u32> {
        let mut ssrcs: Vec<u32> = self.encodings.iter().map(|e| e.ssrc).collect();
        ssrcs.extend(self.encodings.iter().filter_map(|e| e.rtx.map(|rtx| rtx.ssrc)));
        ssrcs.extend(self.encodings.iter().filter_map(|e| e.fec.map(|fec| fec.ssrc)));
        ssrcs
    }
}

/// Header extension ids negotiated for a transport, `0` meaning unset.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RtpHeaderExtensionIds {
    pub abs_send_time: u8,
    pub mid: u8,
    pub rid: u8,
}

impl RtpHeaderExtensionIds {
    /// Fills every unset slot with the corresponding id from `other`.
    /// Slots already set are kept, so the first producer announcing an
    /// id decides it for the whole transport.
    pub fn merge(&mut self, other: &RtpHeaderExtensionIds) {
        if self.abs_send_time == 0 {
            self.abs_send_time = other.abs_send_time;
        }
        if self.mid == 0 {
            self.mid = other.mid;
        }
        if self.rid == 0 {
            self.rid = other.rid;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoding(ssrc: u32, rtx: Option<u32>, fec: Option<u32>) -> RtpEncodingParameters {
        RtpEncodingParameters {
            ssrc,
            rtx: rtx.map(|ssrc| RtxParameters {
                ssrc,
                payload_type: 97,
            }),
            fec: fec.map(|ssrc| FecParameters { ssrc }),
            ..Default::default()
        }
    }

    #[test]
    fn test_has_ssrc_checks_every_role() {
        let params = RtpParameters {
            encodings: vec![encoding(1000, Some(1001), None), encoding(2000, None, Some(2002))],
            ..Default::default()
        };

        assert!(params.has_ssrc(1000));
        assert!(params.has_ssrc(1001));
        assert!(params.has_ssrc(2000));
        assert!(params.has_ssrc(2002));
        assert!(!params.has_ssrc(1002));
        assert!(!params.has_ssrc(2001));

        assert_eq!(params.encoding_for_ssrc(2002).map(|e| e.ssrc), Some(2000));
        assert_eq!(params.ssrcs(), vec![1000, 2000, 1001, 2002]);
    }

    #[test]
    fn test_header_extension_ids_first_writer_wins() {
        let mut ids = RtpHeaderExtensionIds::default();

        ids.merge(&RtpHeaderExtensionIds {
            abs_send_time: 3,
            mid: 0,
            rid: 5,
        });
        ids.merge(&RtpHeaderExtensionIds {
            abs_send_time: 7,
            mid: 1,
            rid: 9,
        });

        assert_eq!(
            ids,
            RtpHeaderExtensionIds {
                abs_send_time: 3,
                mid: 1,
                rid: 5,
            }
        );
    }
}
