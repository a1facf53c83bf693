use super::rtp_stream_recv::RtpStreamRecv;
use super::{Producer, ProducerListener};
use crate::rtcp_packet::CompoundPacket;
use crate::rtp_parameters::{MediaKind, RtpEncodingParameters, RtpHeaderExtensionIds, RtpParameters};
use crate::scheduler::is_report_due;
use bytes::Bytes;
use log::{debug, trace, warn};
use rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use rtcp::sender_report::SenderReport;
use std::collections::BTreeMap;
use std::time::Instant;

/// Builder for [`RtpProducer`].
///
/// # Example
///
/// ```ignore
/// use rtc_sfu::{MediaKind, RtpEncodingParameters, RtpParameters, RtpProducerBuilder};
///
/// let producer = RtpProducerBuilder::new("mic", MediaKind::Audio)
///     .with_rtp_parameters(RtpParameters {
///         encodings: vec![RtpEncodingParameters {
///             ssrc: 1111,
///             clock_rate: 48000,
///             ..Default::default()
///         }],
///         ..Default::default()
///     })
///     .build();
/// ```
pub struct RtpProducerBuilder {
    id: String,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
    header_extension_ids: RtpHeaderExtensionIds,
    mapped_ssrcs: BTreeMap<u32, u32>,
}

impl RtpProducerBuilder {
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
            rtp_parameters: RtpParameters::default(),
            header_extension_ids: RtpHeaderExtensionIds::default(),
            mapped_ssrcs: BTreeMap::new(),
        }
    }

    pub fn with_rtp_parameters(mut self, rtp_parameters: RtpParameters) -> Self {
        self.rtp_parameters = rtp_parameters;
        self
    }

    pub fn with_header_extension_ids(mut self, ids: RtpHeaderExtensionIds) -> Self {
        self.header_extension_ids = ids;
        self
    }

    /// Fixes the SSRC that packets of encoding `ssrc` are relayed with.
    /// Encodings without an explicit mapping get a random one.
    pub fn with_mapped_ssrc(mut self, ssrc: u32, mapped_ssrc: u32) -> Self {
        self.mapped_ssrcs.insert(ssrc, mapped_ssrc);
        self
    }

    pub fn build(self) -> RtpProducer {
        let mapped_ssrcs = self
            .rtp_parameters
            .encodings
            .iter()
            .map(|e| {
                let mapped = self
                    .mapped_ssrcs
                    .get(&e.ssrc)
                    .copied()
                    .unwrap_or_else(rand::random::<u32>);
                (e.ssrc, mapped)
            })
            .collect();

        RtpProducer {
            id: self.id,
            kind: self.kind,
            rtp_parameters: self.rtp_parameters,
            header_extension_ids: self.header_extension_ids,
            mapped_ssrcs,
            paused: false,
            streams: BTreeMap::new(),
            last_rtcp_sent: None,
        }
    }
}

/// Producer receiving plain RTP, with optional RTX (RFC 4588) streams.
///
/// Each encoding gets a receive stream on its first packet, which raises
/// "stream enabled". Accepted packets are relayed with their SSRC rewritten
/// to the encoding's mapped SSRC; RTX packets are unwrapped first. While
/// paused, statistics keep being collected but nothing is relayed and all
/// streams are reported disabled.
pub struct RtpProducer {
    id: String,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
    header_extension_ids: RtpHeaderExtensionIds,
    mapped_ssrcs: BTreeMap<u32, u32>,
    paused: bool,
    streams: BTreeMap<u32, RtpStreamRecv>,
    last_rtcp_sent: Option<Instant>,
}

impl RtpProducer {
    pub fn rtp_parameters(&self) -> &RtpParameters {
        &self.rtp_parameters
    }

    /// SSRC that packets of the encoding with primary SSRC `ssrc` are
    /// relayed with.
    pub fn mapped_ssrc(&self, ssrc: u32) -> Option<u32> {
        self.mapped_ssrcs.get(&ssrc).copied()
    }

    /// Packets received on the encoding with primary SSRC `ssrc`.
    pub fn packet_count(&self, ssrc: u32) -> u64 {
        self.streams.get(&ssrc).map_or(0, RtpStreamRecv::packet_count)
    }

    fn default_clock_rate(&self) -> u32 {
        match self.kind {
            MediaKind::Audio => 48000,
            MediaKind::Video => 90000,
        }
    }

    /// Restores the original packet carried in an RTX payload.
    fn unwrap_rtx(
        encoding: &RtpEncodingParameters,
        mut packet: rtp::packet::Packet,
    ) -> Option<rtp::packet::Packet> {
        if packet.payload.len() < 2 {
            return None;
        }

        let original_seq = u16::from_be_bytes([packet.payload[0], packet.payload[1]]);
        packet.payload = Bytes::copy_from_slice(&packet.payload[2..]);
        packet.header.ssrc = encoding.ssrc;
        packet.header.sequence_number = original_seq;
        if encoding.payload_type != 0 {
            packet.header.payload_type = encoding.payload_type;
        }

        Some(packet)
    }
}

impl Producer for RtpProducer {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn ssrcs(&self) -> Vec<u32> {
        self.rtp_parameters.ssrcs()
    }

    fn rtp_header_extension_ids(&self) -> RtpHeaderExtensionIds {
        self.header_extension_ids
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn get_rtcp(&mut self, packet: &mut CompoundPacket, now: Instant) {
        if self.streams.is_empty() || !is_report_due(self.kind, self.last_rtcp_sent, now) {
            return;
        }

        for stream in self.streams.values_mut() {
            packet.add_receiver_report(stream.reception_report(now));
        }

        self.last_rtcp_sent = Some(now);
    }

    fn receive_rtp_packet(
        &mut self,
        now: Instant,
        packet: rtp::packet::Packet,
        listener: &mut dyn ProducerListener,
    ) {
        let ssrc = packet.header.ssrc;
        let Some(encoding) = self.rtp_parameters.encoding_for_ssrc(ssrc) else {
            warn!("producer {}: no encoding for ssrc {}", self.id, ssrc);
            return;
        };

        let packet = if ssrc == encoding.ssrc {
            packet
        } else if encoding.rtx.is_some_and(|rtx| rtx.ssrc == ssrc) {
            match Self::unwrap_rtx(encoding, packet) {
                Some(packet) => packet,
                None => {
                    debug!("producer {}: empty rtx packet on ssrc {}", self.id, ssrc);
                    return;
                }
            }
        } else {
            trace!("producer {}: ignoring fec packet on ssrc {}", self.id, ssrc);
            return;
        };

        let primary_ssrc = encoding.ssrc;
        let clock_rate = if encoding.clock_rate == 0 {
            self.default_clock_rate()
        } else {
            encoding.clock_rate
        };
        let mapped_ssrc = self.mapped_ssrcs.get(&primary_ssrc).copied().unwrap_or(primary_ssrc);

        let stream = self
            .streams
            .entry(primary_ssrc)
            .or_insert_with(|| RtpStreamRecv::new(primary_ssrc, mapped_ssrc, clock_rate));
        stream.receive_packet(now, &packet.header);

        if self.paused {
            return;
        }

        if !stream.is_enabled() {
            stream.set_enabled(true);
            listener.on_producer_stream_enabled(&self.id, primary_ssrc, mapped_ssrc);
        }

        let mut packet = packet;
        packet.header.ssrc = mapped_ssrc;
        listener.on_producer_rtp_packet_received(&self.id, packet);
    }

    fn receive_rtcp_sender_report(&mut self, now: Instant, report: &SenderReport) {
        match self.streams.get_mut(&report.ssrc) {
            Some(stream) => stream.receive_sender_report(now, report.ntp_time),
            None => trace!(
                "producer {}: sender report for ssrc {} before any rtp",
                self.id, report.ssrc
            ),
        }
    }

    fn pause(&mut self, listener: &mut dyn ProducerListener) {
        if self.paused {
            return;
        }
        self.paused = true;

        for stream in self.streams.values_mut().filter(|s| s.is_enabled()) {
            stream.set_enabled(false);
            listener.on_producer_stream_disabled(&self.id, stream.ssrc(), stream.mapped_ssrc());
        }
        listener.on_producer_paused(&self.id);
    }

    fn resume(&mut self, listener: &mut dyn ProducerListener) {
        if !self.paused {
            return;
        }
        self.paused = false;
        listener.on_producer_resumed(&self.id);
    }

    /// Sends a PLI for every video stream received so far.
    fn request_key_frame(&mut self, listener: &mut dyn ProducerListener) {
        if self.kind != MediaKind::Video || self.paused {
            return;
        }

        for &ssrc in self.streams.keys() {
            debug!("producer {}: requesting key frame on ssrc {}", self.id, ssrc);
            listener.on_producer_send_rtcp_packet(
                &self.id,
                Box::new(PictureLossIndication {
                    sender_ssrc: 0,
                    media_ssrc: ssrc,
                }),
            );
        }
    }

    fn close(&mut self) {
        debug!("producer {} closed", self.id);
        self.streams.clear();
    }
}
