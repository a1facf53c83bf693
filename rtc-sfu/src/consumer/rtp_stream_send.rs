use log::warn;
use rtcp::sender_report::SenderReport;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET_SECS: u64 = 0x83AA_7E80;

/// Send-side state of one consumer encoding, feeding its Sender Reports
/// (RFC 3550 section 6.4.1).
pub(crate) struct RtpStreamSend {
    ssrc: u32,
    clock_rate: f64,

    started: bool,
    highest_seq: u16,
    last_rtp_timestamp: u32,
    last_rtp_timestamp_at: Instant,

    // wall clock anchor for NTP timestamps
    anchor: Instant,
    anchor_since_unix_epoch: Duration,

    packet_count: u32,
    octet_count: u32,
}

impl RtpStreamSend {
    pub(crate) fn new(ssrc: u32, clock_rate: u32, now: Instant) -> Self {
        Self {
            ssrc,
            clock_rate: clock_rate as f64,

            started: false,
            highest_seq: 0,
            last_rtp_timestamp: 0,
            last_rtp_timestamp_at: now,

            anchor: now,
            anchor_since_unix_epoch: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default(),

            packet_count: 0,
            octet_count: 0,
        }
    }

    pub(crate) fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub(crate) fn has_sent(&self) -> bool {
        self.started
    }

    pub(crate) fn on_packet_sent(&mut self, now: Instant, packet: &rtp::packet::Packet) {
        let seq = packet.header.sequence_number;
        let diff = seq.wrapping_sub(self.highest_seq);

        // out-of-order packets keep the RTP/NTP mapping untouched
        if !self.started || (diff > 0 && diff < (1 << 15)) {
            self.started = true;
            self.highest_seq = seq;
            if packet.header.timestamp != self.last_rtp_timestamp {
                self.last_rtp_timestamp = packet.header.timestamp;
                self.last_rtp_timestamp_at = now;
            }
        }

        self.packet_count = self.packet_count.wrapping_add(1);
        let octets = u32::try_from(packet.payload.len()).unwrap_or_else(|_| {
            warn!("ssrc {}: payload larger than 32 bits", self.ssrc);
            u32::MAX
        });
        self.octet_count = self.octet_count.wrapping_add(octets);
    }

    pub(crate) fn sender_report(&self, now: Instant) -> SenderReport {
        let elapsed = now.saturating_duration_since(self.last_rtp_timestamp_at);

        SenderReport {
            ssrc: self.ssrc,
            ntp_time: self.ntp(now),
            rtp_time: self
                .last_rtp_timestamp
                .wrapping_add((elapsed.as_secs_f64() * self.clock_rate) as u32),
            packet_count: self.packet_count,
            octet_count: self.octet_count,
            ..Default::default()
        }
    }

    fn ntp(&self, now: Instant) -> u64 {
        let unix = now.saturating_duration_since(self.anchor) + self.anchor_since_unix_epoch;
        let secs = unix.as_secs() + NTP_UNIX_OFFSET_SECS;
        let frac = (u64::from(unix.subsec_nanos()) << 32) / 1_000_000_000;
        secs << 32 | frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn packet(seq: u16, timestamp: u32, len: usize) -> rtp::packet::Packet {
        rtp::packet::Packet {
            header: rtp::header::Header {
                ssrc: 2000,
                sequence_number: seq,
                timestamp,
                ..Default::default()
            },
            payload: Bytes::from(vec![0u8; len]),
            ..Default::default()
        }
    }

    #[test]
    fn test_sender_report_counters() {
        let now = Instant::now();
        let mut stream = RtpStreamSend::new(2000, 90000, now);
        assert!(!stream.has_sent());

        stream.on_packet_sent(now, &packet(1, 3000, 100));
        stream.on_packet_sent(now, &packet(2, 3000, 50));

        let sr = stream.sender_report(now);
        assert!(stream.has_sent());
        assert_eq!(sr.ssrc, 2000);
        assert_eq!(sr.packet_count, 2);
        assert_eq!(sr.octet_count, 150);
        assert_eq!(sr.rtp_time, 3000);
    }

    #[test]
    fn test_rtp_time_advances_with_clock() {
        let now = Instant::now();
        let mut stream = RtpStreamSend::new(2000, 90000, now);
        stream.on_packet_sent(now, &packet(1, 3000, 10));

        let later = now + Duration::from_millis(100);
        let sr = stream.sender_report(later);
        assert_eq!(sr.rtp_time, 3000 + 9000);
        assert!(sr.ntp_time > stream.sender_report(now).ntp_time);
    }

    #[test]
    fn test_out_of_order_keeps_mapping() {
        let now = Instant::now();
        let mut stream = RtpStreamSend::new(2000, 90000, now);
        stream.on_packet_sent(now, &packet(10, 9000, 10));
        stream.on_packet_sent(now, &packet(9, 6000, 10));

        let sr = stream.sender_report(now);
        assert_eq!(sr.rtp_time, 9000);
        assert_eq!(sr.packet_count, 2);
    }
}
