use rtcp::reception_report::ReceptionReport;
use std::time::Instant;

/// Sequence numbers tracked per bitmap word.
const SEQS_PER_WORD: usize = 64;
/// Bitmap words, covering 8192 sequence numbers.
const WORDS: usize = 128;

const MAX_TOTAL_LOST: u32 = 0xFF_FFFF;

/// Receive-side statistics of one producer encoding, as reported in
/// RTCP reception report blocks (RFC 3550 section 6.4.1).
pub(crate) struct RtpStreamRecv {
    ssrc: u32,
    mapped_ssrc: u32,
    clock_rate: f64,
    enabled: bool,

    received: Vec<u64>,
    started: bool,
    cycles: u16,
    highest_seq: u16,
    last_report_seq: u16,
    packet_count: u64,

    last_rtp_timestamp: u32,
    last_arrival: Option<Instant>,
    jitter: f64,

    last_sr_ntp_middle: u32,
    last_sr_received_at: Option<Instant>,
    total_lost: u32,
}

impl RtpStreamRecv {
    pub(crate) fn new(ssrc: u32, mapped_ssrc: u32, clock_rate: u32) -> Self {
        Self {
            ssrc,
            mapped_ssrc,
            clock_rate: clock_rate as f64,
            enabled: false,

            received: vec![0u64; WORDS],
            started: false,
            cycles: 0,
            highest_seq: 0,
            last_report_seq: 0,
            packet_count: 0,

            last_rtp_timestamp: 0,
            last_arrival: None,
            jitter: 0.0,

            last_sr_ntp_middle: 0,
            last_sr_received_at: None,
            total_lost: 0,
        }
    }

    pub(crate) fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub(crate) fn mapped_ssrc(&self) -> u32 {
        self.mapped_ssrc
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn packet_count(&self) -> u64 {
        self.packet_count
    }

    fn slot(seq: u16) -> (usize, u64) {
        let pos = (seq as usize) % (WORDS * SEQS_PER_WORD);
        (pos / SEQS_PER_WORD, 1u64 << (pos % SEQS_PER_WORD))
    }

    fn mark(&mut self, seq: u16, received: bool) {
        let (word, bit) = Self::slot(seq);
        if received {
            self.received[word] |= bit;
        } else {
            self.received[word] &= !bit;
        }
    }

    fn is_received(&self, seq: u16) -> bool {
        let (word, bit) = Self::slot(seq);
        self.received[word] & bit != 0
    }

    pub(crate) fn receive_packet(&mut self, now: Instant, header: &rtp::header::Header) {
        let seq = header.sequence_number;
        self.packet_count += 1;
        self.mark(seq, true);

        if !self.started {
            self.started = true;
            self.highest_seq = seq;
            self.last_report_seq = seq.wrapping_sub(1);
        } else {
            let diff = seq.wrapping_sub(self.highest_seq);
            if diff > 0 && diff < (1 << 15) {
                if seq < self.highest_seq {
                    self.cycles = self.cycles.wrapping_add(1);
                }

                let mut missing = self.highest_seq.wrapping_add(1);
                while missing != seq {
                    self.mark(missing, false);
                    missing = missing.wrapping_add(1);
                }

                self.highest_seq = seq;
            }
        }

        // RFC 3550 appendix A.8
        if let Some(last_arrival) = self.last_arrival {
            let transit_delta = now.duration_since(last_arrival).as_secs_f64() * self.clock_rate
                - (header.timestamp as f64 - self.last_rtp_timestamp as f64);
            self.jitter += (transit_delta.abs() - self.jitter) / 16.0;
        }
        self.last_rtp_timestamp = header.timestamp;
        self.last_arrival = Some(now);
    }

    pub(crate) fn receive_sender_report(&mut self, now: Instant, ntp_time: u64) {
        self.last_sr_ntp_middle = (ntp_time >> 16) as u32;
        self.last_sr_received_at = Some(now);
    }

    /// Builds the reception report block covering packets since the
    /// previous call.
    pub(crate) fn reception_report(&mut self, now: Instant) -> ReceptionReport {
        let expected = self.highest_seq.wrapping_sub(self.last_report_seq);

        let mut lost = 0u32;
        let mut seq = self.last_report_seq.wrapping_add(1);
        while seq != self.highest_seq {
            if !self.is_received(seq) {
                lost += 1;
            }
            seq = seq.wrapping_add(1);
        }

        self.total_lost = self.total_lost.saturating_add(lost).min(MAX_TOTAL_LOST);

        let fraction_lost = if expected > 0 {
            ((lost.min(MAX_TOTAL_LOST) * 256) as f64 / expected as f64).min(255.0) as u8
        } else {
            0
        };

        let delay = self
            .last_sr_received_at
            .map(|at| (now.duration_since(at).as_secs_f64() * 65536.0) as u32)
            .unwrap_or(0);

        self.last_report_seq = self.highest_seq;

        ReceptionReport {
            ssrc: self.ssrc,
            fraction_lost,
            total_lost: self.total_lost,
            last_sequence_number: (self.cycles as u32) << 16 | self.highest_seq as u32,
            jitter: self.jitter as u32,
            last_sender_report: self.last_sr_ntp_middle,
            delay,
        }
    }
}
