use super::rate_calculator::RateCalculator;
use super::rtp_stream_send::RtpStreamSend;
use super::send_buffer::SendBuffer;
use super::{Consumer, ConsumerListener};
use crate::error::{Error, Result};
use crate::rtcp_packet::{CompoundPacket, KeyFrameRequestKind};
use crate::rtp_parameters::{MediaKind, RtpEncodingParameters, RtpParameters};
use crate::scheduler::is_report_due;
use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, trace, warn};
use rtcp::reception_report::ReceptionReport;
use rtcp::source_description::{SdesType, SourceDescriptionChunk, SourceDescriptionItem};
use rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use std::time::{Duration, Instant};
use util::marshal::MarshalSize;

const DEFAULT_SEND_BUFFER_SIZE: u16 = 1024;

/// Builder for [`RtpConsumer`].
///
/// # Example
///
/// ```ignore
/// use rtc_sfu::{MediaKind, RtpConsumerBuilder, RtpEncodingParameters, RtpParameters};
/// use std::time::Instant;
///
/// let consumer = RtpConsumerBuilder::new("viewer-1", MediaKind::Video)
///     .with_rtp_parameters(RtpParameters {
///         encodings: vec![RtpEncodingParameters {
///             ssrc: 2222,
///             clock_rate: 90000,
///             ..Default::default()
///         }],
///         ..Default::default()
///     })
///     .with_send_buffer_size(512)
///     .build(Instant::now())?;
/// ```
pub struct RtpConsumerBuilder {
    id: String,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
    send_buffer_size: u16,
    rate_window: Duration,
}

impl RtpConsumerBuilder {
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
            rtp_parameters: RtpParameters::default(),
            send_buffer_size: DEFAULT_SEND_BUFFER_SIZE,
            rate_window: Duration::from_secs(1),
        }
    }

    /// Only the first encoding is sent on.
    pub fn with_rtp_parameters(mut self, rtp_parameters: RtpParameters) -> Self {
        self.rtp_parameters = rtp_parameters;
        self
    }

    /// Number of sent packets kept for retransmission. Must be a power of two.
    pub fn with_send_buffer_size(mut self, size: u16) -> Self {
        self.send_buffer_size = size;
        self
    }

    /// Window over which the transmission rate is averaged.
    pub fn with_rate_window(mut self, window: Duration) -> Self {
        self.rate_window = window;
        self
    }

    pub fn build(self, now: Instant) -> Result<RtpConsumer> {
        let encoding = self
            .rtp_parameters
            .encodings
            .first()
            .cloned()
            .ok_or_else(|| Error::ErrNotFound(format!("encoding of consumer {}", self.id)))?;

        let clock_rate = match (encoding.clock_rate, self.kind) {
            (0, MediaKind::Audio) => 48000,
            (0, MediaKind::Video) => 90000,
            (rate, _) => rate,
        };

        Ok(RtpConsumer {
            id: self.id,
            kind: self.kind,
            rtp_parameters: self.rtp_parameters,
            started: false,
            stream: RtpStreamSend::new(encoding.ssrc, clock_rate, now),
            encoding,
            send_buffer: SendBuffer::new(self.send_buffer_size)?,
            rate: RateCalculator::new(self.rate_window),
            rtx_sequence_number: rand::random::<u16>(),
            last_rtcp_sent: None,
            last_reception_report: None,
            stats: ConsumerStats::default(),
        })
    }
}

/// Feedback counters of a consumer.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    pub pli_count: u32,
    pub fir_count: u32,
    pub nack_count: u32,
    pub retransmitted_packets: u32,
}

/// Consumer forwarding one RTP stream.
///
/// Outgoing packets are rewritten to the consumer's SSRC, counted for
/// Sender Reports and the transmission rate, and kept in a send buffer so
/// that NACKed packets can be resent, RTX-wrapped when the encoding has an
/// RTX stream.
pub struct RtpConsumer {
    id: String,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
    encoding: RtpEncodingParameters,
    started: bool,
    stream: RtpStreamSend,
    send_buffer: SendBuffer,
    rate: RateCalculator,
    rtx_sequence_number: u16,
    last_rtcp_sent: Option<Instant>,
    last_reception_report: Option<ReceptionReport>,
    stats: ConsumerStats,
}

impl RtpConsumer {
    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Fraction of packets lost as last reported by the remote endpoint,
    /// in 1/256 units.
    pub fn fraction_lost(&self) -> Option<u8> {
        self.last_reception_report.as_ref().map(|r| r.fraction_lost)
    }

    fn send(&mut self, now: Instant, packet: &rtp::packet::Packet, listener: &mut dyn ConsumerListener) {
        self.rate.update(packet.header.marshal_size() + packet.payload.len(), now);
        listener.on_consumer_send_rtp_packet(&self.id, packet);
    }

    /// Wraps `packet` per RFC 4588: RTX SSRC and payload type, own sequence
    /// numbering, original sequence number prepended to the payload.
    fn rtx_packet(&mut self, packet: &rtp::packet::Packet) -> Option<rtp::packet::Packet> {
        let rtx = self.encoding.rtx?;

        let mut payload = BytesMut::with_capacity(2 + packet.payload.len());
        payload.put_u16(packet.header.sequence_number);
        payload.put_slice(&packet.payload);

        let mut header = packet.header.clone();
        header.ssrc = rtx.ssrc;
        header.payload_type = rtx.payload_type;
        header.sequence_number = self.rtx_sequence_number;
        self.rtx_sequence_number = self.rtx_sequence_number.wrapping_add(1);

        Some(rtp::packet::Packet {
            header,
            payload: payload.freeze(),
        })
    }
}

/// Sequence numbers named by a NACK FCI list (RFC 4585 section 6.2.1).
fn nacked_sequence_numbers(nack: &TransportLayerNack) -> Vec<u16> {
    let mut seqs = vec![];
    for pair in &nack.nacks {
        seqs.push(pair.packet_id);
        for bit in 0..16u16 {
            if pair.lost_packets & (1 << bit) != 0 {
                seqs.push(pair.packet_id.wrapping_add(bit + 1));
            }
        }
    }
    seqs
}

impl Consumer for RtpConsumer {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn start(&mut self) {
        self.started = true;
    }

    fn parameters(&self) -> &RtpParameters {
        &self.rtp_parameters
    }

    fn get_rtcp(&mut self, packet: &mut CompoundPacket, now: Instant) {
        if !self.started
            || !self.stream.has_sent()
            || !is_report_due(self.kind, self.last_rtcp_sent, now)
        {
            return;
        }

        packet.add_sender_report(self.stream.sender_report(now));
        if !self.rtp_parameters.cname.is_empty() {
            packet.add_sdes_chunk(SourceDescriptionChunk {
                source: self.stream.ssrc(),
                items: vec![SourceDescriptionItem {
                    sdes_type: SdesType::SdesCname,
                    text: Bytes::from(self.rtp_parameters.cname.clone()),
                }],
            });
        }

        self.last_rtcp_sent = Some(now);
    }

    fn transmission_rate(&mut self, now: Instant) -> u32 {
        self.rate.rate(now)
    }

    fn send_rtp_packet(
        &mut self,
        now: Instant,
        mut packet: rtp::packet::Packet,
        listener: &mut dyn ConsumerListener,
    ) {
        if !self.started {
            trace!("consumer {} not started, dropping rtp packet", self.id);
            return;
        }

        packet.header.ssrc = self.encoding.ssrc;
        if self.encoding.payload_type != 0 {
            packet.header.payload_type = self.encoding.payload_type;
        }

        self.stream.on_packet_sent(now, &packet);
        self.send(now, &packet, listener);
        self.send_buffer.add(packet);
    }

    fn receive_rtcp_receiver_report(&mut self, report: &ReceptionReport) {
        trace!(
            "consumer {}: receiver report, fraction lost {}, jitter {}",
            self.id, report.fraction_lost, report.jitter
        );
        self.last_reception_report = Some(report.clone());
    }

    fn receive_key_frame_request(
        &mut self,
        kind: KeyFrameRequestKind,
        ssrc: u32,
        listener: &mut dyn ConsumerListener,
    ) {
        match kind {
            KeyFrameRequestKind::Pli => self.stats.pli_count += 1,
            KeyFrameRequestKind::Fir => self.stats.fir_count += 1,
        }

        if self.kind != MediaKind::Video {
            warn!("consumer {}: key frame request on audio ssrc {}", self.id, ssrc);
            return;
        }

        listener.on_consumer_key_frame_requested(&self.id, self.encoding.ssrc);
    }

    fn receive_nack(
        &mut self,
        now: Instant,
        nack: &TransportLayerNack,
        listener: &mut dyn ConsumerListener,
    ) {
        self.stats.nack_count += 1;

        for seq in nacked_sequence_numbers(nack) {
            let Some(original) = self.send_buffer.get(seq).cloned() else {
                debug!("consumer {}: nacked packet {} not in send buffer", self.id, seq);
                continue;
            };

            let packet = self.rtx_packet(&original).unwrap_or(original);
            self.stats.retransmitted_packets += 1;
            self.send(now, &packet, listener);
        }
    }

    fn request_key_frame(&mut self, listener: &mut dyn ConsumerListener) {
        if self.kind != MediaKind::Video {
            return;
        }
        listener.on_consumer_key_frame_requested(&self.id, self.encoding.ssrc);
    }

    fn close(&mut self) {
        debug!("consumer {} closed", self.id);
        self.started = false;
    }
}
