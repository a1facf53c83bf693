//! Inbound media sources attached to a transport.

mod rtp_producer;
mod rtp_stream_recv;

pub use rtp_producer::{RtpProducer, RtpProducerBuilder};

use crate::rtcp_packet::CompoundPacket;
use crate::rtp_parameters::{MediaKind, RtpHeaderExtensionIds};
use rtcp::sender_report::SenderReport;
use rtcp::source_description::SourceDescriptionChunk;
use std::time::Instant;

/// Callbacks a producer raises toward its transport.
pub trait ProducerListener {
    fn on_producer_paused(&mut self, producer_id: &str);
    fn on_producer_resumed(&mut self, producer_id: &str);
    fn on_producer_stream_enabled(&mut self, producer_id: &str, ssrc: u32, mapped_ssrc: u32);
    fn on_producer_stream_disabled(&mut self, producer_id: &str, ssrc: u32, mapped_ssrc: u32);
    fn on_producer_rtp_packet_received(&mut self, producer_id: &str, packet: rtp::packet::Packet);
    /// Sends RTCP feedback toward the remote sender of the producer.
    fn on_producer_send_rtcp_packet(
        &mut self,
        producer_id: &str,
        packet: Box<dyn rtcp::packet::Packet + Send + Sync>,
    );
}

/// A media source owned by a transport.
///
/// The transport demultiplexes incoming RTP to a producer by the SSRCs
/// returned from [`Producer::ssrcs`] and routes Sender Reports and SDES
/// chunks the same way.
pub trait Producer {
    fn id(&self) -> &str;

    fn kind(&self) -> MediaKind;

    /// Every SSRC the producer sends on, including RTX and FEC streams.
    fn ssrcs(&self) -> Vec<u32>;

    fn rtp_header_extension_ids(&self) -> RtpHeaderExtensionIds;

    fn is_paused(&self) -> bool;

    /// Appends reception report blocks for the producer's streams.
    fn get_rtcp(&mut self, packet: &mut CompoundPacket, now: Instant);

    fn receive_rtp_packet(
        &mut self,
        now: Instant,
        packet: rtp::packet::Packet,
        listener: &mut dyn ProducerListener,
    );

    fn receive_rtcp_sender_report(&mut self, now: Instant, report: &SenderReport);

    fn receive_rtcp_sdes_chunk(&mut self, _chunk: &SourceDescriptionChunk) {}

    fn pause(&mut self, listener: &mut dyn ProducerListener);

    fn resume(&mut self, listener: &mut dyn ProducerListener);

    /// Asks the remote sender for a key frame through
    /// [`ProducerListener::on_producer_send_rtcp_packet`].
    fn request_key_frame(&mut self, _listener: &mut dyn ProducerListener) {}

    /// Releases resources. Called exactly once, when the producer leaves
    /// its transport.
    fn close(&mut self) {}
}
