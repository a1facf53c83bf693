//! Outbound media sinks attached to a transport.

mod rate_calculator;
mod rtp_consumer;
mod rtp_stream_send;
mod send_buffer;

pub use rate_calculator::RateCalculator;
pub use rtp_consumer::{ConsumerStats, RtpConsumer, RtpConsumerBuilder};

use crate::registry::Registry;
use crate::rtcp_packet::{CompoundPacket, KeyFrameRequestKind};
use crate::rtp_parameters::{MediaKind, RtpParameters};
use rtcp::reception_report::ReceptionReport;
use rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use std::time::Instant;

/// Callbacks a consumer raises toward its transport.
pub trait ConsumerListener {
    /// Asks the transport to put `packet` on the wire.
    fn on_consumer_send_rtp_packet(&mut self, consumer_id: &str, packet: &rtp::packet::Packet);
    /// The remote endpoint, or the transport, wants a key frame on `ssrc`.
    fn on_consumer_key_frame_requested(&mut self, consumer_id: &str, ssrc: u32);
}

/// A media sink owned by a transport.
///
/// Feedback is only routed to a consumer once it reports itself started.
pub trait Consumer {
    fn id(&self) -> &str;

    fn kind(&self) -> MediaKind;

    fn is_started(&self) -> bool;

    /// Marks the consumer as actively sending.
    fn start(&mut self);

    fn parameters(&self) -> &RtpParameters;

    /// Appends Sender Reports and SDES chunks for the consumer's streams.
    fn get_rtcp(&mut self, packet: &mut CompoundPacket, now: Instant);

    /// Current send rate in bits per second.
    fn transmission_rate(&mut self, now: Instant) -> u32;

    fn send_rtp_packet(
        &mut self,
        now: Instant,
        packet: rtp::packet::Packet,
        listener: &mut dyn ConsumerListener,
    );

    fn receive_rtcp_receiver_report(&mut self, report: &ReceptionReport);

    fn receive_key_frame_request(
        &mut self,
        kind: KeyFrameRequestKind,
        ssrc: u32,
        listener: &mut dyn ConsumerListener,
    );

    fn receive_nack(
        &mut self,
        now: Instant,
        nack: &TransportLayerNack,
        listener: &mut dyn ConsumerListener,
    );

    fn request_key_frame(&mut self, listener: &mut dyn ConsumerListener);

    /// Releases resources. Called exactly once, when the consumer leaves
    /// its transport.
    fn close(&mut self) {}
}

impl Registry<Box<dyn Consumer>> {
    /// First started consumer, in registry order, that sends on `ssrc` as
    /// the primary, RTX or FEC SSRC of one of its encodings.
    pub fn started_consumer_mut(&mut self, ssrc: u32) -> Option<&mut Box<dyn Consumer>> {
        self.values_mut()
            .find(|c| c.is_started() && c.parameters().has_ssrc(ssrc))
    }
}
