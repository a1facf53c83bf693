//! RTC SFU - Sans-IO media routing core of a selective forwarding unit transport.
//!
//! A [`Transport`] owns the producers (inbound media sources) and consumers
//! (outbound media sinks) attached to one WebRTC connection. It routes
//! received RTP to producers by SSRC, routes received RTCP feedback to
//! producers, consumers and the bitrate estimate, and periodically emits
//! compound RTCP on a jittered timer.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Transport`] | Lifecycle, routing and RTCP scheduling; implements [`sansio::Protocol`] |
//! | [`Registry`] | Id-keyed collection of producers or consumers |
//! | [`RtpStreamRegistry`] | Maps incoming SSRCs to the producer owning them |
//! | [`RtcpDispatcher`] | Routes parsed RTCP to its targets |
//! | [`BitrateEstimator`] | Incoming bitrate ceiling and REMB-driven outgoing estimate |
//! | [`RtcpScheduler`] | RTCP timer with a rate-dependent, jittered interval |
//! | [`CompoundPacket`] | Outgoing compound RTCP under construction |
//!
//! ## Media endpoints
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RtpProducer`] | Receives RTP (with RTX), keeps receive statistics, relays with a mapped SSRC |
//! | [`RtpConsumer`] | Forwards RTP, answers NACKs (with RTX), emits Sender Reports |
//!
//! Custom endpoints plug in through the [`Producer`] and [`Consumer`] traits.
//!
//! # Sans-IO
//!
//! The transport performs no I/O and reads no clock. Received packets go
//! in through `handle_read`, RTP to forward through `handle_write`; wire
//! datagrams come out of `poll_write` and notifications out of
//! `poll_event`. The RTCP timer is driven by `poll_timeout` and
//! `handle_timeout`.
//!
//! ```ignore
//! use rtc_sfu::{Packet, TransportBuilder, TransportMessage};
//! use sansio::Protocol;
//! use std::time::Instant;
//!
//! let mut transport = TransportBuilder::new("transport-1").build(Instant::now());
//! transport.set_connected(Instant::now(), true);
//!
//! transport.handle_read(TransportMessage {
//!     now: Instant::now(),
//!     message: Packet::Rtcp(packets),
//! })?;
//!
//! while let Some(transmit) = transport.poll_write() {
//!     socket.send(&transmit.message)?;
//! }
//! while let Some(event) = transport.poll_event() {
//!     println!("{event:?}");
//! }
//! if let Some(deadline) = transport.poll_timeout() {
//!     // sleep until deadline, then
//!     transport.handle_timeout(deadline)?;
//! }
//! ```
#![warn(rust_2018_idioms)]
#![allow(dead_code)]

mod bitrate;
mod consumer;
mod dispatcher;
mod error;
mod producer;
mod registry;
mod rtcp_packet;
mod rtp_parameters;
mod rtp_stream_registry;
mod scheduler;
mod transport;

pub use bitrate::{BitrateEstimator, MIN_INCOMING_BITRATE};
pub use consumer::{
    Consumer, ConsumerListener, ConsumerStats, RateCalculator, RtpConsumer, RtpConsumerBuilder,
};
pub use dispatcher::RtcpDispatcher;
pub use error::{Error, Result};
pub use producer::{Producer, ProducerListener, RtpProducer, RtpProducerBuilder};
pub use registry::Registry;
pub use rtcp_packet::{
    CompoundPacket, KeyFrameRequestKind, PayloadFeedback, RtcpPacket, TransportFeedback,
};
pub use rtp_parameters::{
    FecParameters, MediaKind, RtpEncodingParameters, RtpHeaderExtensionIds, RtpParameters,
    RtxParameters,
};
pub use rtp_stream_registry::RtpStreamRegistry;
pub use scheduler::{
    DEFAULT_INITIAL_RTCP_INTERVAL, MAX_AUDIO_RTCP_INTERVAL, MAX_VIDEO_RTCP_INTERVAL,
    RtcpScheduler, TimerState, compute_interval, is_report_due, jitter_interval,
    max_rtcp_interval,
};
pub use transport::{RTCP_BUFFER_SIZE, Transport, TransportBuilder, TransportEvent};

use bytes::BytesMut;
use std::time::Instant;

/// A message with the time it was received or produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportMessage<T> {
    /// Received/Sent time
    pub now: Instant,
    /// Message body
    pub message: T,
}

/// Packet received from the remote endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// RTP media, routed to the producer owning its SSRC
    Rtp(rtp::packet::Packet),
    /// Parsed compound RTCP, routed packet by packet
    Rtcp(Vec<RtcpPacket>),
}

/// [`Packet`] with its receive time.
pub type TaggedPacket = TransportMessage<Packet>;

/// Serialized packet ready to be put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
    Rtp(BytesMut),
    Rtcp(BytesMut),
}

/// [`Datagram`] with the time it was produced.
pub type TaggedDatagram = TransportMessage<Datagram>;

/// RTP packet to forward through one consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerRtpPacket {
    pub consumer_id: String,
    pub packet: rtp::packet::Packet,
}

/// [`ConsumerRtpPacket`] with its send time.
pub type TaggedRtpPacket = TransportMessage<ConsumerRtpPacket>;
