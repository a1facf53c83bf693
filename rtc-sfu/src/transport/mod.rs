//! The transport: owner of producers, consumers and RTCP scheduling.

mod event;
mod proto;

pub use event::TransportEvent;

use crate::bitrate::BitrateEstimator;
use crate::consumer::{Consumer, ConsumerListener};
use crate::dispatcher::RtcpDispatcher;
use crate::error::{Error, Result};
use crate::producer::{Producer, ProducerListener};
use crate::registry::Registry;
use crate::rtcp_packet::{CompoundPacket, RtcpPacket};
use crate::rtp_parameters::{MediaKind, RtpHeaderExtensionIds};
use crate::rtp_stream_registry::RtpStreamRegistry;
use crate::scheduler::{DEFAULT_INITIAL_RTCP_INTERVAL, MAX_VIDEO_RTCP_INTERVAL, RtcpScheduler};
use crate::{Datagram, TaggedDatagram, TransportMessage};
use bytes::BytesMut;
use log::{debug, trace, warn};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use util::marshal::{Marshal, MarshalSize};

/// Largest compound RTCP packet the transport will emit.
pub const RTCP_BUFFER_SIZE: usize = 65_536;

/// Builder for [`Transport`].
///
/// # Example
///
/// ```ignore
/// use rtc_sfu::TransportBuilder;
/// use std::time::{Duration, Instant};
///
/// let transport = TransportBuilder::new("transport-1")
///     .with_max_rtcp_interval(Duration::from_millis(1000))
///     .with_max_incoming_bitrate(1_500_000)
///     .build(Instant::now());
/// ```
pub struct TransportBuilder {
    id: String,
    initial_rtcp_interval: Duration,
    max_rtcp_interval: Duration,
    rtcp_buffer_size: usize,
    rtcp_ssrc: Option<u32>,
    max_incoming_bitrate: Option<u32>,
}

impl TransportBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            initial_rtcp_interval: DEFAULT_INITIAL_RTCP_INTERVAL,
            max_rtcp_interval: MAX_VIDEO_RTCP_INTERVAL,
            rtcp_buffer_size: RTCP_BUFFER_SIZE,
            rtcp_ssrc: None,
            max_incoming_bitrate: None,
        }
    }

    /// Delay of the first RTCP firing, after construction and after each
    /// (re)connection.
    pub fn with_initial_rtcp_interval(mut self, interval: Duration) -> Self {
        self.initial_rtcp_interval = interval;
        self
    }

    pub fn with_max_rtcp_interval(mut self, interval: Duration) -> Self {
        self.max_rtcp_interval = interval;
        self
    }

    /// Compound packets larger than `size` bytes are never sent.
    pub fn with_rtcp_buffer_size(mut self, size: usize) -> Self {
        self.rtcp_buffer_size = size;
        self
    }

    /// Sender SSRC of generated Receiver Reports. Random by default.
    pub fn with_rtcp_ssrc(mut self, ssrc: u32) -> Self {
        self.rtcp_ssrc = Some(ssrc);
        self
    }

    pub fn with_max_incoming_bitrate(mut self, bitrate: u32) -> Self {
        self.max_incoming_bitrate = Some(bitrate);
        self
    }

    /// Builds the transport with its RTCP timer armed.
    pub fn build(self, now: Instant) -> Transport {
        let mut bitrate = BitrateEstimator::new();
        if let Some(max) = self.max_incoming_bitrate {
            bitrate.set_max_incoming_bitrate(max);
        }

        let mut scheduler = RtcpScheduler::new(self.max_rtcp_interval);
        scheduler.arm(now, self.initial_rtcp_interval);

        Transport {
            id: self.id,
            rtcp_ssrc: self.rtcp_ssrc.unwrap_or_else(rand::random::<u32>),
            initial_rtcp_interval: self.initial_rtcp_interval,
            connected: false,
            closed: false,
            header_extension_ids: RtpHeaderExtensionIds::default(),
            producers: Registry::new("producer"),
            consumers: Registry::new("consumer"),
            rtp_streams: RtpStreamRegistry::new(),
            bitrate,
            scheduler,
            outbox: Outbox::new(self.rtcp_buffer_size),
        }
    }
}

/// Queued output of a transport.
struct Outbox {
    /// RTCP datagrams larger than this are never queued.
    rtcp_buffer_size: usize,
    transmits: VecDeque<TaggedDatagram>,
    events: VecDeque<TransportEvent>,
}

impl Outbox {
    fn new(rtcp_buffer_size: usize) -> Self {
        Self {
            rtcp_buffer_size,
            transmits: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    fn send_rtp(&mut self, now: Instant, packet: &rtp::packet::Packet) {
        let mut buf = BytesMut::zeroed(packet.marshal_size());
        match packet.marshal_to(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                self.transmits.push_back(TransportMessage {
                    now,
                    message: Datagram::Rtp(buf),
                });
            }
            Err(err) => warn!(
                "failed to serialize RTP packet [ssrc:{}, seq:{}]: {}",
                packet.header.ssrc, packet.header.sequence_number, err
            ),
        }
    }

    /// Serialises `packet` into a buffer of its own and queues it, unless it
    /// exceeds the RTCP buffer size.
    fn send_rtcp(&mut self, now: Instant, packet: &CompoundPacket) -> Result<()> {
        let size = packet.size();
        if size > self.rtcp_buffer_size {
            return Err(Error::ErrBufferOverflow(size));
        }

        let mut buf = BytesMut::zeroed(size);
        let n = packet.serialize(&mut buf)?;
        buf.truncate(n);
        self.transmits.push_back(TransportMessage {
            now,
            message: Datagram::Rtcp(buf),
        });

        Ok(())
    }

    /// Queues a standalone RTCP packet under the same size limit as
    /// compound packets.
    fn send_rtcp_packet(
        &mut self,
        now: Instant,
        packet: &(dyn rtcp::packet::Packet + Send + Sync),
    ) -> Result<()> {
        let size = packet.marshal_size();
        if size > self.rtcp_buffer_size {
            return Err(Error::ErrBufferOverflow(size));
        }

        let mut buf = BytesMut::zeroed(size);
        let n = packet.marshal_to(&mut buf)?;
        buf.truncate(n);
        self.transmits.push_back(TransportMessage {
            now,
            message: Datagram::Rtcp(buf),
        });

        Ok(())
    }
}

/// Listener handed to producers and consumers, turning their callbacks
/// into queued events and datagrams.
struct Notifier<'a> {
    outbox: &'a mut Outbox,
    now: Instant,
}

impl ProducerListener for Notifier<'_> {
    fn on_producer_paused(&mut self, producer_id: &str) {
        self.outbox.events.push_back(TransportEvent::ProducerPaused {
            producer_id: producer_id.to_owned(),
        });
    }

    fn on_producer_resumed(&mut self, producer_id: &str) {
        self.outbox.events.push_back(TransportEvent::ProducerResumed {
            producer_id: producer_id.to_owned(),
        });
    }

    fn on_producer_stream_enabled(&mut self, producer_id: &str, ssrc: u32, mapped_ssrc: u32) {
        self.outbox
            .events
            .push_back(TransportEvent::ProducerStreamEnabled {
                producer_id: producer_id.to_owned(),
                ssrc,
                mapped_ssrc,
            });
    }

    fn on_producer_stream_disabled(&mut self, producer_id: &str, ssrc: u32, mapped_ssrc: u32) {
        self.outbox
            .events
            .push_back(TransportEvent::ProducerStreamDisabled {
                producer_id: producer_id.to_owned(),
                ssrc,
                mapped_ssrc,
            });
    }

    fn on_producer_rtp_packet_received(&mut self, producer_id: &str, packet: rtp::packet::Packet) {
        self.outbox
            .events
            .push_back(TransportEvent::ProducerRtpPacketReceived {
                producer_id: producer_id.to_owned(),
                packet,
            });
    }

    fn on_producer_send_rtcp_packet(
        &mut self,
        producer_id: &str,
        packet: Box<dyn rtcp::packet::Packet + Send + Sync>,
    ) {
        if let Err(err) = self.outbox.send_rtcp_packet(self.now, packet.as_ref()) {
            warn!(
                "dropping {} packet from producer {}: {}",
                packet.header().packet_type,
                producer_id,
                err
            );
        }
    }
}

impl ConsumerListener for Notifier<'_> {
    fn on_consumer_send_rtp_packet(&mut self, _consumer_id: &str, packet: &rtp::packet::Packet) {
        self.outbox.send_rtp(self.now, packet);
    }

    fn on_consumer_key_frame_requested(&mut self, consumer_id: &str, ssrc: u32) {
        self.outbox
            .events
            .push_back(TransportEvent::ConsumerKeyFrameRequested {
                consumer_id: consumer_id.to_owned(),
                ssrc,
            });
    }
}

/// Media-routing core of one WebRTC transport.
///
/// Owns the producers and consumers attached to the transport, routes
/// incoming RTP and RTCP to them by SSRC, tracks the bitrate signals and
/// emits periodic compound RTCP. The transport performs no I/O: outbound
/// datagrams and events are queued and drained through its
/// [`sansio::Protocol`] implementation, and time only advances through the
/// `now` arguments and `handle_timeout`.
pub struct Transport {
    id: String,
    rtcp_ssrc: u32,
    initial_rtcp_interval: Duration,
    connected: bool,
    closed: bool,
    header_extension_ids: RtpHeaderExtensionIds,
    producers: Registry<Box<dyn Producer>>,
    consumers: Registry<Box<dyn Consumer>>,
    rtp_streams: RtpStreamRegistry,
    bitrate: BitrateEstimator,
    scheduler: RtcpScheduler,
    outbox: Outbox,
}

impl Transport {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rtcp_ssrc(&self) -> u32 {
        self.rtcp_ssrc
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn rtp_header_extension_ids(&self) -> RtpHeaderExtensionIds {
        self.header_extension_ids
    }

    pub fn max_incoming_bitrate(&self) -> Option<u32> {
        self.bitrate.max_incoming_bitrate()
    }

    pub fn available_outgoing_bitrate(&self) -> u32 {
        self.bitrate.available_outgoing_bitrate()
    }

    pub fn producer_ids(&self) -> Vec<String> {
        self.producers.ids()
    }

    pub fn consumer_ids(&self) -> Vec<String> {
        self.consumers.ids()
    }

    pub fn producer(&self, id: &str) -> Result<&dyn Producer> {
        self.producers.get(id).map(|p| p.as_ref())
    }

    pub fn consumer(&self, id: &str) -> Result<&dyn Consumer> {
        self.consumers.get(id).map(|c| c.as_ref())
    }

    /// Producer id that incoming packets on `ssrc` are routed to.
    pub fn producer_id_for_ssrc(&self, ssrc: u32) -> Option<&str> {
        self.rtp_streams.lookup(ssrc)
    }

    /// Registers a producer and claims its SSRCs.
    ///
    /// Fails with [`Error::ErrDuplicateId`] or [`Error::ErrSsrcConflict`];
    /// in both cases the transport is left as it was. The producer's header
    /// extension ids fill the transport ids that are still unset.
    pub fn add_producer(&mut self, producer: Box<dyn Producer>) -> Result<()> {
        if self.closed {
            return Err(Error::ErrTransportClosed);
        }

        let id = producer.id().to_owned();
        let ssrcs = producer.ssrcs();
        let ids = producer.rtp_header_extension_ids();

        self.producers.add(id.clone(), producer)?;

        if let Err(err) = self.rtp_streams.add_producer(&id, &ssrcs) {
            if let Ok(mut producer) = self.producers.remove(&id) {
                producer.close();
            }
            return Err(err);
        }

        self.header_extension_ids.merge(&ids);
        debug!("{}: producer {} added [ssrcs:{:?}]", self.id, id, ssrcs);

        Ok(())
    }

    /// Registers a consumer. A video consumer joining a connected transport
    /// asks for a key frame right away.
    pub fn add_consumer(&mut self, now: Instant, consumer: Box<dyn Consumer>) -> Result<()> {
        if self.closed {
            return Err(Error::ErrTransportClosed);
        }

        let id = consumer.id().to_owned();
        self.consumers.add(id.clone(), consumer)?;
        debug!("{}: consumer {} added", self.id, id);

        if self.connected {
            let consumer = self.consumers.get_mut(&id)?;
            if consumer.kind() == MediaKind::Video {
                consumer.request_key_frame(&mut Notifier {
                    outbox: &mut self.outbox,
                    now,
                });
            }
        }

        Ok(())
    }

    pub fn close_producer(&mut self, id: &str) -> Result<()> {
        let mut producer = self.producers.remove(id)?;
        self.rtp_streams.remove_producer(id);
        self.outbox.events.push_back(TransportEvent::ProducerClosed {
            producer_id: id.to_owned(),
        });
        producer.close();

        Ok(())
    }

    pub fn close_consumer(&mut self, id: &str) -> Result<()> {
        let mut consumer = self.consumers.remove(id)?;
        self.outbox.events.push_back(TransportEvent::ConsumerClosed {
            consumer_id: id.to_owned(),
        });
        consumer.close();

        Ok(())
    }

    /// Marks a consumer as started, making it eligible for RTCP feedback.
    pub fn start_consumer(&mut self, id: &str) -> Result<()> {
        self.consumers.get_mut(id)?.start();
        Ok(())
    }

    pub fn pause_producer(&mut self, now: Instant, id: &str) -> Result<()> {
        self.producers.get_mut(id)?.pause(&mut Notifier {
            outbox: &mut self.outbox,
            now,
        });
        Ok(())
    }

    pub fn resume_producer(&mut self, now: Instant, id: &str) -> Result<()> {
        self.producers.get_mut(id)?.resume(&mut Notifier {
            outbox: &mut self.outbox,
            now,
        });
        Ok(())
    }

    /// Asks the producer's remote sender for a key frame. The producer
    /// decides which RTCP feedback, if any, goes out.
    pub fn request_producer_key_frame(&mut self, now: Instant, id: &str) -> Result<()> {
        self.producers.get_mut(id)?.request_key_frame(&mut Notifier {
            outbox: &mut self.outbox,
            now,
        });
        Ok(())
    }

    /// Stores the incoming bitrate ceiling, raised to the minimum when
    /// lower. Returns the stored value.
    pub fn set_max_incoming_bitrate(&mut self, bitrate: u32) -> u32 {
        let bitrate = self.bitrate.set_max_incoming_bitrate(bitrate);
        debug!("{}: max incoming bitrate set to {}", self.id, bitrate);
        bitrate
    }

    /// Connection state of the underlying transport.
    ///
    /// Connecting restarts the RTCP timer with the initial interval and asks
    /// every video consumer for a key frame. Disconnecting stops the timer.
    pub fn set_connected(&mut self, now: Instant, connected: bool) {
        if self.closed || self.connected == connected {
            return;
        }
        self.connected = connected;

        if !connected {
            debug!("{}: disconnected", self.id);
            self.scheduler.stop();
            return;
        }

        debug!("{}: connected", self.id);
        self.scheduler.arm(now, self.initial_rtcp_interval);

        let mut notifier = Notifier {
            outbox: &mut self.outbox,
            now,
        };
        for consumer in self.consumers.values_mut() {
            if consumer.kind() == MediaKind::Video {
                consumer.request_key_frame(&mut notifier);
            }
        }
    }

    /// Routes one received RTCP packet. Never fails: whatever cannot be
    /// matched is logged and dropped.
    pub fn receive_rtcp_packet(&mut self, now: Instant, packet: &RtcpPacket) {
        if self.closed {
            return;
        }

        let mut notifier = Notifier {
            outbox: &mut self.outbox,
            now,
        };
        RtcpDispatcher {
            producers: &mut self.producers,
            consumers: &mut self.consumers,
            rtp_streams: &self.rtp_streams,
            bitrate: &mut self.bitrate,
            listener: &mut notifier,
        }
        .dispatch(now, packet);
    }

    /// Parses a compound RTCP datagram and routes every packet in it.
    /// Packets after a framing error are dropped.
    pub fn receive_rtcp_datagram(&mut self, now: Instant, raw: &[u8]) {
        match RtcpPacket::unmarshal(raw) {
            Ok(packets) => {
                for packet in &packets {
                    self.receive_rtcp_packet(now, packet);
                }
            }
            Err(err) => warn!("{}: dropping RTCP datagram: {}", self.id, err),
        }
    }

    /// Hands an incoming RTP packet to the producer owning its SSRC.
    pub fn receive_rtp_packet(&mut self, now: Instant, packet: rtp::packet::Packet) {
        if self.closed {
            return;
        }

        let ssrc = packet.header.ssrc;
        let Some(producer) = self
            .rtp_streams
            .lookup(ssrc)
            .and_then(|id| self.producers.get_mut(id).ok())
        else {
            warn!("{}: no producer found for RTP packet [ssrc:{}]", self.id, ssrc);
            return;
        };

        producer.receive_rtp_packet(
            now,
            packet,
            &mut Notifier {
                outbox: &mut self.outbox,
                now,
            },
        );
    }

    /// Forwards an RTP packet through a consumer.
    pub fn send_rtp_packet(
        &mut self,
        now: Instant,
        consumer_id: &str,
        packet: rtp::packet::Packet,
    ) -> Result<()> {
        if self.closed {
            return Err(Error::ErrTransportClosed);
        }

        self.consumers.get_mut(consumer_id)?.send_rtp_packet(
            now,
            packet,
            &mut Notifier {
                outbox: &mut self.outbox,
                now,
            },
        );
        Ok(())
    }

    /// Handles an RTCP timer firing: emits reports, then re-arms the timer
    /// with an interval derived from the consumers' send rate.
    fn on_rtcp_timer(&mut self, now: Instant) {
        if let Err(err) = self.send_rtcp(now) {
            warn!("{}: RTCP cycle abandoned: {}", self.id, err);
        }

        let rates: Vec<u32> = self
            .consumers
            .values_mut()
            .map(|c| c.transmission_rate(now))
            .collect();
        let interval = self.scheduler.next_interval(rates);
        trace!("{}: next RTCP in {:?}", self.id, interval);
        self.scheduler.arm(now, interval);
    }

    /// Collects RTCP from every consumer, then every producer.
    ///
    /// A compound packet holding a Sender Report is sent as soon as the
    /// consumer that added it returns, and a fresh one is started. Whatever
    /// the producers add afterwards is sent if it holds reception reports.
    /// The first over-limit packet aborts the rest of the cycle.
    fn send_rtcp(&mut self, now: Instant) -> Result<()> {
        let mut packet = CompoundPacket::new(self.rtcp_ssrc);

        for consumer in self.consumers.values_mut() {
            consumer.get_rtcp(&mut packet, now);
            if packet.has_sender_report() {
                self.outbox.send_rtcp(now, &packet)?;
                packet = CompoundPacket::new(self.rtcp_ssrc);
            }
        }

        for producer in self.producers.values_mut() {
            producer.get_rtcp(&mut packet, now);
        }

        if packet.receiver_report_count() > 0 {
            self.outbox.send_rtcp(now, &packet)?;
        }

        Ok(())
    }

    /// Closes every producer and consumer, notifying each, and stops the
    /// RTCP timer. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!("{}: closing", self.id);
        self.teardown(true);
    }

    fn teardown(&mut self, notify: bool) {
        let outbox = &mut self.outbox;
        let rtp_streams = &mut self.rtp_streams;

        self.producers.close_all(|producer_id, mut producer| {
            rtp_streams.remove_producer(&producer_id);
            if notify {
                outbox
                    .events
                    .push_back(TransportEvent::ProducerClosed { producer_id });
            }
            producer.close();
        });

        self.consumers.close_all(|consumer_id, mut consumer| {
            if notify {
                outbox
                    .events
                    .push_back(TransportEvent::ConsumerClosed { consumer_id });
            }
            consumer.close();
        });

        self.scheduler.stop();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.teardown(false);
        }
    }
}
