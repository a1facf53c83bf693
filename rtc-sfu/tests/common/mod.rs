//! Recording producer and consumer doubles shared by the integration tests.

#![allow(dead_code)]

use rtc_sfu::{
    CompoundPacket, Consumer, ConsumerListener, KeyFrameRequestKind, MediaKind, Producer,
    ProducerListener, RtpEncodingParameters, RtpHeaderExtensionIds, RtpParameters, RtxParameters,
    TaggedDatagram, Transport, TransportEvent,
};
use rtcp::reception_report::ReceptionReport;
use rtcp::sender_report::SenderReport;
use rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use sansio::Protocol;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// =============================================================================
// Producer
// =============================================================================

#[derive(Default)]
pub struct ProducerCalls {
    pub sender_reports: Vec<u32>,
    pub rtp_packets: Vec<u16>,
    pub closed: usize,
}

pub struct MockProducer {
    id: String,
    kind: MediaKind,
    ssrcs: Vec<u32>,
    header_extension_ids: RtpHeaderExtensionIds,
    paused: bool,
    /// Reception report blocks appended on every `get_rtcp`.
    reports: Vec<ReceptionReport>,
    pub calls: Rc<RefCell<ProducerCalls>>,
}

impl MockProducer {
    pub fn new(id: &str, ssrcs: &[u32]) -> Self {
        Self {
            id: id.to_owned(),
            kind: MediaKind::Video,
            ssrcs: ssrcs.to_vec(),
            header_extension_ids: RtpHeaderExtensionIds::default(),
            paused: false,
            reports: vec![],
            calls: Rc::new(RefCell::new(ProducerCalls::default())),
        }
    }

    pub fn with_header_extension_ids(mut self, ids: RtpHeaderExtensionIds) -> Self {
        self.header_extension_ids = ids;
        self
    }

    pub fn with_reports(mut self, ssrcs: &[u32]) -> Self {
        self.reports = ssrcs
            .iter()
            .map(|&ssrc| ReceptionReport {
                ssrc,
                ..Default::default()
            })
            .collect();
        self
    }

    pub fn calls(&self) -> Rc<RefCell<ProducerCalls>> {
        Rc::clone(&self.calls)
    }
}

impl Producer for MockProducer {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn ssrcs(&self) -> Vec<u32> {
        self.ssrcs.clone()
    }

    fn rtp_header_extension_ids(&self) -> RtpHeaderExtensionIds {
        self.header_extension_ids
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn get_rtcp(&mut self, packet: &mut CompoundPacket, _now: Instant) {
        for report in &self.reports {
            packet.add_receiver_report(report.clone());
        }
    }

    fn receive_rtp_packet(
        &mut self,
        _now: Instant,
        packet: rtp::packet::Packet,
        _listener: &mut dyn ProducerListener,
    ) {
        self.calls
            .borrow_mut()
            .rtp_packets
            .push(packet.header.sequence_number);
    }

    fn receive_rtcp_sender_report(&mut self, _now: Instant, report: &SenderReport) {
        self.calls.borrow_mut().sender_reports.push(report.ssrc);
    }

    fn pause(&mut self, listener: &mut dyn ProducerListener) {
        self.paused = true;
        listener.on_producer_paused(&self.id);
    }

    fn resume(&mut self, listener: &mut dyn ProducerListener) {
        self.paused = false;
        listener.on_producer_resumed(&self.id);
    }

    fn close(&mut self) {
        self.calls.borrow_mut().closed += 1;
    }
}

// =============================================================================
// Consumer
// =============================================================================

#[derive(Default)]
pub struct ConsumerCalls {
    pub receiver_reports: Vec<u32>,
    pub key_frame_requests: Vec<(KeyFrameRequestKind, u32)>,
    pub nacks: Vec<u32>,
    pub key_frames_requested: usize,
    pub closed: usize,
}

pub struct MockConsumer {
    id: String,
    kind: MediaKind,
    started: bool,
    parameters: RtpParameters,
    rate: u32,
    /// Sender Report emitted on every `get_rtcp`, carrying this many
    /// reception report blocks.
    sender_report_blocks: Option<usize>,
    pub calls: Rc<RefCell<ConsumerCalls>>,
}

impl MockConsumer {
    pub fn new(id: &str, ssrc: u32) -> Self {
        Self {
            id: id.to_owned(),
            kind: MediaKind::Video,
            started: false,
            parameters: RtpParameters {
                encodings: vec![RtpEncodingParameters {
                    ssrc,
                    rtx: Some(RtxParameters {
                        ssrc: ssrc + 1,
                        payload_type: 97,
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            },
            rate: 0,
            sender_report_blocks: None,
            calls: Rc::new(RefCell::new(ConsumerCalls::default())),
        }
    }

    pub fn audio(mut self) -> Self {
        self.kind = MediaKind::Audio;
        self
    }

    pub fn started(mut self) -> Self {
        self.started = true;
        self
    }

    pub fn with_rate(mut self, rate: u32) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_sender_report(mut self, blocks: usize) -> Self {
        self.sender_report_blocks = Some(blocks);
        self
    }

    pub fn calls(&self) -> Rc<RefCell<ConsumerCalls>> {
        Rc::clone(&self.calls)
    }

    fn ssrc(&self) -> u32 {
        self.parameters.encodings[0].ssrc
    }
}

impl Consumer for MockConsumer {
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
        &self.parameters
    }

    fn get_rtcp(&mut self, packet: &mut CompoundPacket, _now: Instant) {
        if let Some(blocks) = self.sender_report_blocks {
            packet.add_sender_report(SenderReport {
                ssrc: self.ssrc(),
                reports: (0..blocks)
                    .map(|i| ReceptionReport {
                        ssrc: i as u32,
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            });
        }
    }

    fn transmission_rate(&mut self, _now: Instant) -> u32 {
        self.rate
    }

    fn send_rtp_packet(
        &mut self,
        _now: Instant,
        packet: rtp::packet::Packet,
        listener: &mut dyn ConsumerListener,
    ) {
        listener.on_consumer_send_rtp_packet(&self.id, &packet);
    }

    fn receive_rtcp_receiver_report(&mut self, report: &ReceptionReport) {
        self.calls.borrow_mut().receiver_reports.push(report.ssrc);
    }

    fn receive_key_frame_request(
        &mut self,
        kind: KeyFrameRequestKind,
        ssrc: u32,
        _listener: &mut dyn ConsumerListener,
    ) {
        self.calls.borrow_mut().key_frame_requests.push((kind, ssrc));
    }

    fn receive_nack(
        &mut self,
        _now: Instant,
        nack: &TransportLayerNack,
        _listener: &mut dyn ConsumerListener,
    ) {
        self.calls.borrow_mut().nacks.push(nack.media_ssrc);
    }

    fn request_key_frame(&mut self, _listener: &mut dyn ConsumerListener) {
        self.calls.borrow_mut().key_frames_requested += 1;
    }

    fn close(&mut self) {
        self.calls.borrow_mut().closed += 1;
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub fn rtp_packet(ssrc: u32, sequence_number: u16, payload_len: usize) -> rtp::packet::Packet {
    rtp::packet::Packet {
        header: rtp::header::Header {
            version: 2,
            payload_type: 96,
            sequence_number,
            timestamp: u32::from(sequence_number) * 3000,
            ssrc,
            ..Default::default()
        },
        payload: vec![0xAB; payload_len].into(),
    }
}

/// Drains every queued datagram.
pub fn drain_transmits(transport: &mut Transport) -> Vec<TaggedDatagram> {
    std::iter::from_fn(|| transport.poll_write()).collect()
}

/// Drains every queued event.
pub fn drain_events(transport: &mut Transport) -> Vec<TransportEvent> {
    std::iter::from_fn(|| transport.poll_event()).collect()
}
