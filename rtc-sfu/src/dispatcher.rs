//! Routing of received RTCP to producers, consumers and the bitrate estimate.
//!
//! | Packet | Target |
//! |--------|--------|
//! | RR report blocks | started consumer owning the block SSRC |
//! | SR | producer owning the sender SSRC; its report blocks as for RR |
//! | SDES chunks | producer owning the chunk SSRC |
//! | PLI / FIR | started consumer owning the media SSRC (FIR falls back to its entries) |
//! | REMB | available outgoing bitrate |
//! | NACK | started consumer owning the media SSRC |
//! | BYE | ignored |
//!
//! Nothing here fails: anything that cannot be matched is logged and
//! skipped, and the remaining blocks of the same packet are still routed.

use crate::bitrate::BitrateEstimator;
use crate::consumer::{Consumer, ConsumerListener};
use crate::producer::Producer;
use crate::registry::Registry;
use crate::rtcp_packet::{KeyFrameRequestKind, PayloadFeedback, RtcpPacket, TransportFeedback};
use crate::rtp_stream_registry::RtpStreamRegistry;
use log::{debug, trace, warn};
use rtcp::payload_feedbacks::full_intra_request::FullIntraRequest;
use rtcp::reception_report::ReceptionReport;
use rtcp::sender_report::SenderReport;
use std::time::Instant;

/// Borrowed view of the transport state touched by incoming RTCP.
pub struct RtcpDispatcher<'a> {
    pub producers: &'a mut Registry<Box<dyn Producer>>,
    pub consumers: &'a mut Registry<Box<dyn Consumer>>,
    pub rtp_streams: &'a RtpStreamRegistry,
    pub bitrate: &'a mut BitrateEstimator,
    pub listener: &'a mut dyn ConsumerListener,
}

impl RtcpDispatcher<'_> {
    pub fn dispatch(&mut self, now: Instant, packet: &RtcpPacket) {
        match packet {
            RtcpPacket::ReceiverReport(rr) => {
                for report in &rr.reports {
                    self.handle_reception_report(report);
                }
            }
            RtcpPacket::SenderReport(sr) => {
                self.handle_sender_report(now, sr);
                for report in &sr.reports {
                    self.handle_reception_report(report);
                }
            }
            RtcpPacket::SourceDescription(sdes) => {
                for chunk in &sdes.chunks {
                    let producer = self
                        .rtp_streams
                        .lookup(chunk.source)
                        .and_then(|id| self.producers.get_mut(id).ok());
                    match producer {
                        Some(producer) => producer.receive_rtcp_sdes_chunk(chunk),
                        None => warn!(
                            "no producer found for received SDES chunk [ssrc:{}]",
                            chunk.source
                        ),
                    }
                }
            }
            RtcpPacket::Goodbye(_) => {
                debug!("ignoring received RTCP BYE");
            }
            RtcpPacket::PayloadSpecificFeedback(feedback) => {
                self.handle_payload_feedback(feedback);
            }
            RtcpPacket::TransportSpecificFeedback(feedback) => {
                self.handle_transport_feedback(now, feedback);
            }
            RtcpPacket::Unsupported(packet_type) => {
                warn!("unhandled RTCP type received [type:{:?}]", packet_type);
            }
        }
    }

    fn handle_reception_report(&mut self, report: &ReceptionReport) {
        match self.consumers.started_consumer_mut(report.ssrc) {
            Some(consumer) => consumer.receive_rtcp_receiver_report(report),
            None => warn!(
                "no consumer found for received receiver report [ssrc:{}]",
                report.ssrc
            ),
        }
    }

    fn handle_sender_report(&mut self, now: Instant, sr: &SenderReport) {
        let producer = self
            .rtp_streams
            .lookup(sr.ssrc)
            .and_then(|id| self.producers.get_mut(id).ok());
        match producer {
            Some(producer) => producer.receive_rtcp_sender_report(now, sr),
            None => warn!("no producer found for received sender report [ssrc:{}]", sr.ssrc),
        }
    }

    fn handle_payload_feedback(&mut self, feedback: &PayloadFeedback) {
        match feedback {
            PayloadFeedback::PictureLossIndication(pli) => {
                match self.consumers.started_consumer_mut(pli.media_ssrc) {
                    Some(consumer) => consumer.receive_key_frame_request(
                        KeyFrameRequestKind::Pli,
                        pli.media_ssrc,
                        &mut *self.listener,
                    ),
                    None => warn!(
                        "no consumer found for received PLI feedback [media ssrc:{}]",
                        pli.media_ssrc
                    ),
                }
            }
            PayloadFeedback::FullIntraRequest(fir) => self.handle_fir(fir),
            PayloadFeedback::ReceiverEstimatedMaximumBitrate(remb) => {
                let bitrate = remb.bitrate as u32;
                trace!("REMB received [bitrate:{}, ssrcs:{:?}]", bitrate, remb.ssrcs);
                self.bitrate.on_remb_received(bitrate);
            }
            PayloadFeedback::Application { media_ssrc, .. } => {
                warn!(
                    "ignoring unsupported application layer feedback [media ssrc:{}]",
                    media_ssrc
                );
            }
            PayloadFeedback::Unsupported {
                format, media_ssrc, ..
            } => {
                warn!(
                    "ignoring unsupported payload specific feedback [format:{}, media ssrc:{}]",
                    format, media_ssrc
                );
            }
        }
    }

    /// FIR (RFC 5104 section 4.3.1) usually leaves the media SSRC at zero
    /// and names its targets in the FCI entries.
    fn handle_fir(&mut self, fir: &FullIntraRequest) {
        if let Some(consumer) = self.consumers.started_consumer_mut(fir.media_ssrc) {
            consumer.receive_key_frame_request(
                KeyFrameRequestKind::Fir,
                fir.media_ssrc,
                &mut *self.listener,
            );
            return;
        }

        let mut handled = false;
        for entry in &fir.fir {
            if let Some(consumer) = self.consumers.started_consumer_mut(entry.ssrc) {
                consumer.receive_key_frame_request(
                    KeyFrameRequestKind::Fir,
                    entry.ssrc,
                    &mut *self.listener,
                );
                handled = true;
            }
        }

        if !handled {
            warn!(
                "no consumer found for received FIR feedback [media ssrc:{}]",
                fir.media_ssrc
            );
        }
    }

    fn handle_transport_feedback(&mut self, now: Instant, feedback: &TransportFeedback) {
        match feedback {
            TransportFeedback::Nack(nack) => {
                match self.consumers.started_consumer_mut(nack.media_ssrc) {
                    Some(consumer) => consumer.receive_nack(now, nack, &mut *self.listener),
                    None => warn!(
                        "no consumer found for received NACK feedback [media ssrc:{}]",
                        nack.media_ssrc
                    ),
                }
            }
            TransportFeedback::Unsupported {
                format, media_ssrc, ..
            } => {
                warn!(
                    "ignoring unsupported transport layer feedback [format:{}, media ssrc:{}]",
                    format, media_ssrc
                );
            }
        }
    }
}
