//! Typed RTCP model consumed by the transport.
//!
//! The `rtcp` crate parses a compound datagram into a list of boxed
//! `dyn rtcp::packet::Packet`. [`RtcpPacket`] turns each of them into an
//! explicit variant once, at the boundary, so that routing inside the
//! transport is a plain `match` with no further downcasting.
//!
//! | RTCP type | Variant |
//! |-----------|---------|
//! | SR (200) | [`RtcpPacket::SenderReport`] |
//! | RR (201) | [`RtcpPacket::ReceiverReport`] |
//! | SDES (202) | [`RtcpPacket::SourceDescription`] |
//! | BYE (203) | [`RtcpPacket::Goodbye`] |
//! | RTPFB (205) | [`RtcpPacket::TransportSpecificFeedback`] |
//! | PSFB (206) | [`RtcpPacket::PayloadSpecificFeedback`] |
//! | anything else | [`RtcpPacket::Unsupported`] |

mod compound_packet;

pub use compound_packet::CompoundPacket;

use crate::error::{Error, Result};
use log::warn;
use rtcp::goodbye::Goodbye;
use rtcp::header::{
    FORMAT_FIR, FORMAT_PLI, FORMAT_REMB, FORMAT_TLN, HEADER_LENGTH, Header, PacketType,
};
use rtcp::payload_feedbacks::full_intra_request::FullIntraRequest;
use rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use rtcp::payload_feedbacks::receiver_estimated_maximum_bitrate::ReceiverEstimatedMaximumBitrate;
use rtcp::receiver_report::ReceiverReport;
use rtcp::sender_report::SenderReport;
use rtcp::source_description::SourceDescription;
use rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use util::marshal::Unmarshal;

/// Feedback message type that asked a consumer for a key frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeyFrameRequestKind {
    Pli,
    Fir,
}

/// Payload-specific feedback (RFC 4585 section 6.3).
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadFeedback {
    PictureLossIndication(PictureLossIndication),
    FullIntraRequest(FullIntraRequest),
    ReceiverEstimatedMaximumBitrate(ReceiverEstimatedMaximumBitrate),
    /// Application layer feedback (FMT 15) that is not REMB.
    Application { sender_ssrc: u32, media_ssrc: u32 },
    Unsupported {
        format: u8,
        sender_ssrc: u32,
        media_ssrc: u32,
    },
}

/// Transport-layer feedback (RFC 4585 section 6.2).
#[derive(Debug, Clone, PartialEq)]
pub enum TransportFeedback {
    Nack(TransportLayerNack),
    Unsupported {
        format: u8,
        sender_ssrc: u32,
        media_ssrc: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RtcpPacket {
    SenderReport(SenderReport),
    ReceiverReport(ReceiverReport),
    SourceDescription(SourceDescription),
    Goodbye(Goodbye),
    PayloadSpecificFeedback(PayloadFeedback),
    TransportSpecificFeedback(TransportFeedback),
    Unsupported(PacketType),
}

impl RtcpPacket {
    /// Parses a compound RTCP datagram.
    ///
    /// The datagram is split on the common RTCP header and every packet is
    /// decoded on its own. A packet whose body fails to decode is kept as
    /// an `Application` or `Unsupported` variant so the rest of the
    /// datagram still routes. A broken header or a length running past the
    /// end of the datagram stops parsing; packets before it are returned.
    /// Fails with [`Error::ErrMalformedPacket`] only when not even the first
    /// packet can be framed.
    pub fn unmarshal(raw: &[u8]) -> Result<Vec<RtcpPacket>> {
        let mut packets = vec![];
        let mut rest = raw;

        while !rest.is_empty() {
            let (header, len) = match frame(rest) {
                Ok(framed) => framed,
                Err(err) if packets.is_empty() => return Err(err),
                Err(err) => {
                    warn!("dropping {} trailing RTCP bytes: {}", rest.len(), err);
                    break;
                }
            };
            let (body, tail) = rest.split_at(len);

            match rtcp::packet::unmarshal(&mut &body[..]) {
                Ok(parsed) => {
                    packets.extend(parsed.iter().map(|p| RtcpPacket::from_packet(p.as_ref())))
                }
                Err(err) => {
                    warn!(
                        "cannot decode RTCP packet [type:{}, format:{}]: {}",
                        header.packet_type, header.count, err
                    );
                    packets.push(RtcpPacket::from_undecodable(&header, body));
                }
            }
            rest = tail;
        }

        if packets.is_empty() {
            return Err(Error::ErrMalformedPacket("empty RTCP datagram".to_owned()));
        }
        Ok(packets)
    }

    /// Classifies a packet whose header is sound but whose body the `rtcp`
    /// crate rejected.
    fn from_undecodable(header: &Header, raw: &[u8]) -> RtcpPacket {
        let (sender_ssrc, media_ssrc) = ssrcs_from_wire(raw);
        match header.packet_type {
            PacketType::PayloadSpecificFeedback if header.count == FORMAT_REMB => {
                RtcpPacket::PayloadSpecificFeedback(PayloadFeedback::Application {
                    sender_ssrc,
                    media_ssrc,
                })
            }
            PacketType::PayloadSpecificFeedback => {
                RtcpPacket::PayloadSpecificFeedback(PayloadFeedback::Unsupported {
                    format: header.count,
                    sender_ssrc,
                    media_ssrc,
                })
            }
            PacketType::TransportSpecificFeedback => {
                RtcpPacket::TransportSpecificFeedback(TransportFeedback::Unsupported {
                    format: header.count,
                    sender_ssrc,
                    media_ssrc,
                })
            }
            packet_type => RtcpPacket::Unsupported(packet_type),
        }
    }

    /// Converts a packet parsed by the `rtcp` crate.
    pub fn from_packet(packet: &(dyn rtcp::packet::Packet + Send + Sync)) -> RtcpPacket {
        let header = packet.header();
        let any = packet.as_any();

        match header.packet_type {
            PacketType::SenderReport => any
                .downcast_ref::<SenderReport>()
                .map(|sr| RtcpPacket::SenderReport(sr.clone())),
            PacketType::ReceiverReport => any
                .downcast_ref::<ReceiverReport>()
                .map(|rr| RtcpPacket::ReceiverReport(rr.clone())),
            PacketType::SourceDescription => any
                .downcast_ref::<SourceDescription>()
                .map(|sdes| RtcpPacket::SourceDescription(sdes.clone())),
            PacketType::Goodbye => any
                .downcast_ref::<Goodbye>()
                .map(|bye| RtcpPacket::Goodbye(bye.clone())),
            PacketType::PayloadSpecificFeedback => {
                let feedback = match header.count {
                    FORMAT_PLI => any
                        .downcast_ref::<PictureLossIndication>()
                        .map(|pli| PayloadFeedback::PictureLossIndication(pli.clone())),
                    FORMAT_FIR => any
                        .downcast_ref::<FullIntraRequest>()
                        .map(|fir| PayloadFeedback::FullIntraRequest(fir.clone())),
                    FORMAT_REMB => Some(
                        match any.downcast_ref::<ReceiverEstimatedMaximumBitrate>() {
                            Some(remb) => {
                                PayloadFeedback::ReceiverEstimatedMaximumBitrate(remb.clone())
                            }
                            None => {
                                let (sender_ssrc, media_ssrc) = feedback_ssrcs(packet);
                                PayloadFeedback::Application {
                                    sender_ssrc,
                                    media_ssrc,
                                }
                            }
                        },
                    ),
                    _ => None,
                }
                .unwrap_or_else(|| {
                    let (sender_ssrc, media_ssrc) = feedback_ssrcs(packet);
                    PayloadFeedback::Unsupported {
                        format: header.count,
                        sender_ssrc,
                        media_ssrc,
                    }
                });
                Some(RtcpPacket::PayloadSpecificFeedback(feedback))
            }
            PacketType::TransportSpecificFeedback => {
                let feedback = match header.count {
                    FORMAT_TLN => any
                        .downcast_ref::<TransportLayerNack>()
                        .map(|nack| TransportFeedback::Nack(nack.clone())),
                    _ => None,
                }
                .unwrap_or_else(|| {
                    let (sender_ssrc, media_ssrc) = feedback_ssrcs(packet);
                    TransportFeedback::Unsupported {
                        format: header.count,
                        sender_ssrc,
                        media_ssrc,
                    }
                });
                Some(RtcpPacket::TransportSpecificFeedback(feedback))
            }
            _ => None,
        }
        .unwrap_or(RtcpPacket::Unsupported(header.packet_type))
    }
}

/// Reads the common header at the start of `raw` and returns it with the
/// packet's total length in bytes.
fn frame(raw: &[u8]) -> Result<(Header, usize)> {
    let header = Header::unmarshal(&mut &raw[..])
        .map_err(|err| Error::ErrMalformedPacket(err.to_string()))?;
    let len = (usize::from(header.length) + 1) * 4;
    if len > raw.len() {
        return Err(Error::ErrMalformedPacket(format!(
            "packet length {} exceeds the {} bytes left",
            len,
            raw.len()
        )));
    }
    Ok((header, len))
}

/// Reads the sender and media SSRC of a feedback packet (RFC 4585 section 6.1)
/// from its wire form.
fn ssrcs_from_wire(raw: &[u8]) -> (u32, u32) {
    if raw.len() < HEADER_LENGTH + 8 {
        return (0, 0);
    }
    (
        u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]),
        u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]),
    )
}

fn feedback_ssrcs(packet: &(dyn rtcp::packet::Packet + Send + Sync)) -> (u32, u32) {
    packet
        .marshal()
        .map(|raw| ssrcs_from_wire(&raw))
        .unwrap_or((0, 0))
}
