use crate::error::{Error, Result};
use rtcp::receiver_report::ReceiverReport;
use rtcp::reception_report::ReceptionReport;
use rtcp::sender_report::SenderReport;
use rtcp::source_description::{SourceDescription, SourceDescriptionChunk};

/// Report and chunk counts are 5-bit fields in the RTCP header.
const MAX_ITEMS_PER_PACKET: usize = 31;

/// Per-cycle accumulator of outgoing RTCP content.
///
/// Serialised as every Sender Report, then the collected reception report
/// blocks split into Receiver Reports of at most 31 blocks, then the SDES
/// chunks split the same way.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CompoundPacket {
    ssrc: u32,
    sender_reports: Vec<SenderReport>,
    reception_reports: Vec<ReceptionReport>,
    sdes_chunks: Vec<SourceDescriptionChunk>,
}

impl CompoundPacket {
    /// `ssrc` is written as the sender SSRC of generated Receiver Reports.
    pub fn new(ssrc: u32) -> Self {
        Self {
            ssrc,
            ..Default::default()
        }
    }

    pub fn add_sender_report(&mut self, report: SenderReport) {
        self.sender_reports.push(report);
    }

    pub fn add_receiver_report(&mut self, report: ReceptionReport) {
        self.reception_reports.push(report);
    }

    pub fn add_sdes_chunk(&mut self, chunk: SourceDescriptionChunk) {
        self.sdes_chunks.push(chunk);
    }

    pub fn has_sender_report(&self) -> bool {
        !self.sender_reports.is_empty()
    }

    pub fn sender_report_count(&self) -> usize {
        self.sender_reports.len()
    }

    pub fn receiver_report_count(&self) -> usize {
        self.reception_reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender_reports.is_empty()
            && self.reception_reports.is_empty()
            && self.sdes_chunks.is_empty()
    }

    /// Builds the RTCP packets making up this compound packet, in wire order.
    pub fn packets(&self) -> Vec<Box<dyn rtcp::packet::Packet + Send + Sync>> {
        let mut packets: Vec<Box<dyn rtcp::packet::Packet + Send + Sync>> = vec![];

        for sr in &self.sender_reports {
            packets.push(Box::new(sr.clone()));
        }
        for reports in self.reception_reports.chunks(MAX_ITEMS_PER_PACKET) {
            packets.push(Box::new(ReceiverReport {
                ssrc: self.ssrc,
                reports: reports.to_vec(),
                ..Default::default()
            }));
        }
        for chunks in self.sdes_chunks.chunks(MAX_ITEMS_PER_PACKET) {
            packets.push(Box::new(SourceDescription {
                chunks: chunks.to_vec(),
            }));
        }

        packets
    }

    /// Serialised size in bytes.
    pub fn size(&self) -> usize {
        self.packets().iter().map(|p| p.marshal_size()).sum()
    }

    /// Writes the compound packet into `buf`, returning the number of bytes
    /// written. Fails with [`Error::ErrBufferOverflow`] when `buf` is too
    /// small, in which case nothing is written.
    pub fn serialize(&self, buf: &mut [u8]) -> Result<usize> {
        let packets = self.packets();
        let size: usize = packets.iter().map(|p| p.marshal_size()).sum();
        if size > buf.len() {
            return Err(Error::ErrBufferOverflow(size));
        }

        let mut offset = 0;
        for packet in &packets {
            offset += packet.marshal_to(&mut buf[offset..])?;
        }

        Ok(offset)
    }
}
