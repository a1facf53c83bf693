//! Sent-packet history used to answer NACKs.

use crate::error::{Error, Result};

const HALF_SEQ_SPACE: u16 = 1 << 15;

/// Ring of recently sent packets, indexed by sequence number.
pub(crate) struct SendBuffer {
    slots: Vec<Option<rtp::packet::Packet>>,
    highest: Option<u16>,
}

impl SendBuffer {
    /// `size` must be a power of two between 1 and 32768.
    pub(crate) fn new(size: u16) -> Result<Self> {
        if !size.is_power_of_two() {
            return Err(Error::ErrInvalidSendBufferSize);
        }

        Ok(Self {
            slots: vec![None; size as usize],
            highest: None,
        })
    }

    fn index(&self, seq: u16) -> usize {
        seq as usize % self.slots.len()
    }

    pub(crate) fn add(&mut self, packet: rtp::packet::Packet) {
        let seq = packet.header.sequence_number;

        match self.highest {
            None => self.highest = Some(seq),
            Some(highest) => {
                let ahead = seq.wrapping_sub(highest);
                if ahead == 0 {
                    return;
                }
                if ahead < HALF_SEQ_SPACE {
                    // forget whatever sat in the slots of skipped sequence numbers
                    let mut skipped = highest.wrapping_add(1);
                    while skipped != seq {
                        let idx = self.index(skipped);
                        self.slots[idx] = None;
                        skipped = skipped.wrapping_add(1);
                    }
                    self.highest = Some(seq);
                }
            }
        }

        let idx = self.index(seq);
        self.slots[idx] = Some(packet);
    }

    pub(crate) fn get(&self, seq: u16) -> Option<&rtp::packet::Packet> {
        let highest = self.highest?;

        let age = highest.wrapping_sub(seq);
        if age >= HALF_SEQ_SPACE || age as usize >= self.slots.len() {
            return None;
        }

        self.slots[self.index(seq)]
            .as_ref()
            .filter(|p| p.header.sequence_number == seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(seq: u16) -> rtp::packet::Packet {
        rtp::packet::Packet {
            header: rtp::header::Header {
                sequence_number: seq,
                ..Default::default()
            },
            payload: vec![seq as u8].into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_invalid_size() {
        assert!(SendBuffer::new(0).is_err());
        assert!(SendBuffer::new(100).is_err());
        assert!(SendBuffer::new(1).is_ok());
        assert!(SendBuffer::new(32768).is_ok());
    }

    #[test]
    fn test_get_within_window() {
        let mut buffer = SendBuffer::new(8).unwrap();
        assert!(buffer.get(0).is_none());

        for seq in 0..10u16 {
            buffer.add(packet(seq));
        }

        assert!(buffer.get(1).is_none());
        for seq in 2..10u16 {
            assert_eq!(buffer.get(seq).map(|p| p.header.sequence_number), Some(seq));
        }
        assert!(buffer.get(10).is_none());
    }

    #[test]
    fn test_gap_clears_stale_slots() {
        let mut buffer = SendBuffer::new(8).unwrap();
        buffer.add(packet(1));
        buffer.add(packet(2));
        buffer.add(packet(5));

        assert!(buffer.get(1).is_some());
        assert!(buffer.get(3).is_none());
        assert!(buffer.get(4).is_none());
        assert!(buffer.get(5).is_some());
    }

    #[test]
    fn test_wraparound() {
        let mut buffer = SendBuffer::new(16).unwrap();
        for seq in [65534u16, 65535, 0, 1] {
            buffer.add(packet(seq));
        }

        for seq in [65534u16, 65535, 0, 1] {
            assert!(buffer.get(seq).is_some(), "seq {seq}");
        }
    }
}
