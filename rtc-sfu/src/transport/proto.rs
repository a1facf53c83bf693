use super::{Transport, TransportEvent};
use crate::error::Error;
use crate::{Packet, TaggedDatagram, TaggedPacket, TaggedRtpPacket};
use std::time::Instant;

/// Sans-I/O surface of a [`Transport`].
///
/// | Call | Meaning |
/// |------|---------|
/// | `handle_read` | RTP or parsed RTCP received from the remote endpoint |
/// | `handle_write` | RTP to forward through one of the consumers |
/// | `poll_write` | serialized RTP and compound RTCP to put on the wire |
/// | `poll_event` | [`TransportEvent`] notifications |
/// | `handle_timeout` / `poll_timeout` | the RTCP timer |
impl sansio::Protocol<TaggedPacket, TaggedRtpPacket, ()> for Transport {
    type Rout = ();
    type Wout = TaggedDatagram;
    type Eout = TransportEvent;
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: TaggedPacket) -> Result<(), Self::Error> {
        if self.closed {
            return Err(Error::ErrTransportClosed);
        }

        match msg.message {
            Packet::Rtp(packet) => self.receive_rtp_packet(msg.now, packet),
            Packet::Rtcp(packets) => {
                for packet in &packets {
                    self.receive_rtcp_packet(msg.now, packet);
                }
            }
        }
        Ok(())
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        None
    }

    fn handle_write(&mut self, msg: TaggedRtpPacket) -> Result<(), Self::Error> {
        self.send_rtp_packet(msg.now, &msg.message.consumer_id, msg.message.packet)
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.outbox.transmits.pop_front()
    }

    fn handle_event(&mut self, _evt: ()) -> Result<(), Self::Error> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.outbox.events.pop_front()
    }

    fn handle_timeout(&mut self, now: Self::Time) -> Result<(), Self::Error> {
        if self.scheduler.is_due(now) {
            self.on_rtcp_timer(now);
        }
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        self.scheduler.poll_timeout()
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        Transport::close(self);
        Ok(())
    }
}
