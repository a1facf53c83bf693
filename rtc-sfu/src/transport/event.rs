/// Notification raised by a [`Transport`](super::Transport) toward its
/// owner, drained with `poll_event`.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    ProducerClosed {
        producer_id: String,
    },
    ConsumerClosed {
        consumer_id: String,
    },
    ProducerPaused {
        producer_id: String,
    },
    ProducerResumed {
        producer_id: String,
    },
    ProducerStreamEnabled {
        producer_id: String,
        ssrc: u32,
        mapped_ssrc: u32,
    },
    ProducerStreamDisabled {
        producer_id: String,
        ssrc: u32,
        mapped_ssrc: u32,
    },
    /// An RTP packet accepted by a producer, already carrying its mapped SSRC.
    ProducerRtpPacketReceived {
        producer_id: String,
        packet: rtp::packet::Packet,
    },
    /// A consumer needs a key frame from the producer it forwards.
    ConsumerKeyFrameRequested {
        consumer_id: String,
        ssrc: u32,
    },
}
