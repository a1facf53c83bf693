//! Incoming bitrate ceiling and outgoing bitrate estimate.

/// Lowest accepted incoming bitrate ceiling, in bits per second.
pub const MIN_INCOMING_BITRATE: u32 = 10_000;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BitrateEstimator {
    max_incoming_bitrate: Option<u32>,
    available_outgoing_bitrate: u32,
}

impl BitrateEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the incoming bitrate ceiling, raising values below
    /// [`MIN_INCOMING_BITRATE`] to it. Returns the stored value.
    pub fn set_max_incoming_bitrate(&mut self, bitrate: u32) -> u32 {
        let bitrate = bitrate.max(MIN_INCOMING_BITRATE);
        self.max_incoming_bitrate = Some(bitrate);
        bitrate
    }

    /// Caller-configured ceiling, `None` until one was set.
    pub fn max_incoming_bitrate(&self) -> Option<u32> {
        self.max_incoming_bitrate
    }

    /// Records the bitrate announced by a REMB message as-is.
    pub fn on_remb_received(&mut self, bitrate: u32) {
        self.available_outgoing_bitrate = bitrate;
    }

    pub fn available_outgoing_bitrate(&self) -> u32 {
        self.available_outgoing_bitrate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_incoming_bitrate_floor() {
        let mut estimator = BitrateEstimator::new();
        assert_eq!(estimator.max_incoming_bitrate(), None);

        assert_eq!(estimator.set_max_incoming_bitrate(500), 10_000);
        assert_eq!(estimator.max_incoming_bitrate(), Some(10_000));

        assert_eq!(estimator.set_max_incoming_bitrate(50_000), 50_000);
        assert_eq!(estimator.max_incoming_bitrate(), Some(50_000));

        assert_eq!(estimator.set_max_incoming_bitrate(0), 10_000);
    }

    #[test]
    fn test_remb_overwrites_estimate() {
        let mut estimator = BitrateEstimator::new();
        estimator.on_remb_received(300_000);
        estimator.on_remb_received(120_000);
        assert_eq!(estimator.available_outgoing_bitrate(), 120_000);
    }
}
