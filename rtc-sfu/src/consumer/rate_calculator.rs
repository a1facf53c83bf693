use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding-window bitrate of a sent stream.
#[derive(Debug)]
pub struct RateCalculator {
    window: Duration,
    samples: VecDeque<(Instant, usize)>,
    bytes: usize,
}

impl Default for RateCalculator {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl RateCalculator {
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.max(Duration::from_millis(1)),
            samples: VecDeque::new(),
            bytes: 0,
        }
    }

    pub fn update(&mut self, size: usize, now: Instant) {
        self.expire(now);
        self.samples.push_back((now, size));
        self.bytes += size;
    }

    /// Bits per second over the window ending at `now`.
    pub fn rate(&mut self, now: Instant) -> u32 {
        self.expire(now);
        let bits = self.bytes as f64 * 8.0;
        (bits / self.window.as_secs_f64()).min(u32::MAX as f64) as u32
    }

    fn expire(&mut self, now: Instant) {
        while let Some(&(at, size)) = self.samples.front() {
            if now.saturating_duration_since(at) < self.window {
                break;
            }
            self.samples.pop_front();
            self.bytes -= size;
        }
    }
}
