//! Timer driving periodic compound RTCP emission.
//!
//! The next interval follows the send rate of the consumers: roughly
//! `360000 / kbps` milliseconds, never above [`MAX_VIDEO_RTCP_INTERVAL`],
//! then scaled by a random factor in `[0.5, 1.5]` so that transports
//! sharing a process do not emit RTCP in lockstep.

use crate::rtp_parameters::MediaKind;
use rand::Rng;
use std::time::{Duration, Instant};

/// Upper bound of the RTCP interval.
pub const MAX_VIDEO_RTCP_INTERVAL: Duration = Duration::from_millis(1000);

/// Upper bound of the per-stream report interval of audio endpoints.
pub const MAX_AUDIO_RTCP_INTERVAL: Duration = Duration::from_millis(5000);

/// Interval of the first firing after the timer is armed.
pub const DEFAULT_INITIAL_RTCP_INTERVAL: Duration = Duration::from_millis(500);

const RTCP_INTERVAL_NUMERATOR_MS: u64 = 360_000;

/// Smallest interval the timer is ever armed with.
const MIN_RTCP_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Armed(Instant),
}

#[derive(Debug)]
pub struct RtcpScheduler {
    state: TimerState,
    max_interval: Duration,
}

impl RtcpScheduler {
    pub fn new(max_interval: Duration) -> Self {
        Self {
            state: TimerState::Idle,
            max_interval: max_interval.max(MIN_RTCP_INTERVAL),
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, TimerState::Armed(_))
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Arms the timer to fire `interval` after `now`. A zero interval is
    /// raised to one millisecond.
    pub fn arm(&mut self, now: Instant, interval: Duration) {
        self.state = TimerState::Armed(now + interval.max(MIN_RTCP_INTERVAL));
    }

    /// Stops the timer. No firing is reported afterwards until re-armed.
    pub fn stop(&mut self) {
        self.state = TimerState::Idle;
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.state {
            TimerState::Armed(deadline) => deadline <= now,
            TimerState::Idle => false,
        }
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        match self.state {
            TimerState::Armed(deadline) => Some(deadline),
            TimerState::Idle => None,
        }
    }

    /// Jittered interval until the next firing, given the transmission
    /// rate of every consumer in bits per second.
    pub fn next_interval<I>(&self, rates: I) -> Duration
    where
        I: IntoIterator<Item = u32>,
    {
        let interval = compute_interval(rates, self.max_interval);
        jitter_interval(interval, rand::rng().random_range(5..=15))
    }
}

/// Interval before jitter.
///
/// Each rate is converted to kbit/s on its own before summing. Without
/// consumers, or when they send nothing, the maximum interval is used.
pub fn compute_interval<I>(rates: I, max_interval: Duration) -> Duration
where
    I: IntoIterator<Item = u32>,
{
    let kbps: u64 = rates.into_iter().map(|rate| u64::from(rate / 1000)).sum();
    if kbps == 0 {
        return max_interval;
    }

    Duration::from_millis(RTCP_INTERVAL_NUMERATOR_MS / kbps)
        .min(max_interval)
        .max(MIN_RTCP_INTERVAL)
}

/// Longest time an endpoint of the given kind waits between two reports.
pub fn max_rtcp_interval(kind: MediaKind) -> Duration {
    match kind {
        MediaKind::Audio => MAX_AUDIO_RTCP_INTERVAL,
        MediaKind::Video => MAX_VIDEO_RTCP_INTERVAL,
    }
}

/// Whether an endpoint that last reported at `last` should report again.
///
/// Due once `elapsed * 1.15` reaches the maximum interval of `kind`.
pub fn is_report_due(kind: MediaKind, last: Option<Instant>, now: Instant) -> bool {
    match last {
        Some(last) => {
            now.saturating_duration_since(last).as_secs_f64() * 1.15
                >= max_rtcp_interval(kind).as_secs_f64()
        }
        None => true,
    }
}

/// Scales `interval` by `tenths / 10`.
pub fn jitter_interval(interval: Duration, tenths: u32) -> Duration {
    interval * tenths / 10
}
