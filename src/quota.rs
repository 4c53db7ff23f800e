//! Poll-quota discipline: bound how long a progress hook busy-polls before
//! yielding back to the state machine's outer loop.
//!
//! Mirrors the `LDO_POLL_TIME_REMAIN` macro in
//! `original_source/src/dpa/ldo_dev.h`, which compares elapsed time against
//! a fixed microsecond budget on every spin iteration.

use quanta::{Clock, Instant};
use std::time::Duration;

/// A started poll-quota window. Construct one at the top of a progress
/// hook's busy-poll loop, then call [`PollQuota::has_time_remaining`] each
/// iteration.
pub struct PollQuota {
    start: Instant,
    quota: Duration,
    clock: Clock,
}

impl PollQuota {
    /// Start a new quota window of `quota_usec` microseconds, timed from
    /// now.
    pub fn start(clock: Clock, quota_usec: u64) -> Self {
        Self {
            start: clock.now(),
            quota: Duration::from_micros(quota_usec),
            clock,
        }
    }

    /// `true` while less than the quota has elapsed since [`PollQuota::start`].
    pub fn has_time_remaining(&self) -> bool {
        self.clock.now().duration_since(self.start) < self.quota
    }

    /// Elapsed time since the quota window started.
    pub fn elapsed(&self) -> Duration {
        self.clock.now().duration_since(self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_quota_has_time_remaining() {
        let quota = PollQuota::start(Clock::new(), 50);
        assert!(quota.has_time_remaining());
    }

    #[test]
    fn zero_quota_is_immediately_exhausted() {
        let quota = PollQuota::start(Clock::new(), 0);
        assert!(!quota.has_time_remaining());
    }
}
