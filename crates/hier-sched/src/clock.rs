//! Scheduler time base and dequeue pacing.
//!
//! All deadlines are expressed in milliseconds since an epoch latched by the
//! first enqueue. Time is driven by a [`quanta::Clock`] so simulations and
//! tests can substitute `Clock::mock()`.

use std::thread;
use std::time::Duration;

use quanta::{Clock, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SchedulerClock {
    clock: Clock,
    epoch: Option<Instant>,
    now_ms: u64,
}

impl SchedulerClock {
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            clock,
            epoch: None,
            now_ms: 0,
        }
    }

    /// Latch the epoch if none is set or the last sample was zero.
    ///
    /// Returns `true` when a new epoch was taken.
    pub fn latch_if_unset(&mut self) -> bool {
        if self.epoch.is_some() && self.now_ms != 0 {
            return false;
        }
        self.epoch = Some(self.clock.now());
        debug!("scheduler epoch latched");
        true
    }

    /// Zero the current time so the next enqueue re-latches the epoch.
    pub fn reset(&mut self) {
        self.now_ms = 0;
        debug!("scheduler clock reset");
    }

    /// Recompute `now` from the underlying clock. Clamped at zero.
    pub fn sample(&mut self) -> u64 {
        self.now_ms = match self.epoch {
            Some(epoch) => {
                let elapsed = self.clock.now().saturating_duration_since(epoch);
                u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
            }
            None => 0,
        };
        self.now_ms
    }

    /// Time as of the last [`sample`](Self::sample).
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn is_latched(&self) -> bool {
        self.epoch.is_some()
    }
}

impl Default for SchedulerClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Pacer ───────────────────────────────────────────────────────────────────

/// Fixed pause before every dequeue attempt. A zero interval disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    interval: Duration,
}

impl Pacer {
    /// Pause used by the WRR policies.
    pub const WRR: Pacer = Pacer::new(Duration::from_millis(10));
    /// Pause used by the credit policy.
    pub const CREDIT: Pacer = Pacer::new(Duration::from_micros(10));

    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub const fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn pace(&self) {
        if !self.interval.is_zero() {
            thread::sleep(self.interval);
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlatched_clock_reads_zero() {
        let (clock, mock) = Clock::mock();
        let mut sched = SchedulerClock::with_clock(clock);
        mock.increment(Duration::from_secs(5));
        assert_eq!(sched.sample(), 0);
        assert!(!sched.is_latched());
    }

    #[test]
    fn samples_millis_since_epoch() {
        let (clock, mock) = Clock::mock();
        mock.increment(Duration::from_secs(100));
        let mut sched = SchedulerClock::with_clock(clock);
        assert!(sched.latch_if_unset());
        mock.increment(Duration::from_millis(1_250));
        assert_eq!(sched.sample(), 1_250);
        assert_eq!(sched.now_ms(), 1_250);
    }

    #[test]
    fn relatches_while_now_is_zero() {
        let (clock, mock) = Clock::mock();
        let mut sched = SchedulerClock::with_clock(clock);
        assert!(sched.latch_if_unset());
        mock.increment(Duration::from_millis(30));
        // No sample yet, so now is still zero and the epoch moves.
        assert!(sched.latch_if_unset());
        assert_eq!(sched.sample(), 0);

        mock.increment(Duration::from_millis(30));
        assert_eq!(sched.sample(), 30);
        assert!(!sched.latch_if_unset());
    }

    #[test]
    fn reset_forces_relatch() {
        let (clock, mock) = Clock::mock();
        let mut sched = SchedulerClock::with_clock(clock);
        sched.latch_if_unset();
        mock.increment(Duration::from_millis(500));
        sched.sample();
        sched.reset();
        assert_eq!(sched.now_ms(), 0);
        assert!(sched.latch_if_unset());
        assert_eq!(sched.sample(), 0);
    }

    #[test]
    fn disabled_pacer_returns_immediately() {
        let pacer = Pacer::disabled();
        let start = std::time::Instant::now();
        for _ in 0..1_000 {
            pacer.pace();
        }
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(Pacer::WRR.interval(), Duration::from_millis(10));
    }
}
