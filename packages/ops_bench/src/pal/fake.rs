//! Fake platform implementation for testing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::pal::abstractions::Platform;
use crate::{ERR_POISONED_LOCK, TimerUnit};

#[derive(Debug)]
struct FakePlatformState {
    now_nanos: u64,

    // Added to the clock after every read, so calibration can observe a moving timer.
    auto_advance_nanos: u64,

    unavailable: Vec<TimerUnit>,
}

/// Fake timer platform with a manually driven clock.
///
/// Clones share the same clock, so a test body can hold a clone and call
/// [`advance()`](Self::advance) to simulate work that takes a precise amount of time.
#[derive(Clone, Debug)]
pub(crate) struct FakePlatform {
    state: Arc<Mutex<FakePlatformState>>,
}

impl FakePlatform {
    /// Creates a fake platform whose clock only moves when advanced explicitly.
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakePlatformState {
                now_nanos: 0,
                auto_advance_nanos: 0,
                unavailable: Vec::new(),
            })),
        }
    }

    /// Moves the clock forward by `by`.
    pub(crate) fn advance(&self, by: Duration) {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
        state.now_nanos = state.now_nanos.saturating_add(nanos(by));
    }

    /// Makes every subsequent read move the clock forward by `step`.
    pub(crate) fn set_auto_advance(&self, step: Duration) {
        self.state.lock().expect(ERR_POISONED_LOCK).auto_advance_nanos = nanos(step);
    }

    /// Removes the timer source with the given unit from the platform.
    pub(crate) fn make_unavailable(&self, unit: TimerUnit) {
        self.state.lock().expect(ERR_POISONED_LOCK).unavailable.push(unit);
    }
}

impl Platform for FakePlatform {
    fn ticks(&self, unit: TimerUnit) -> Option<u64> {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

        if state.unavailable.contains(&unit) {
            return None;
        }

        let now = state.now_nanos;
        state.now_nanos = now.saturating_add(state.auto_advance_nanos);

        Some(now.checked_div(unit.nanos_per_tick()).unwrap_or_default())
    }
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero_and_stays_frozen() {
        let platform = FakePlatform::new();

        assert_eq!(platform.ticks(TimerUnit::Nanoseconds), Some(0));
        assert_eq!(platform.ticks(TimerUnit::Nanoseconds), Some(0));
    }

    #[test]
    fn advance_is_visible_in_every_unit() {
        let platform = FakePlatform::new();
        platform.advance(Duration::from_millis(3));

        assert_eq!(platform.ticks(TimerUnit::Nanoseconds), Some(3_000_000));
        assert_eq!(platform.ticks(TimerUnit::Microseconds), Some(3_000));
        assert_eq!(platform.ticks(TimerUnit::Milliseconds), Some(3));
    }

    #[test]
    fn auto_advance_moves_clock_per_read() {
        let platform = FakePlatform::new();
        platform.set_auto_advance(Duration::from_nanos(5));

        assert_eq!(platform.ticks(TimerUnit::Nanoseconds), Some(0));
        assert_eq!(platform.ticks(TimerUnit::Nanoseconds), Some(5));
    }

    #[test]
    fn clones_share_the_clock() {
        let platform = FakePlatform::new();
        let clone = platform.clone();

        clone.advance(Duration::from_nanos(42));

        assert_eq!(platform.ticks(TimerUnit::Nanoseconds), Some(42));
    }

    #[test]
    fn unavailable_unit_reads_none() {
        let platform = FakePlatform::new();
        platform.make_unavailable(TimerUnit::Nanoseconds);

        assert_eq!(platform.ticks(TimerUnit::Nanoseconds), None);
        assert_eq!(platform.ticks(TimerUnit::Microseconds), Some(0));
    }
}
