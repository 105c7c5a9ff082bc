//! Real platform implementation backed by the operating system clocks.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::TimerUnit;
use crate::pal::Platform;

/// Reads the monotonic clock for the nanosecond and microsecond sources and the
/// wall clock for the millisecond source.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RealPlatform {
    origin: Instant,
}

impl RealPlatform {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Platform for RealPlatform {
    #[cfg_attr(test, mutants::skip)] // Real clock readings cannot be asserted exactly.
    fn ticks(&self, unit: TimerUnit) -> Option<u64> {
        match unit {
            TimerUnit::Nanoseconds => u64::try_from(self.origin.elapsed().as_nanos()).ok(),
            TimerUnit::Microseconds => u64::try_from(self.origin.elapsed().as_micros()).ok(),
            TimerUnit::Milliseconds => {
                let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
                u64::try_from(since_epoch.as_millis()).ok()
            }
        }
    }
}
