//! Platform abstraction trait definitions.

use std::fmt::Debug;

use crate::TimerUnit;

/// Provides raw readings of the timer sources available on a platform.
pub(crate) trait Platform: Debug + Send + Sync + 'static {
    /// Reads the timer source that counts in `unit`, returning the number of ticks elapsed
    /// since an arbitrary origin that stays fixed for the lifetime of the platform.
    ///
    /// Returns `None` if the platform has no timer source with this unit.
    fn ticks(&self, unit: TimerUnit) -> Option<u64>;
}
