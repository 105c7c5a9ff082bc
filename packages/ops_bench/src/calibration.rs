use std::time::Duration;

use tracing::{debug, warn};

use crate::pal::{Platform, PlatformFacade};
use crate::{Error, Result};

/// How many consecutive timer deltas are averaged to estimate the resolution of a source.
const RESOLUTION_TRIALS: u32 = 30;

/// How many reads we attempt per trial before declaring a timer source frozen.
const READS_PER_TRIAL: u32 = 1_000_000;

/// The wall clock is never trusted to resolve better than this, whatever it claims.
const MILLISECOND_RESOLUTION_FLOOR: f64 = 0.0015;

/// Lower bound for the automatically derived minimum cycle time, in seconds.
const MIN_TIME_FLOOR: f64 = 0.05;

/// Largest timer uncertainty we accept relative to a measured cycle.
const MAX_TIMER_UNCERTAINTY: f64 = 0.01;

/// The unit a timer source counts in. Sources are preferred in declaration order.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum TimerUnit {
    /// A monotonic nanosecond counter.
    Nanoseconds,

    /// A monotonic microsecond counter.
    Microseconds,

    /// The millisecond wall clock.
    Milliseconds,
}

impl TimerUnit {
    /// Every unit, highest resolution first.
    pub(crate) const PRIORITY: [Self; 3] = [Self::Nanoseconds, Self::Microseconds, Self::Milliseconds];

    /// How many ticks of this unit make up one second.
    #[must_use]
    pub fn ticks_per_second(self) -> u64 {
        match self {
            Self::Nanoseconds => 1_000_000_000,
            Self::Microseconds => 1_000_000,
            Self::Milliseconds => 1_000,
        }
    }

    #[cfg(test)]
    pub(crate) fn nanos_per_tick(self) -> u64 {
        match self {
            Self::Nanoseconds => 1,
            Self::Microseconds => 1_000,
            Self::Milliseconds => 1_000_000,
        }
    }
}

/// An opaque reading of the calibrated timer source.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub(crate) struct Stamp(u64);

/// The selected timer source and its empirically measured resolution.
///
/// Calibration is performed once by [`Calibration::measure()`] and then shared between
/// benchmarks via `Arc`, so every run reads the same timer and trusts the same floor.
///
/// # Examples
///
/// ```
/// use ops_bench::Calibration;
///
/// let calibration = Calibration::measure().expect("the platform offers a usable timer");
/// println!(
///     "using {:?} timer with {:?} resolution",
///     calibration.unit(),
///     calibration.resolution()
/// );
/// ```
#[derive(Debug)]
pub struct Calibration {
    platform: PlatformFacade,
    unit: TimerUnit,

    // Seconds.
    resolution: f64,
}

impl Calibration {
    /// Selects the highest-resolution timer source of the current platform and measures
    /// its resolution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timer`] if no timer source ever reports a positive delta between
    /// consecutive reads.
    pub fn measure() -> Result<Self> {
        Self::measure_on(PlatformFacade::real())
    }

    pub(crate) fn measure_on(platform: PlatformFacade) -> Result<Self> {
        for unit in TimerUnit::PRIORITY {
            if platform.ticks(unit).is_none() {
                debug!(?unit, "timer source not available");
                continue;
            }

            let Some(resolution) = measure_resolution(&platform, unit) else {
                warn!(?unit, "timer source never advanced, trying a coarser one");
                continue;
            };

            let resolution = if unit == TimerUnit::Milliseconds {
                resolution.max(MILLISECOND_RESOLUTION_FLOOR)
            } else {
                resolution
            };

            debug!(?unit, resolution, "timer calibrated");

            return Ok(Self {
                platform,
                unit,
                resolution,
            });
        }

        Err(Error::Timer {
            problem: format!(
                "no timer source advanced within {RESOLUTION_TRIALS} trials of {READS_PER_TRIAL} reads"
            ),
        })
    }

    /// Creates a calibration with a known unit and resolution, skipping the measurement.
    #[cfg(test)]
    pub(crate) fn fixed(platform: PlatformFacade, unit: TimerUnit, resolution: f64) -> Self {
        Self {
            platform,
            unit,
            resolution,
        }
    }

    /// The unit of the selected timer source.
    #[must_use]
    pub fn unit(&self) -> TimerUnit {
        self.unit
    }

    /// The smallest time span the selected timer source can resolve.
    #[must_use]
    pub fn resolution(&self) -> Duration {
        Duration::from_secs_f64(self.resolution)
    }

    pub(crate) fn resolution_secs(&self) -> f64 {
        self.resolution
    }

    /// The minimum cycle time used when a benchmark does not configure one, in seconds.
    ///
    /// This keeps the timer uncertainty at or below 1% of every accepted cycle.
    #[must_use]
    pub fn default_min_time(&self) -> Duration {
        Duration::from_secs_f64(self.default_min_time_secs())
    }

    pub(crate) fn default_min_time_secs(&self) -> f64 {
        (self.resolution / 2.0 / MAX_TIMER_UNCERTAINTY).max(MIN_TIME_FLOOR)
    }

    /// Reads the selected timer source.
    ///
    /// A source that stops reporting after calibration reads as the origin, which makes
    /// any interval it participates in measure as zero.
    pub(crate) fn now(&self) -> Stamp {
        Stamp(self.platform.ticks(self.unit).unwrap_or_default())
    }

    /// Seconds between two readings; zero if `end` precedes `start`.
    #[expect(
        clippy::cast_precision_loss,
        reason = "tick counts beyond 2^52 lose sub-tick precision, which is far below resolution"
    )]
    pub(crate) fn seconds_between(&self, start: Stamp, end: Stamp) -> f64 {
        end.0.saturating_sub(start.0) as f64 / self.unit.ticks_per_second() as f64
    }
}

/// Averages the smallest observable delta of the timer source over a number of trials,
/// returning `None` if the source is frozen or runs backwards.
#[cfg_attr(test, mutants::skip)] // Mutations easily turn this into an endless spin.
#[expect(
    clippy::cast_precision_loss,
    reason = "deltas are tiny tick counts, exactly representable"
)]
fn measure_resolution(platform: &impl Platform, unit: TimerUnit) -> Option<f64> {
    let mut total_ticks: u64 = 0;

    for _ in 0..RESOLUTION_TRIALS {
        let begin = platform.ticks(unit)?;
        let mut delta = None;

        for _ in 0..READS_PER_TRIAL {
            let now = platform.ticks(unit)?;

            if now != begin {
                // A source that runs backwards is as useless as a frozen one.
                delta = Some(now.checked_sub(begin)?);
                break;
            }
        }

        total_ticks = total_ticks.saturating_add(delta?);
    }

    Some(
        total_ticks as f64
            / f64::from(RESOLUTION_TRIALS)
            / unit.ticks_per_second() as f64,
    )
}
