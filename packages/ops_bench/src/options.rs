use std::num::NonZero;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use new_zealand::nz;

static NEXT_BENCHMARK_ID: AtomicU64 = AtomicU64::new(1);

/// Hands out process-unique benchmark identities, used when a benchmark is not named.
pub(crate) fn next_benchmark_id() -> u64 {
    NEXT_BENCHMARK_ID.fetch_add(1, Ordering::Relaxed)
}

/// The settings that control how a benchmark is executed.
///
/// Options are immutable for the duration of a run. To derive a new set of options from an
/// existing one, apply an [`OptionsOverride`] via [`merged()`](Self::merged).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use ops_bench::Options;
///
/// let options = Options::default()
///     .with_name("vec_push")
///     .with_min_time(Duration::from_millis(10))
///     .with_max_time(Duration::from_millis(500));
///
/// assert_eq!(options.name(), "vec_push");
/// assert_eq!(options.min_samples().get(), 5);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Options {
    async_mode: bool,
    defer: bool,
    delay: Duration,
    init_count: NonZero<u64>,
    max_time: Duration,
    min_samples: NonZero<usize>,
    min_time: Duration,
    name: String,
    id: u64,
}

impl Options {
    /// Whether cycles are continued after a delay instead of immediately, yielding to the
    /// host scheduler between cycles.
    #[must_use]
    pub fn async_mode(&self) -> bool {
        self.async_mode
    }

    /// Whether the test body signals its own completion via a [`Deferred`][crate::Deferred].
    #[must_use]
    pub fn defer(&self) -> bool {
        self.defer
    }

    /// The delay between cycles in async mode.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// The number of iterations of the first cycle.
    #[must_use]
    pub fn init_count(&self) -> NonZero<u64> {
        self.init_count
    }

    /// The wall-clock time after which sampling stops, once enough samples exist.
    #[must_use]
    pub fn max_time(&self) -> Duration {
        self.max_time
    }

    /// The number of samples that must be collected before sampling may stop.
    #[must_use]
    pub fn min_samples(&self) -> NonZero<usize> {
        self.min_samples
    }

    /// The time a cycle must take before its iteration count is trusted.
    ///
    /// Zero means the minimum is derived from the resolution of the timer.
    #[must_use]
    pub fn min_time(&self) -> Duration {
        self.min_time
    }

    /// The name of the benchmark; may be empty.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The process-unique identity of the benchmark.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Sets whether cycles yield to the host scheduler for [`delay()`](Self::delay) between
    /// cycles.
    #[must_use]
    pub fn with_async_mode(mut self, value: bool) -> Self {
        self.async_mode = value;
        self
    }

    /// Sets whether the test body signals its own completion.
    #[must_use]
    pub fn with_defer(mut self, value: bool) -> Self {
        self.defer = value;
        self
    }

    /// Sets the delay between cycles in async mode.
    #[must_use]
    pub fn with_delay(mut self, value: Duration) -> Self {
        self.delay = value;
        self
    }

    /// Sets the number of iterations of the first cycle.
    #[must_use]
    pub fn with_init_count(mut self, value: NonZero<u64>) -> Self {
        self.init_count = value;
        self
    }

    /// Sets the wall-clock budget of a run.
    #[must_use]
    pub fn with_max_time(mut self, value: Duration) -> Self {
        self.max_time = value;
        self
    }

    /// Sets the number of samples that must be collected before sampling may stop.
    #[must_use]
    pub fn with_min_samples(mut self, value: NonZero<usize>) -> Self {
        self.min_samples = value;
        self
    }

    /// Sets the time a cycle must take before its iteration count is trusted.
    #[must_use]
    pub fn with_min_time(mut self, value: Duration) -> Self {
        self.min_time = value;
        self
    }

    /// Sets the name of the benchmark.
    #[must_use]
    pub fn with_name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the identity of the benchmark.
    #[must_use]
    pub fn with_id(mut self, value: u64) -> Self {
        self.id = value;
        self
    }

    /// Returns a copy of these options with every field set in `overrides` replaced.
    #[must_use]
    pub fn merged(&self, overrides: &OptionsOverride) -> Self {
        Self {
            async_mode: overrides.async_mode.unwrap_or(self.async_mode),
            defer: overrides.defer.unwrap_or(self.defer),
            delay: overrides.delay.unwrap_or(self.delay),
            init_count: overrides.init_count.unwrap_or(self.init_count),
            max_time: overrides.max_time.unwrap_or(self.max_time),
            min_samples: overrides.min_samples.unwrap_or(self.min_samples),
            min_time: overrides.min_time.unwrap_or(self.min_time),
            name: overrides.name.clone().unwrap_or_else(|| self.name.clone()),
            id: overrides.id.unwrap_or(self.id),
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            async_mode: false,
            defer: false,
            delay: Duration::from_millis(5),
            init_count: nz!(1),
            max_time: Duration::from_secs(5),
            min_samples: nz!(5),
            min_time: Duration::ZERO,
            name: String::new(),
            id: next_benchmark_id(),
        }
    }
}

/// A partial set of [`Options`], applied over existing options when cloning or re-running
/// a benchmark.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use ops_bench::{Options, OptionsOverride};
///
/// let base = Options::default().with_name("parse");
/// let quick = base.merged(&OptionsOverride::new().with_max_time(Duration::from_millis(100)));
///
/// assert_eq!(quick.name(), "parse");
/// assert_eq!(quick.max_time(), Duration::from_millis(100));
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OptionsOverride {
    async_mode: Option<bool>,
    defer: Option<bool>,
    delay: Option<Duration>,
    init_count: Option<NonZero<u64>>,
    max_time: Option<Duration>,
    min_samples: Option<NonZero<usize>>,
    min_time: Option<Duration>,
    name: Option<String>,
    id: Option<u64>,
}

impl OptionsOverride {
    /// Creates an override that changes nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether applying this override would leave options unchanged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overrides [`Options::async_mode()`].
    #[must_use]
    pub fn with_async_mode(mut self, value: bool) -> Self {
        self.async_mode = Some(value);
        self
    }

    /// Overrides [`Options::defer()`].
    #[must_use]
    pub fn with_defer(mut self, value: bool) -> Self {
        self.defer = Some(value);
        self
    }

    /// Overrides [`Options::delay()`].
    #[must_use]
    pub fn with_delay(mut self, value: Duration) -> Self {
        self.delay = Some(value);
        self
    }

    /// Overrides [`Options::init_count()`].
    #[must_use]
    pub fn with_init_count(mut self, value: NonZero<u64>) -> Self {
        self.init_count = Some(value);
        self
    }

    /// Overrides [`Options::max_time()`].
    #[must_use]
    pub fn with_max_time(mut self, value: Duration) -> Self {
        self.max_time = Some(value);
        self
    }

    /// Overrides [`Options::min_samples()`].
    #[must_use]
    pub fn with_min_samples(mut self, value: NonZero<usize>) -> Self {
        self.min_samples = Some(value);
        self
    }

    /// Overrides [`Options::min_time()`].
    #[must_use]
    pub fn with_min_time(mut self, value: Duration) -> Self {
        self.min_time = Some(value);
        self
    }

    /// Overrides [`Options::name()`].
    #[must_use]
    pub fn with_name(mut self, value: impl Into<String>) -> Self {
        self.name = Some(value.into());
        self
    }

    /// Overrides [`Options::id()`].
    #[must_use]
    pub fn with_id(mut self, value: u64) -> Self {
        self.id = Some(value);
        self
    }

    pub(crate) fn id(&self) -> Option<u64> {
        self.id
    }
}
