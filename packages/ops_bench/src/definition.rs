//! The immutable parts of a benchmark, shared by a benchmark and its execution instances.

use std::sync::Arc;

use crate::{Benchmark, Calibration, Deferred, Error, Options, Result};

pub(crate) type SyncBody = Arc<dyn Fn() + Send + Sync>;
pub(crate) type DeferredBody = Arc<dyn Fn(Deferred) + Send + Sync>;
pub(crate) type Hook = Arc<dyn Fn() + Send + Sync>;

/// The unit of work being measured.
#[derive(Clone, derive_more::Debug)]
pub(crate) enum Test {
    /// A body that finishes its work before returning.
    Sync(#[debug(ignore)] SyncBody),

    /// A body that signals completion via the [`Deferred`] handle it receives.
    Deferred(#[debug(ignore)] DeferredBody),
}

/// The test body and its hooks, read-only for the lifetime of every run.
#[derive(derive_more::Debug)]
pub(crate) struct Definition {
    pub(crate) test: Test,

    #[debug(ignore)]
    pub(crate) setup: Option<Hook>,

    #[debug(ignore)]
    pub(crate) teardown: Option<Hook>,
}

impl Definition {
    pub(crate) fn run_setup(&self) {
        if let Some(setup) = &self.setup {
            setup();
        }
    }

    pub(crate) fn run_teardown(&self) {
        if let Some(teardown) = &self.teardown {
            teardown();
        }
    }
}

/// Rejects option combinations that the test body cannot honor.
pub(crate) fn validate(options: &Options, test: &Test) -> Result<()> {
    match (test, options.defer()) {
        (Test::Sync(_), true) => {
            return Err(Error::configuration(
                "defer requires a test body registered with deferred_test()",
            ));
        }
        (Test::Deferred(_), false) => {
            return Err(Error::configuration(
                "a deferred test body requires the defer option",
            ));
        }
        _ => {}
    }

    if !options.min_time().is_zero() && options.max_time() < options.min_time() {
        return Err(Error::configuration(format!(
            "max_time {:?} is shorter than min_time {:?}",
            options.max_time(),
            options.min_time()
        )));
    }

    Ok(())
}

/// Assembles a [`Benchmark`] from a test body, optional hooks and options.
///
/// Obtain one via [`Benchmark::builder()`]. Options given via
/// [`options()`](Self::options) replace every option set earlier in the chain, including the
/// name and the `defer` flag set by [`deferred_test()`](Self::deferred_test).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use ops_bench::{Benchmark, Options};
///
/// let benchmark = Benchmark::builder()
///     .options(Options::default().with_max_time(Duration::from_millis(200)))
///     .name("string_concat")
///     .setup(|| println!("warming up"))
///     .test(|| {
///         let joined = ["a", "b", "c"].concat();
///         std::hint::black_box(joined);
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(benchmark.name(), "string_concat");
/// ```
#[derive(derive_more::Debug, Default)]
#[must_use]
pub struct BenchmarkBuilder {
    options: Options,
    test: Option<Test>,

    #[debug(ignore)]
    setup: Option<Hook>,

    #[debug(ignore)]
    teardown: Option<Hook>,

    calibration: Option<Arc<Calibration>>,
}

impl BenchmarkBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sets the name of the benchmark.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options = self.options.with_name(name);
        self
    }

    /// Sets a test body that completes its work before returning.
    pub fn test<F>(mut self, body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.test = Some(Test::Sync(Arc::new(body)));
        self
    }

    /// Sets a test body that signals completion via a [`Deferred`] handle, and enables the
    /// `defer` option.
    pub fn deferred_test<F>(mut self, body: F) -> Self
    where
        F: Fn(Deferred) + Send + Sync + 'static,
    {
        self.test = Some(Test::Deferred(Arc::new(body)));
        self.options = self.options.with_defer(true);
        self
    }

    /// Sets logic that runs once before the timed iterations of every cycle.
    pub fn setup<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(hook));
        self
    }

    /// Sets logic that runs once after the timed iterations of every cycle.
    pub fn teardown<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.teardown = Some(Arc::new(hook));
        self
    }

    /// Replaces all options.
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Uses an existing timer calibration instead of measuring a new one.
    ///
    /// Sharing one calibration between benchmarks saves the calibration time and makes them
    /// measure with the same timer.
    pub fn calibration(mut self, calibration: Arc<Calibration>) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// Validates the configuration and creates the benchmark.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no test body was set or the options contradict the
    /// test body, and [`Error::Timer`] if no calibration was given and the platform offers no
    /// usable timer.
    pub fn build(self) -> Result<Benchmark> {
        let Some(test) = self.test else {
            return Err(Error::configuration("a test body is required"));
        };

        validate(&self.options, &test)?;

        let calibration = match self.calibration {
            Some(calibration) => calibration,
            None => Arc::new(Calibration::measure()?),
        };

        let definition = Arc::new(Definition {
            test,
            setup: self.setup,
            teardown: self.teardown,
        });

        Ok(Benchmark::new(definition, self.options, calibration))
    }
}
