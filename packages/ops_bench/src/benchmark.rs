use std::fmt;
use std::num::NonZero;
use std::sync::Arc;

use tracing::debug;

use crate::definition::{self, Definition};
use crate::event_channel::EventChannel;
use crate::execution::{self, NoRelay, Relay};
use crate::routine::Routine;
use crate::{
    AbortHandle, BenchmarkBuilder, Calibration, Comparison, Error, Event, EventKind,
    InstanceId, IntoEventKinds, ListenerId, Options, OptionsOverride, Result, Stats, Times,
    compare_samples,
};

/// Hz values below this are displayed with two decimals.
const PRECISE_HZ_LIMIT: f64 = 100.0;

/// The mutable state of one run, owned by exactly one benchmark at a time.
#[derive(Debug)]
pub(crate) struct RunState {
    pub(crate) count: NonZero<u64>,
    pub(crate) cycles: u64,
    pub(crate) running: bool,
    pub(crate) aborted: bool,
    pub(crate) error: Option<Error>,
    pub(crate) routine: Option<Routine>,
}

impl RunState {
    fn new(count: NonZero<u64>) -> Self {
        Self {
            count,
            cycles: 0,
            running: false,
            aborted: false,
            error: None,
            routine: None,
        }
    }

    fn is_initial(&self, count: NonZero<u64>) -> bool {
        self.count == count
            && self.cycles == 0
            && !self.running
            && !self.aborted
            && self.error.is_none()
    }
}

/// Which of `abort()` and `reset()` are already on the call stack of this benchmark.
#[derive(Debug, Default)]
struct InProgress {
    abort: bool,
    reset: bool,
}

/// A unit of work whose throughput is measured in operations per second.
///
/// Running a benchmark spawns a disposable execution instance that performs the cycles and
/// mirrors its progress back onto the benchmark, so the benchmark itself always shows the
/// latest measured state. The statistics of the last run stay available until the next run
/// starts.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use ops_bench::{Benchmark, Options};
///
/// let mut benchmark = Benchmark::builder()
///     .name("vec_push")
///     .options(
///         Options::default()
///             .with_name("vec_push")
///             .with_max_time(Duration::from_millis(100)),
///     )
///     .test(|| {
///         let mut items = Vec::with_capacity(16);
///         for i in 0..16 {
///             items.push(std::hint::black_box(i));
///         }
///     })
///     .build()
///     .unwrap();
///
/// benchmark.run();
///
/// assert!(benchmark.error().is_none());
/// assert!(benchmark.hz() > 0.0);
/// println!("{benchmark}");
/// ```
#[derive(Debug)]
pub struct Benchmark {
    pub(crate) definition: Arc<Definition>,
    pub(crate) options: Options,
    pub(crate) calibration: Arc<Calibration>,
    pub(crate) instance_id: InstanceId,

    pub(crate) state: RunState,
    pub(crate) times: Times,
    pub(crate) stats: Stats,
    pub(crate) hz: f64,

    events: EventChannel<Self>,
    in_progress: InProgress,

    pub(crate) abort_signal: AbortHandle,

    // The definition this benchmark is an execution instance of, if any.
    pub(crate) original: Option<InstanceId>,

    // The execution instance currently running on behalf of this benchmark, if any.
    pub(crate) active_instance: Option<InstanceId>,

    // Event kinds this execution instance relays to its original.
    pub(crate) relayed: Vec<EventKind>,
}

impl Benchmark {
    /// Starts assembling a new benchmark.
    pub fn builder() -> BenchmarkBuilder {
        BenchmarkBuilder::new()
    }

    pub(crate) fn new(
        definition: Arc<Definition>,
        options: Options,
        calibration: Arc<Calibration>,
    ) -> Self {
        Self {
            state: RunState::new(options.init_count()),
            definition,
            options,
            calibration,
            instance_id: InstanceId::next(),
            times: Times::default(),
            stats: Stats::default(),
            hz: 0.0,
            events: EventChannel::new(),
            in_progress: InProgress::default(),
            abort_signal: AbortHandle::new(),
            original: None,
            active_instance: None,
            relayed: Vec::new(),
        }
    }

    /// Creates the disposable execution instance that performs a run on behalf of this
    /// benchmark. The instance shares the definition, calibration and abort signal.
    pub(crate) fn spawn_instance(&self) -> Self {
        Self {
            abort_signal: self.abort_signal.clone(),
            original: Some(self.instance_id),
            relayed: vec![
                EventKind::Start,
                EventKind::Cycle,
                EventKind::Error,
                EventKind::Abort,
            ],
            ..Self::new(
                Arc::clone(&self.definition),
                self.options.clone(),
                Arc::clone(&self.calibration),
            )
        }
    }

    /// Measures the benchmark until its sampling budget is exhausted or it is aborted.
    ///
    /// The run happens on the calling thread. It emits `start`, then `cycle` after every
    /// measured cycle and finally `complete`; `error`, `abort` and `reset` are emitted when the
    /// run fails or is aborted. Failures of the test body are recorded in
    /// [`error()`](Self::error) instead of being returned.
    pub fn run(&mut self) -> &mut Self {
        // Not running, so the reset does not turn into an abort.
        self.state.running = false;
        self.reset();

        self.stats = Stats::default();
        self.hz = 0.0;
        self.abort_signal.clear();

        self.state.running = true;
        self.state.count = self.options.init_count();
        self.times.start(self.calibration.now());

        let mut event = Event::new(EventKind::Start);
        self.emit_via(&mut event, &mut NoRelay);

        if event.is_cancelled() {
            debug!(benchmark = %self.display_name(), "start cancelled");
            self.state.running = false;
            return self;
        }

        debug!(
            benchmark = %self.display_name(),
            instance = %self.instance_id,
            "run started"
        );

        execution::drive(self);
        self
    }

    /// Applies `overrides` to the options of this benchmark and runs it.
    ///
    /// The overrides persist after the run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the resulting options contradict the test body.
    /// The benchmark is left untouched in that case.
    pub fn run_with(&mut self, overrides: &OptionsOverride) -> Result<&mut Self> {
        let options = self.options.merged(overrides);
        definition::validate(&options, &self.definition.test)?;

        self.options = options;
        Ok(self.run())
    }

    /// Aborts the benchmark if it is running, emitting a cancellable `abort` event.
    pub fn abort(&mut self) -> &mut Self {
        self.abort_via(&mut NoRelay);
        self
    }

    /// Restores the run state to its initial values, emitting a cancellable `reset` event if
    /// anything changes. A running benchmark is aborted instead.
    ///
    /// The statistics and hz of the last run are kept.
    pub fn reset(&mut self) -> &mut Self {
        self.reset_via(&mut NoRelay);
        self
    }

    pub(crate) fn abort_via<R: Relay>(&mut self, relay: &mut R) {
        if !self.state.running {
            return;
        }

        let mut event = Event::new(EventKind::Abort);
        self.emit_via(&mut event, relay);

        if event.is_cancelled() && !self.in_progress.reset {
            debug!(benchmark = %self.display_name(), "abort cancelled");
            return;
        }

        self.in_progress.abort = true;
        self.reset_via(relay);
        self.in_progress.abort = false;

        if !self.in_progress.reset {
            self.state.aborted = true;
            self.state.running = false;
        }

        debug!(benchmark = %self.display_name(), instance = %self.instance_id, "aborted");
    }

    pub(crate) fn reset_via<R: Relay>(&mut self, relay: &mut R) {
        if self.state.running && !self.in_progress.abort {
            self.in_progress.reset = true;
            self.abort_via(relay);
            self.in_progress.reset = false;
            return;
        }

        let init_count = self.options.init_count();

        if self.state.is_initial(init_count) && self.times.is_initial() {
            return;
        }

        let mut event = Event::new(EventKind::Reset);
        self.emit_via(&mut event, relay);

        if event.is_cancelled() {
            return;
        }

        self.state = RunState::new(init_count);
        self.times = Times::default();
    }

    /// Creates a new, idle benchmark with the same test body and hooks, with `overrides`
    /// applied to a copy of the options. Listeners are not copied.
    ///
    /// The clone gets a new identity unless `overrides` sets one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the resulting options contradict the test body.
    pub fn clone_with(&self, overrides: &OptionsOverride) -> Result<Self> {
        let options = self
            .options
            .merged(overrides)
            .with_id(overrides.id().unwrap_or_else(crate::options::next_benchmark_id));

        definition::validate(&options, &self.definition.test)?;

        Ok(Self::new(
            Arc::clone(&self.definition),
            options,
            Arc::clone(&self.calibration),
        ))
    }

    /// Decides with a Mann-Whitney U test whether this benchmark is significantly faster or
    /// slower than `other`, based on the period samples of their last runs.
    ///
    /// A benchmark compared with itself, and any benchmark whose last run failed, is
    /// [`Comparison::Indeterminate`].
    #[must_use]
    pub fn compare(&self, other: &Self) -> Comparison {
        if self.instance_id == other.instance_id
            || self.state.error.is_some()
            || other.state.error.is_some()
        {
            return Comparison::Indeterminate;
        }

        compare_samples(self.stats.sample(), other.stats.sample())
    }

    /// Registers `listener` for one or more event kinds.
    ///
    /// A listener returning `false` cancels the event.
    pub fn on<F>(&mut self, kinds: impl IntoEventKinds, listener: F) -> ListenerId
    where
        F: Fn(&mut Event, &Self) -> bool + Send + Sync + 'static,
    {
        self.events.on(kinds, listener)
    }

    /// Removes `listener`, or every listener if `None`, from one or more event kinds.
    pub fn off(&mut self, kinds: impl IntoEventKinds, listener: Option<ListenerId>) -> &mut Self {
        self.events.off(kinds, listener);
        self
    }

    /// Delivers `event` to the listeners of its kind and returns it, with any cancellation
    /// or abort the listeners applied.
    pub fn emit(&self, event: impl Into<Event>) -> Event {
        let mut event = event.into();
        self.events.dispatch(&mut event, self, self.instance_id);
        event
    }

    /// The listeners registered for `kind`, in invocation order.
    #[must_use]
    pub fn listeners(&self, kind: EventKind) -> Vec<ListenerId> {
        self.events.listeners(kind)
    }

    /// Dispatches `event` to the own listeners and, for an execution instance, hands it over
    /// to the original through `relay`.
    pub(crate) fn emit_via<R: Relay>(&mut self, event: &mut Event, relay: &mut R) {
        self.events.dispatch(event, self, self.instance_id);

        if self.original.is_none() || !self.relayed.contains(&event.kind()) {
            return;
        }

        match relay.relay(event, self) {
            execution::Followup::None => {}
            execution::Followup::SetCount(count) => self.state.count = count,
            execution::Followup::Detach => {
                self.relayed.retain(|kind| *kind != EventKind::Abort);
                self.abort_via(relay);
            }
        }
    }

    /// Copies the measured state of an execution instance onto this benchmark.
    pub(crate) fn publish(&mut self, instance: &Self) {
        self.state.count = instance.state.count;
        self.state.cycles = self.state.cycles.max(instance.state.cycles);
        self.times = instance.times;
        self.hz = instance.hz;
        self.stats.clone_from(&instance.stats);

        if instance.state.error.is_some() {
            self.state.error.clone_from(&instance.state.error);
        }
    }

    /// The name of the benchmark; may be empty.
    #[must_use]
    pub fn name(&self) -> &str {
        self.options.name()
    }

    /// The name of the benchmark, or a placeholder naming its identity.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.options.name().is_empty() {
            format!("<Test #{}>", self.options.id())
        } else {
            self.options.name().to_string()
        }
    }

    /// The identity of the benchmark.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.options.id()
    }

    /// The identity this benchmark carries as the emitter of events.
    #[must_use]
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// The options the benchmark runs with.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The timer calibration the benchmark measures with.
    #[must_use]
    pub fn calibration(&self) -> &Arc<Calibration> {
        &self.calibration
    }

    /// Operations per second measured in the most recent cycle.
    #[must_use]
    pub fn hz(&self) -> f64 {
        self.hz
    }

    /// Statistics over every cycle of the current or last run.
    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Timing data of the current or last run.
    #[must_use]
    pub fn times(&self) -> &Times {
        &self.times
    }

    /// The number of iterations of the next or most recent cycle.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.state.count.get()
    }

    /// The number of cycles measured so far.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.state.cycles
    }

    /// Whether a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Whether the last run was aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.state.aborted
    }

    /// The failure of the last run, if it failed.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        self.state.error.as_ref()
    }

    /// A handle that aborts this benchmark from any thread.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_signal.clone()
    }
}

impl fmt::Display for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.display_name();

        if let Some(error) = &self.state.error {
            return write!(f, "{name}: {error}");
        }

        let size = self.stats.sample().len();
        let hz = if self.hz < PRECISE_HZ_LIMIT {
            format!("{:.2}", self.hz)
        } else {
            format!("{:.0}", self.hz)
        };

        write!(
            f,
            "{name} x {} ops/sec \u{b1}{:.2}% ({size} run{} sampled)",
            with_thousands_separators(&hz),
            self.stats.rme(),
            if size == 1 { "" } else { "s" }
        )
    }
}

/// Inserts a comma between every group of three digits of the integer part.
fn with_thousands_separators(number: &str) -> String {
    let (sign, unsigned) = number
        .strip_prefix('-')
        .map_or(("", number), |rest| ("-", rest));

    let (integer, fraction) = unsigned
        .split_once('.')
        .map_or((unsigned, None), |(integer, fraction)| {
            (integer, Some(fraction))
        });

    if !integer.bytes().all(|byte| byte.is_ascii_digit()) {
        return number.to_string();
    }

    let separators = integer.len().checked_div(3).unwrap_or_default();
    let mut grouped = String::with_capacity(number.len().saturating_add(separators));
    grouped.push_str(sign);

    let mut remaining = integer.len();

    for digit in integer.chars() {
        grouped.push(digit);
        remaining = remaining.saturating_sub(1);

        if remaining > 0 && remaining.checked_rem(3) == Some(0) {
            grouped.push(',');
        }
    }

    if let Some(fraction) = fraction {
        grouped.push('.');
        grouped.push_str(fraction);
    }

    grouped
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use new_zealand::nz;
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::pal::{FakePlatform, PlatformFacade};
    use crate::TimerUnit;

    assert_impl_all!(Benchmark: Send, Sync, fmt::Debug, fmt::Display);

    fn fake_calibration(platform: &FakePlatform) -> Arc<Calibration> {
        Arc::new(Calibration::fixed(
            PlatformFacade::fake(platform.clone()),
            TimerUnit::Nanoseconds,
            1e-9,
        ))
    }

    /// A benchmark whose every iteration advances the fake clock by `per_iteration`.
    fn fake_benchmark(platform: &FakePlatform, per_iteration: Duration) -> Benchmark {
        Benchmark::builder()
            .name("fake")
            .test({
                let platform = platform.clone();
                move || platform.advance(per_iteration)
            })
            .calibration(fake_calibration(platform))
            .build()
            .unwrap()
    }

    fn record_kinds(benchmark: &mut Benchmark) -> Arc<Mutex<Vec<EventKind>>> {
        let log = Arc::new(Mutex::new(Vec::new()));

        benchmark.on(EventKind::ALL, {
            let log = Arc::clone(&log);
            move |event, _| {
                log.lock().unwrap().push(event.kind());
                true
            }
        });

        log
    }

    #[test]
    fn display_formats_throughput() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_micros(1));
        benchmark.options = benchmark.options.clone().with_name("sort");
        benchmark.hz = 1234.5;
        benchmark.stats = Stats::from_sample([1.0; 7]).with_rme(2.34);

        assert_eq!(
            benchmark.to_string(),
            "sort x 1,234 ops/sec \u{b1}2.34% (7 runs sampled)"
        );
    }

    #[test]
    fn display_uses_decimals_for_slow_benchmarks() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_micros(1));
        benchmark.hz = 12.345_6;
        benchmark.stats = Stats::from_sample([0.08]).with_rme(0.5);

        assert_eq!(
            benchmark.to_string(),
            "fake x 12.35 ops/sec \u{b1}0.50% (1 run sampled)"
        );
    }

    #[test]
    fn display_reports_error() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_micros(1));
        benchmark.options = benchmark.options.clone().with_name("");
        benchmark.state.error = Some(Error::EmptyTest {
            name: "x".to_string(),
        });

        let expected_prefix = format!("<Test #{}>: ", benchmark.id());
        assert!(benchmark.to_string().starts_with(&expected_prefix));
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(with_thousands_separators("0"), "0");
        assert_eq!(with_thousands_separators("999"), "999");
        assert_eq!(with_thousands_separators("1000"), "1,000");
        assert_eq!(with_thousands_separators("123456"), "123,456");
        assert_eq!(with_thousands_separators("1234567.89"), "1,234,567.89");
        assert_eq!(with_thousands_separators("-12345"), "-12,345");
        assert_eq!(with_thousands_separators("inf"), "inf");
    }

    #[test]
    fn run_collects_consistent_samples() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_micros(10));
        benchmark.options = benchmark
            .options
            .clone()
            .with_min_time(Duration::from_millis(10))
            .with_max_time(Duration::from_millis(100))
            .with_min_samples(nz!(5));

        let observed = Arc::new(Mutex::new(Vec::new()));
        benchmark.on(EventKind::Cycle, {
            let observed = Arc::clone(&observed);
            move |_, bench| {
                observed.lock().unwrap().push((
                    bench.stats().sample().to_vec(),
                    *bench.times(),
                    bench.hz(),
                    bench.count(),
                ));
                true
            }
        });

        benchmark.run();

        let observed = observed.lock().unwrap();
        assert!(observed.len() >= 5);

        for (index, (sample, times, hz, _)) in observed.iter().enumerate() {
            assert_eq!(sample.len(), index + 1, "one sample per cycle");
            assert_eq!(sample.last(), Some(&times.period()));
            assert!((hz - 1.0 / times.period()).abs() < 1e-6);
        }

        // Once converged, the count no longer changes and every cycle takes about 10ms.
        for (_, times, _, count) in observed.iter().skip(1) {
            assert!((1000..=1001).contains(count));
            assert!((times.period() * *count as f64 - times.cycle()).abs() < 1e-12);
        }

        assert!(!benchmark.is_running());
        assert!(!benchmark.is_aborted());
        assert!(benchmark.error().is_none());
        assert_eq!(benchmark.stats().sample().len(), observed.len());
        assert!((benchmark.hz() - 100_000.0).abs() < 1.0);
        assert!(benchmark.times().elapsed() >= 0.1);
    }

    #[test]
    fn run_emits_lifecycle_in_order() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_millis(1));
        benchmark.options = benchmark
            .options
            .clone()
            .with_min_time(Duration::from_millis(1))
            .with_max_time(Duration::from_millis(3))
            .with_min_samples(nz!(3));
        let log = record_kinds(&mut benchmark);

        benchmark.run();

        let log = log.lock().unwrap();
        assert_eq!(log.first(), Some(&EventKind::Start));
        assert_eq!(log.last(), Some(&EventKind::Complete));
        assert_eq!(log.iter().filter(|k| **k == EventKind::Start).count(), 1);
        assert_eq!(log.iter().filter(|k| **k == EventKind::Complete).count(), 1);
        assert!(log.iter().filter(|k| **k == EventKind::Cycle).count() >= 3);
        assert!(!log.contains(&EventKind::Abort));
        assert!(!log.contains(&EventKind::Error));
    }

    #[test]
    fn cancelled_start_leaves_benchmark_idle() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_millis(1));
        benchmark.on(EventKind::Start, |_, _| false);
        let log = record_kinds(&mut benchmark);

        benchmark.run();

        assert!(!benchmark.is_running());
        assert_eq!(benchmark.cycles(), 0);
        assert_eq!(*log.lock().unwrap(), vec![EventKind::Start]);
    }

    #[test]
    fn zero_clock_fails_as_empty_test() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::ZERO);
        benchmark.options = benchmark
            .options
            .clone()
            .with_min_time(Duration::from_millis(50));
        let log = record_kinds(&mut benchmark);

        benchmark.run();

        assert!(!benchmark.is_running());
        assert!(benchmark.is_aborted());
        assert_eq!(
            benchmark.error(),
            Some(&Error::EmptyTest {
                name: "fake".to_string()
            })
        );
        assert!(benchmark.to_string().starts_with("fake: "));
        // Four cycles on the divisor table, then one that cannot be extrapolated.
        assert_eq!(benchmark.stats().sample().len(), 5);

        let log = log.lock().unwrap();
        assert_eq!(log.iter().filter(|k| **k == EventKind::Error).count(), 1);
        assert!(log.contains(&EventKind::Abort));
        assert_eq!(log.last(), Some(&EventKind::Complete));
    }

    #[test]
    fn tolerated_empty_test_still_stops() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::ZERO);
        benchmark.options = benchmark
            .options
            .clone()
            .with_min_time(Duration::from_millis(50));
        benchmark.on(EventKind::Error, |_, _| false);

        benchmark.run();

        assert!(!benchmark.is_running());
        assert!(!benchmark.is_aborted());
        assert_eq!(benchmark.cycles(), 5);
        assert!(matches!(benchmark.error(), Some(Error::EmptyTest { .. })));
    }

    #[test]
    fn unmeasurable_cycles_follow_divisor_table() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::ZERO);
        benchmark.options = benchmark
            .options
            .clone()
            .with_min_time(Duration::from_millis(50));

        let counts = Arc::new(Mutex::new(Vec::new()));
        benchmark.on(EventKind::Cycle, {
            let counts = Arc::clone(&counts);
            move |_, bench| {
                counts.lock().unwrap().push(bench.count());
                true
            }
        });

        benchmark.run();

        // The count after each cycle: 4e6 / 4096, / 512, / 64, / 8.
        let counts = counts.lock().unwrap();
        assert_eq!(counts.get(..4), Some(&[976, 7812, 62_500, 500_000][..]));
    }

    #[test]
    fn extrapolates_count_from_period() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_micros(1));
        benchmark.options = benchmark
            .options
            .clone()
            .with_init_count(nz!(10))
            .with_min_time(Duration::from_millis(1))
            .with_max_time(Duration::from_millis(1))
            .with_min_samples(nz!(1));

        let counts = Arc::new(Mutex::new(Vec::new()));
        benchmark.on(EventKind::Cycle, {
            let counts = Arc::clone(&counts);
            move |_, bench| {
                counts.lock().unwrap().push(bench.count());
                true
            }
        });

        benchmark.run();

        // 10 iterations take 10us; 990us more at 1us per iteration are needed.
        let counts = counts.lock().unwrap();
        let first = counts.first().copied().unwrap();
        assert!((1000..=1001).contains(&first), "count {first} not extrapolated");
        assert_eq!(benchmark.stats().sample().len(), 2);
    }

    #[test]
    fn aborting_cycle_event_stops_run() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_micros(1));
        let log = record_kinds(&mut benchmark);
        benchmark.on(EventKind::Cycle, |event, _| {
            event.abort();
            true
        });

        benchmark.run();

        assert!(benchmark.is_aborted());
        assert!(!benchmark.is_running());

        let log = log.lock().unwrap();
        assert!(log.contains(&EventKind::Abort));
        assert_eq!(log.last(), Some(&EventKind::Complete));
        // One measured cycle, then the final cycle re-emitted after the abort.
        assert_eq!(log.iter().filter(|k| **k == EventKind::Cycle).count(), 2);
    }

    #[test]
    fn vetoed_abort_request_lets_run_finish() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_millis(1));
        benchmark.options = benchmark
            .options
            .clone()
            .with_min_time(Duration::from_millis(1))
            .with_max_time(Duration::from_millis(5))
            .with_min_samples(nz!(3));
        let log = record_kinds(&mut benchmark);
        benchmark.on(EventKind::Abort, |_, _| false);

        let handle = benchmark.abort_handle();
        let requested = Arc::new(AtomicBool::new(false));
        benchmark.on(EventKind::Cycle, {
            let requested = Arc::clone(&requested);
            move |_, _| {
                if !requested.swap(true, Ordering::Relaxed) {
                    handle.abort();
                }
                true
            }
        });

        benchmark.run();

        assert!(!benchmark.is_running());
        assert!(!benchmark.is_aborted());
        assert!(benchmark.error().is_none());
        assert!(benchmark.stats().sample().len() >= 3);

        // The request is dropped once vetoed rather than repeated on every cycle.
        let log = log.lock().unwrap();
        assert_eq!(log.iter().filter(|k| **k == EventKind::Abort).count(), 1);
        assert!(!log.contains(&EventKind::Reset));
        assert_eq!(log.last(), Some(&EventKind::Complete));
    }

    #[test]
    #[should_panic(expected = "listener failure")]
    fn listener_panic_propagates_out_of_run() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_millis(1));
        benchmark.on(EventKind::Cycle, |_, _| panic!("listener failure"));

        benchmark.run();
    }

    #[test]
    fn abort_on_idle_benchmark_is_noop() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_micros(1));
        let log = record_kinds(&mut benchmark);

        benchmark.abort();
        benchmark.abort();

        assert!(!benchmark.is_aborted());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn reset_on_running_benchmark_aborts_once() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_micros(1));
        benchmark.state.running = true;
        benchmark.state.cycles = 3;
        let log = record_kinds(&mut benchmark);

        benchmark.reset();

        assert_eq!(
            *log.lock().unwrap(),
            vec![EventKind::Abort, EventKind::Reset]
        );
        assert!(!benchmark.is_running());
        // A reset that had to abort first ends up reset, not aborted.
        assert!(!benchmark.is_aborted());
        assert_eq!(benchmark.cycles(), 0);
    }

    #[test]
    fn abort_on_running_benchmark_resets_and_marks_aborted() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_micros(1));
        benchmark.state.running = true;
        benchmark.state.cycles = 3;
        let log = record_kinds(&mut benchmark);

        benchmark.abort();

        assert_eq!(
            *log.lock().unwrap(),
            vec![EventKind::Abort, EventKind::Reset]
        );
        assert!(benchmark.is_aborted());
        assert!(!benchmark.is_running());
        assert_eq!(benchmark.cycles(), 0);

        log.lock().unwrap().clear();
        benchmark.abort();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn cancelled_abort_keeps_running() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_micros(1));
        benchmark.state.running = true;
        benchmark.on(EventKind::Abort, |_, _| false);

        benchmark.abort();

        assert!(benchmark.is_running());
        assert!(!benchmark.is_aborted());
    }

    #[test]
    fn reset_preserves_statistics() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_micros(1));
        benchmark.state.cycles = 2;
        benchmark.hz = 10.0;
        benchmark.stats = Stats::from_sample([0.1, 0.1]);

        benchmark.reset();

        assert_eq!(benchmark.cycles(), 0);
        assert_eq!(benchmark.stats().sample().len(), 2);
        assert!((benchmark.hz() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reset_of_initial_state_emits_nothing() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_micros(1));
        let log = record_kinds(&mut benchmark);

        benchmark.reset();

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn cancelled_reset_keeps_state() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_micros(1));
        benchmark.state.cycles = 4;
        benchmark.on(EventKind::Reset, |_, _| false);

        benchmark.reset();

        assert_eq!(benchmark.cycles(), 4);
    }

    #[test]
    fn panicking_test_records_error_and_aborts() {
        let platform = FakePlatform::new();
        let mut benchmark = Benchmark::builder()
            .name("broken")
            .test(|| panic!("always fails"))
            .calibration(fake_calibration(&platform))
            .build()
            .unwrap();
        let log = record_kinds(&mut benchmark);

        benchmark.run();

        assert!(matches!(
            benchmark.error(),
            Some(Error::Execution { message, .. }) if message == "always fails"
        ));
        assert!(benchmark.is_aborted());
        assert!(benchmark.to_string().starts_with("broken: "));

        let log = log.lock().unwrap();
        assert!(log.contains(&EventKind::Error));
        assert!(log.contains(&EventKind::Abort));
        assert_eq!(log.last(), Some(&EventKind::Complete));
    }

    #[test]
    fn cancelled_error_runs_until_max_time() {
        let platform = FakePlatform::new();
        let mut benchmark = Benchmark::builder()
            .name("tolerated")
            .test({
                let platform = platform.clone();
                move || {
                    platform.advance(Duration::from_millis(1));
                    panic!("tolerated failure");
                }
            })
            .options(
                Options::default()
                    .with_name("tolerated")
                    .with_max_time(Duration::from_millis(20)),
            )
            .calibration(fake_calibration(&platform))
            .build()
            .unwrap();
        benchmark.on(EventKind::Error, |_, _| false);

        benchmark.run();

        assert!(!benchmark.is_running());
        assert!(!benchmark.is_aborted());
        assert!(benchmark.error().is_some());
    }

    #[test]
    fn deferred_cycle_measures_signal_time() {
        let platform = FakePlatform::new();
        let mut benchmark = Benchmark::builder()
            .name("deferred")
            .deferred_test({
                let platform = platform.clone();
                move |deferred| {
                    platform.advance(Duration::from_millis(10));
                    deferred.resolve();
                }
            })
            .options(
                Options::default()
                    .with_name("deferred")
                    .with_defer(true)
                    .with_min_time(Duration::from_millis(5))
                    .with_max_time(Duration::from_millis(50))
                    .with_min_samples(nz!(2)),
            )
            .calibration(fake_calibration(&platform))
            .build()
            .unwrap();

        let cycles = Arc::new(Mutex::new(Vec::new()));
        benchmark.on(EventKind::Cycle, {
            let cycles = Arc::clone(&cycles);
            move |_, bench| {
                cycles.lock().unwrap().push(bench.times().cycle());
                true
            }
        });

        benchmark.run();

        let cycles = cycles.lock().unwrap();
        assert!(cycles.len() >= 2);
        assert!(cycles.iter().all(|cycle| (cycle - 0.010).abs() < 1e-9));
        assert!(benchmark.error().is_none());
    }

    #[test]
    fn run_with_validates_before_running() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_micros(1));

        let result = benchmark.run_with(&OptionsOverride::new().with_defer(true));

        assert!(matches!(result, Err(Error::Configuration { .. })));
        assert_eq!(benchmark.cycles(), 0);
        assert!(!benchmark.options().defer());
    }

    #[test]
    fn run_with_persists_overrides() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_millis(1));

        benchmark
            .run_with(
                &OptionsOverride::new()
                    .with_min_time(Duration::from_millis(1))
                    .with_max_time(Duration::from_millis(2))
                    .with_min_samples(nz!(2)),
            )
            .unwrap();

        assert_eq!(benchmark.options().max_time(), Duration::from_millis(2));
        assert!(benchmark.stats().sample().len() >= 2);
    }

    #[test]
    fn second_run_starts_fresh_sample() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_millis(1));
        benchmark.options = benchmark
            .options
            .clone()
            .with_min_time(Duration::from_millis(1))
            .with_max_time(Duration::from_millis(5))
            .with_min_samples(nz!(2));

        benchmark.run();
        let first = benchmark.stats().sample().len();
        benchmark.run();

        assert_eq!(benchmark.stats().sample().len(), first);
    }

    #[test]
    fn clone_with_shares_body_but_not_identity() {
        let platform = FakePlatform::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut benchmark = Benchmark::builder()
            .name("original")
            .test({
                let calls = Arc::clone(&calls);
                let platform = platform.clone();
                move || {
                    calls.fetch_add(1, Ordering::Relaxed);
                    platform.advance(Duration::from_millis(1));
                }
            })
            .calibration(fake_calibration(&platform))
            .build()
            .unwrap();
        benchmark.on(EventKind::Cycle, |_, _| true);

        let mut clone = benchmark
            .clone_with(
                &OptionsOverride::new()
                    .with_name("clone")
                    .with_min_time(Duration::from_millis(1))
                    .with_max_time(Duration::from_millis(2))
                    .with_min_samples(nz!(1)),
            )
            .unwrap();

        assert_ne!(clone.id(), benchmark.id());
        assert_ne!(clone.instance_id(), benchmark.instance_id());
        assert_eq!(clone.name(), "clone");
        assert!(clone.listeners(EventKind::Cycle).is_empty());

        clone.run();

        assert!(calls.load(Ordering::Relaxed) > 0);
        assert_eq!(benchmark.cycles(), 0);
    }

    #[test]
    fn compare_with_self_is_indeterminate() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_micros(1));
        benchmark.stats = Stats::from_sample([1.0, 1.0, 1.0, 1.0, 1.0]);

        assert_eq!(benchmark.compare(&benchmark), Comparison::Indeterminate);
    }

    #[test]
    fn compare_ranks_lower_periods_faster() {
        let platform = FakePlatform::new();
        let mut fast = fake_benchmark(&platform, Duration::from_micros(1));
        let mut slow = fake_benchmark(&platform, Duration::from_micros(1));
        fast.stats = Stats::from_sample([1.0; 5]);
        slow.stats = Stats::from_sample([2.0; 5]);

        assert_eq!(fast.compare(&slow), Comparison::Faster);
        assert_eq!(slow.compare(&fast), Comparison::Slower);

        slow.state.error = Some(Error::EmptyTest {
            name: "slow".to_string(),
        });
        assert_eq!(fast.compare(&slow), Comparison::Indeterminate);
    }

    #[test]
    fn instance_relays_events_to_original() {
        let platform = FakePlatform::new();
        let mut benchmark = fake_benchmark(&platform, Duration::from_millis(1));
        benchmark.options = benchmark
            .options
            .clone()
            .with_min_time(Duration::from_millis(1))
            .with_max_time(Duration::from_millis(2))
            .with_min_samples(nz!(2));

        let targets = Arc::new(Mutex::new(Vec::new()));
        benchmark.on(EventKind::Cycle, {
            let targets = Arc::clone(&targets);
            move |event, bench| {
                targets
                    .lock()
                    .unwrap()
                    .push((event.target(), bench.instance_id()));
                true
            }
        });

        benchmark.run();

        let targets = targets.lock().unwrap();
        assert!(!targets.is_empty());
        assert!(
            targets
                .iter()
                .all(|(target, emitter)| *target == Some(*emitter)),
            "relayed events appear to come from the original"
        );
        assert!(benchmark.active_instance.is_none());
    }
}
