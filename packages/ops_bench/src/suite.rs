use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::event_channel::EventChannel;
use crate::{
    Benchmark, Event, EventKind, Filter, InstanceId, IntoEventKinds, ListenerId, OptionsOverride,
    Result, collection,
};

/// The benchmark events a suite re-emits to its own listeners.
const FORWARDED: [EventKind; 5] = [
    EventKind::Start,
    EventKind::Cycle,
    EventKind::Error,
    EventKind::Abort,
    EventKind::Complete,
];

/// An ordered group of benchmarks that run one after another.
///
/// While a suite runs, the events of each benchmark are re-emitted to the listeners of the
/// suite, with the suite as the current target. A suite listener that marks a `cycle` event
/// aborted stops the benchmark and every benchmark after it.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use ops_bench::{Benchmark, EventKind, Filter, Options, Suite};
///
/// let options = Options::default().with_max_time(Duration::from_millis(50));
///
/// let mut suite = Suite::new("collections");
/// suite.add(
///     Benchmark::builder()
///         .options(options.clone().with_name("vec"))
///         .test(|| {
///             std::hint::black_box(vec![1, 2, 3]);
///         })
///         .build()
///         .unwrap(),
/// );
/// suite.add(
///     Benchmark::builder()
///         .options(options.with_name("array"))
///         .test(|| {
///             std::hint::black_box([1, 2, 3]);
///         })
///         .build()
///         .unwrap(),
/// );
///
/// suite.on(EventKind::Complete, |_, benchmark| {
///     println!("{benchmark}");
///     true
/// });
///
/// suite.run();
///
/// assert!(!suite.filter(Filter::Fastest).is_empty());
/// ```
#[derive(Debug)]
pub struct Suite {
    name: String,
    instance_id: InstanceId,
    benchmarks: Vec<Benchmark>,
    events: EventChannel<Benchmark>,
    running: bool,
    aborted: bool,
}

impl Suite {
    /// Creates an empty suite.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_id: InstanceId::next(),
            benchmarks: Vec::new(),
            events: EventChannel::new(),
            running: false,
            aborted: false,
        }
    }

    /// Appends a benchmark to the suite.
    pub fn add(&mut self, benchmark: Benchmark) -> &mut Self {
        self.benchmarks.push(benchmark);
        self
    }

    /// Runs every benchmark in order, stopping early if a suite listener aborts a `cycle`
    /// event.
    pub fn run(&mut self) -> &mut Self {
        self.running = true;
        self.aborted = false;

        debug!(suite = %self.name, benchmarks = self.benchmarks.len(), "suite started");

        let stop = Arc::new(AtomicBool::new(false));

        for benchmark in &mut self.benchmarks {
            let forwarder = benchmark.on(FORWARDED, {
                let events = self.events.clone();
                let suite_id = self.instance_id;
                let stop = Arc::clone(&stop);

                move |event: &mut Event, benchmark: &Benchmark| {
                    events.dispatch(event, benchmark, suite_id);

                    if event.kind() == EventKind::Cycle && event.is_aborted() {
                        stop.store(true, Ordering::Relaxed);
                    }

                    !event.is_cancelled()
                }
            });

            benchmark.run();
            benchmark.off(FORWARDED, Some(forwarder));

            if stop.load(Ordering::Relaxed) {
                debug!(
                    suite = %self.name,
                    benchmark = %benchmark.display_name(),
                    "suite aborted"
                );
                self.aborted = true;
                break;
            }
        }

        self.running = false;
        self
    }

    /// Aborts every benchmark of the suite and marks the suite aborted if it was running.
    pub fn abort(&mut self) -> &mut Self {
        for benchmark in &mut self.benchmarks {
            benchmark.abort();
        }

        if self.running {
            self.running = false;
            self.aborted = true;
        }

        self
    }

    /// Resets every benchmark of the suite and clears the aborted flag.
    pub fn reset(&mut self) -> &mut Self {
        for benchmark in &mut self.benchmarks {
            benchmark.reset();
        }

        self.aborted = false;
        self
    }

    /// Selects the benchmarks of the suite matching `filter`.
    #[must_use]
    pub fn filter(&self, filter: Filter) -> Vec<&Benchmark> {
        collection::filter(&self.benchmarks, filter)
    }

    /// Creates a suite with the same name and listeners whose benchmarks are clones of the
    /// benchmarks of this suite, with `overrides` applied to each.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`][crate::Error::Configuration] if the overrides are
    /// rejected by any of the benchmarks.
    pub fn clone_with(&self, overrides: &OptionsOverride) -> Result<Self> {
        let benchmarks = self
            .benchmarks
            .iter()
            .map(|benchmark| benchmark.clone_with(overrides))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: self.name.clone(),
            instance_id: InstanceId::next(),
            benchmarks,
            events: self.events.clone(),
            running: false,
            aborted: false,
        })
    }

    /// Registers `listener` for one or more kinds of re-emitted benchmark events.
    ///
    /// A listener returning `false` cancels the event, with the same effect as a listener
    /// registered on the benchmark.
    pub fn on<F>(&mut self, kinds: impl IntoEventKinds, listener: F) -> ListenerId
    where
        F: Fn(&mut Event, &Benchmark) -> bool + Send + Sync + 'static,
    {
        self.events.on(kinds, listener)
    }

    /// Removes `listener`, or every listener if `None`, from one or more event kinds.
    pub fn off(&mut self, kinds: impl IntoEventKinds, listener: Option<ListenerId>) -> &mut Self {
        self.events.off(kinds, listener);
        self
    }

    /// The listeners registered for `kind`, in invocation order.
    #[must_use]
    pub fn listeners(&self, kind: EventKind) -> Vec<ListenerId> {
        self.events.listeners(kind)
    }

    /// The name of the suite.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The identity the suite carries as the current target of re-emitted events.
    #[must_use]
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// The benchmarks of the suite, in run order.
    #[must_use]
    pub fn benchmarks(&self) -> &[Benchmark] {
        &self.benchmarks
    }

    /// Mutable access to the benchmarks of the suite, in run order.
    pub fn benchmarks_mut(&mut self) -> &mut [Benchmark] {
        &mut self.benchmarks
    }

    /// The number of benchmarks in the suite.
    #[must_use]
    pub fn len(&self) -> usize {
        self.benchmarks.len()
    }

    /// Whether the suite has no benchmarks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.benchmarks.is_empty()
    }

    /// Whether the suite is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the last run of the suite was stopped early.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}
