use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one emitter of events: a benchmark definition, one of its execution
/// instances or a suite.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InstanceId(u64);

impl InstanceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The lifecycle notifications a benchmark or suite emits.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum EventKind {
    /// A run is starting. Cancelling this event prevents the run.
    Start,

    /// A cycle has been measured. Marking this event aborted stops the run.
    Cycle,

    /// A run is being aborted. Cancelling this event keeps the run alive.
    Abort,

    /// A cycle failed. Cancelling this event suppresses the abort that would follow.
    Error,

    /// The benchmark state is about to be reset. Cancelling this event keeps the state.
    Reset,

    /// A run has finished, successfully or not.
    Complete,
}

impl EventKind {
    /// Every event kind, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Start,
        Self::Cycle,
        Self::Abort,
        Self::Error,
        Self::Reset,
        Self::Complete,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Start => 0,
            Self::Cycle => 1,
            Self::Abort => 2,
            Self::Error => 3,
            Self::Reset => 4,
            Self::Complete => 5,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Cycle => "cycle",
            Self::Abort => "abort",
            Self::Error => "error",
            Self::Reset => "reset",
            Self::Complete => "complete",
        };

        f.write_str(name)
    }
}

/// A single lifecycle notification, created fresh for every emission.
///
/// Listeners communicate back to the emitter through two independent flags:
///
/// * [`cancel()`](Self::cancel) vetoes the default action that follows the event.
/// * [`abort()`](Self::abort) stops the delivery of this event to any further listeners and,
///   for `cycle` events, stops the run.
///
/// A listener returning `false` is equivalent to calling `cancel()`.
#[derive(Clone, Debug)]
pub struct Event {
    kind: EventKind,
    target: Option<InstanceId>,
    current_target: Option<InstanceId>,
    cancelled: bool,
    aborted: bool,
    result: Option<bool>,
    timestamp: SystemTime,
}

impl Event {
    /// Creates a new event of the given kind, not yet associated with any emitter.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            target: None,
            current_target: None,
            cancelled: false,
            aborted: false,
            result: None,
            timestamp: SystemTime::now(),
        }
    }

    /// The kind of the event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The instance that originally emitted the event.
    #[must_use]
    pub fn target(&self) -> Option<InstanceId> {
        self.target
    }

    /// The instance whose listeners are currently being invoked.
    ///
    /// This differs from [`target()`](Self::target) when a suite re-emits the events of its
    /// benchmarks.
    #[must_use]
    pub fn current_target(&self) -> Option<InstanceId> {
        self.current_target
    }

    /// Whether a listener has vetoed the default action that follows the event.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Whether a listener has stopped further listener iteration.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// The return value of the last listener invoked, if any listener was invoked.
    #[must_use]
    pub fn result(&self) -> Option<bool> {
        self.result
    }

    /// When the event was created.
    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Vetoes the default action that follows the event.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Stops delivery of the event to further listeners.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub(crate) fn set_target(&mut self, target: InstanceId) {
        // The first emitter stays the target when an event is forwarded.
        if self.target.is_none() {
            self.target = Some(target);
        }

        self.current_target = Some(target);
    }

    /// Makes the event appear to originate from `target`, for events an execution instance
    /// hands over to the benchmark it was spawned from.
    pub(crate) fn retarget(&mut self, target: InstanceId) {
        self.target = Some(target);
        self.current_target = Some(target);
    }

    pub(crate) fn record_result(&mut self, result: bool) {
        self.result = Some(result);

        if !result {
            self.cancelled = true;
        }
    }

    pub(crate) fn clear_result(&mut self) {
        self.result = None;
    }
}

impl From<EventKind> for Event {
    fn from(kind: EventKind) -> Self {
        Self::new(kind)
    }
}
