use std::sync::Arc;
use std::time::{Duration, SystemTime};

use oneshot::RecvTimeoutError;

use crate::calibration::{Calibration, Stamp};
use crate::AbortHandle;

/// How often a deferred wait checks for an abort signal.
const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// The completion handle given to a deferred test body.
///
/// The test body performs its work, possibly on another thread, and then calls
/// [`resolve()`](Self::resolve). The benchmark does not advance until the handle resolves or
/// the run is aborted. Dropping the handle without resolving it fails the run.
///
/// # Examples
///
/// ```
/// use std::thread;
/// use std::time::{Duration, SystemTime};
///
/// use ops_bench::{Benchmark, Deferred};
///
/// let benchmark = Benchmark::builder()
///     .name("sleepy")
///     .deferred_test(|deferred: Deferred| {
///         thread::spawn(move || {
///             thread::sleep(Duration::from_millis(1));
///             deferred.resolve();
///         });
///     })
///     .build()
///     .unwrap();
/// # drop(benchmark);
/// ```
#[derive(derive_more::Debug)]
pub struct Deferred {
    cycles: u64,
    started: Stamp,
    timestamp: SystemTime,
    calibration: Arc<Calibration>,

    #[debug(ignore)]
    completion: oneshot::Sender<Stamp>,
}

impl Deferred {
    /// Signals that the deferred work is complete, stopping its clock.
    pub fn resolve(self) {
        let finished = self.calibration.now();

        // The receiver is only gone if the run was aborted, in which case nobody is interested.
        drop(self.completion.send(finished));
    }

    /// The number of dispatches already completed in the current cycle.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub(crate) fn started(&self) -> Stamp {
        self.started
    }

    /// The wall clock time at which this handle was dispatched.
    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// The time since this handle was dispatched.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(
            self.calibration
                .seconds_between(self.started, self.calibration.now()),
        )
    }
}

/// How a wait for a deferred signal ended.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum Completion {
    Resolved(Stamp),
    Aborted,
    Abandoned,
}

/// Creates a handle for one deferred dispatch and the receiver its completion arrives on.
pub(crate) fn dispatch_handle(
    cycles: u64,
    calibration: &Arc<Calibration>,
) -> (Deferred, oneshot::Receiver<Stamp>) {
    let (completion, receiver) = oneshot::channel();

    let deferred = Deferred {
        cycles,
        started: calibration.now(),
        timestamp: SystemTime::now(),
        calibration: Arc::clone(calibration),
        completion,
    };

    (deferred, receiver)
}

/// Blocks until the deferred handle resolves, is dropped or the run is aborted.
pub(crate) fn wait(receiver: &oneshot::Receiver<Stamp>, abort: &AbortHandle) -> Completion {
    loop {
        match receiver.recv_timeout(ABORT_POLL_INTERVAL) {
            Ok(finished) => return Completion::Resolved(finished),
            Err(RecvTimeoutError::Disconnected) => return Completion::Abandoned,
            Err(RecvTimeoutError::Timeout) => {
                if abort.is_signaled() {
                    return Completion::Aborted;
                }
            }
        }
    }
}
