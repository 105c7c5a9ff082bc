use std::sync::Arc;
use std::time::Duration;

use rsevents::{Awaitable, EventState, ManualResetEvent};

/// Requests a running benchmark to stop, from any thread.
///
/// Cancellation is cooperative. A signaled benchmark stops at the next cycle boundary and ends
/// any inter-cycle delay or deferred wait immediately, but a measurement routine that is
/// already executing always runs to completion.
///
/// # Examples
///
/// ```
/// use ops_bench::Benchmark;
///
/// let mut benchmark = Benchmark::builder()
///     .name("gives_up")
///     .test(|| {})
///     .build()
///     .unwrap();
///
/// // Any clone of the handle can stop the run, including one captured by the test itself.
/// let handle = benchmark.abort_handle();
/// benchmark.on(ops_bench::EventKind::Cycle, move |_, _| {
///     handle.abort();
///     true
/// });
///
/// benchmark.run();
/// assert!(benchmark.is_aborted());
/// ```
#[derive(Clone, derive_more::Debug)]
pub struct AbortHandle {
    #[debug(ignore)]
    signal: Arc<ManualResetEvent>,
}

impl AbortHandle {
    pub(crate) fn new() -> Self {
        Self {
            signal: Arc::new(ManualResetEvent::new(EventState::Unset)),
        }
    }

    /// Signals the benchmark to stop at the next opportunity.
    ///
    /// Signaling a benchmark that is not running has no effect on it; the signal is cleared
    /// when the next run starts.
    pub fn abort(&self) {
        self.signal.set();
    }

    pub(crate) fn is_signaled(&self) -> bool {
        self.signal.wait0()
    }

    /// Waits for `timeout` or until signaled, whichever comes first. Returns whether the
    /// handle was signaled.
    pub(crate) fn wait_for(&self, timeout: Duration) -> bool {
        self.signal.wait_for(timeout)
    }

    pub(crate) fn clear(&self) {
        self.signal.reset();
    }
}
