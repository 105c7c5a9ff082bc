#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples in the ops_bench workspace.

use std::hint::spin_loop;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Runs a test with a timeout to prevent infinite hangs.
///
/// Benchmark runs adapt their iteration counts to the clock, so a bug in the adaptation can
/// turn a run into an endless loop. This wraps the test closure with a watchdog that fails
/// the test instead of letting CI hang.
///
/// The timeout is 30 seconds under normal conditions and 120 seconds under Miri, where
/// thread synchronization primitives are significantly slower.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled
/// and the test function is executed directly. This allows mutation testing to properly
/// detect hanging mutations.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode).
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// with_watchdog(|| {
///     assert_eq!(2 + 2, 4);
/// });
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let timeout = if cfg!(miri) {
        Duration::from_secs(120)
    } else {
        Duration::from_secs(30)
    };

    with_watchdog_timeout(timeout, test_fn)
}

/// Runs a test with a custom timeout to prevent infinite hangs.
///
/// See [`with_watchdog()`] for details.
///
/// # Panics
///
/// Panics if the test exceeds `timeout` (when not in mutation testing mode).
pub fn with_watchdog_timeout<F, R>(timeout: Duration, test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the receiver has timed out.
        drop(tx.send(result));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("Test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("Test exceeded the {timeout:?} timeout");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("Test thread disconnected unexpectedly"),
            Err(e) => std::panic::resume_unwind(e),
        },
    }
}

/// Occupies the current thread for at least `duration` without sleeping.
///
/// Sleeping rounds up to the scheduler tick, which makes test bodies of a known cost
/// impossible below a millisecond or so. Spinning does not.
#[cfg_attr(test, mutants::skip)] // Mutations turn this into an endless spin.
pub fn spin_for(duration: Duration) {
    let start = Instant::now();

    while start.elapsed() < duration {
        spin_loop();
    }
}

/// Whether `actual` is within `relative_tolerance` (a fraction, e.g. 0.25 for 25%) of
/// `expected`.
///
/// Timing assertions against the real clock need generous tolerances because the scheduler
/// can stretch any interval.
#[must_use]
pub fn is_close_relative(actual: f64, expected: f64, relative_tolerance: f64) -> bool {
    (actual - expected).abs() <= expected.abs() * relative_tolerance
}
