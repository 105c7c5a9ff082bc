//! Drives the cycles of a run on a disposable execution instance and keeps the original
//! benchmark in sync with it.

use std::num::NonZero;

use tracing::{debug, trace, warn};

use crate::routine::{Outcome, Routine};
use crate::{Benchmark, Error, Event, EventKind, Result};

/// Iteration count divisors for cycles that finished below the timer resolution, indexed by
/// the 1-based cycle number. Zero means the count is extrapolated instead.
const DIVISORS: [(u64, f64); 5] = [(1, 4096.0), (2, 512.0), (3, 64.0), (4, 8.0), (5, 0.0)];

/// The iteration budget that the divisors scale down from.
const DIVISOR_BUDGET: f64 = 4_000_000.0;

/// What an execution instance must do after its original has processed a relayed event.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum Followup {
    None,

    /// Use this iteration count for the next cycle.
    SetCount(NonZero<u64>),

    /// The original was aborted behind the back of the instance. Stop relaying aborts and
    /// abort the instance too.
    Detach,
}

/// Hands the events of an execution instance over to the benchmark it was spawned from.
pub(crate) trait Relay {
    fn relay(&mut self, event: &mut Event, instance: &Benchmark) -> Followup;
}

/// The relay of a benchmark that is not an execution instance.
#[derive(Debug)]
pub(crate) struct NoRelay;

impl Relay for NoRelay {
    fn relay(&mut self, _event: &mut Event, _instance: &Benchmark) -> Followup {
        Followup::None
    }
}

/// Mirrors the events of an execution instance onto its original.
///
/// Cycle and error events are re-emitted on the original as the same event, so cancellations
/// and aborts applied by the listeners of the original take effect on the instance.
#[derive(Debug)]
struct Mirror<'a> {
    original: &'a mut Benchmark,
}

impl Relay for Mirror<'_> {
    fn relay(&mut self, event: &mut Event, instance: &Benchmark) -> Followup {
        let original = &mut *self.original;

        // A late event of an instance that was aborted or no longer runs for the original.
        if (instance.state.aborted && !instance.state.running)
            || original.active_instance != Some(instance.instance_id)
        {
            return Followup::Detach;
        }

        if !original.state.running {
            return Followup::None;
        }

        match event.kind() {
            EventKind::Start => Followup::SetCount(original.options.init_count()),
            EventKind::Abort => {
                original.abort();

                if original.state.running {
                    // The listeners of the original vetoed the abort.
                    event.cancel();
                } else {
                    // Listeners get to see the last measured state once more.
                    original.emit(EventKind::Cycle);
                }

                Followup::None
            }
            kind => {
                if kind == EventKind::Error {
                    original.state.error.clone_from(&instance.state.error);
                }

                event.retarget(original.instance_id);
                original.emit_via(event, &mut NoRelay);
                Followup::None
            }
        }
    }
}

/// A run in progress: the original benchmark and the execution instance measuring for it.
#[derive(Debug)]
struct Execution<'a> {
    original: &'a mut Benchmark,
    instance: Benchmark,

    // The first failure of the run; aborting resets the error of the original.
    failure: Option<Error>,
}

/// Performs a run of `original`, which has already announced its start, to completion.
pub(crate) fn drive(original: &mut Benchmark) {
    let instance = original.spawn_instance();
    original.active_instance = Some(instance.instance_id);

    let mut execution = Execution {
        original,
        instance,
        failure: None,
    };

    execution.start();

    while execution.instance.state.running {
        execution.cycle();
    }

    execution.finish();
}

impl Execution<'_> {
    fn start(&mut self) {
        let instance = &mut self.instance;
        let mut mirror = Mirror {
            original: &mut *self.original,
        };

        instance.state.running = true;
        instance.state.count = instance.options.init_count();
        instance.times.start(instance.calibration.now());

        let mut event = Event::new(EventKind::Start);
        instance.emit_via(&mut event, &mut mirror);

        if event.is_cancelled() {
            instance.state.running = false;
        }
    }

    fn cycle(&mut self) {
        let instance = &mut self.instance;
        let mut mirror = Mirror {
            original: &mut *self.original,
        };

        if instance.abort_signal.is_signaled() {
            debug!(instance = %instance.instance_id, "abort requested");
            instance.abort_via(&mut mirror);

            if instance.state.running {
                instance.abort_signal.clear();
            }

            return;
        }

        instance.state.cycles = instance.state.cycles.saturating_add(1);

        let clocked = match measure(instance) {
            Ok(Outcome::Clocked(clocked)) => Some(clocked),
            Ok(Outcome::Aborted) => {
                instance.abort_via(&mut mirror);
                None
            }
            Err(error) => {
                fail(instance, &mut mirror, &mut self.failure, error);
                None
            }
        };

        if instance.state.running {
            let unmeasurable = match clocked {
                Some(clocked) => record(instance, clocked).err(),
                None => {
                    expire(instance);
                    None
                }
            };

            mirror.original.publish(instance);

            if let Some(error) = unmeasurable {
                // Tolerated or not, a test that cannot be measured cannot go on.
                if fail(instance, &mut mirror, &mut self.failure, error) {
                    instance.state.running = false;
                }
            }
        }

        let mut event = Event::new(EventKind::Cycle);
        instance.emit_via(&mut event, &mut mirror);

        if event.is_aborted() {
            instance.abort_via(&mut mirror);
        }

        if instance.state.running && instance.options.async_mode() && !instance.options.defer()
        {
            // An abort arriving during the delay is handled at the start of the next cycle.
            instance.abort_signal.wait_for(instance.options.delay());
        }
    }

    fn finish(&mut self) {
        let original = &mut *self.original;
        let instance = &mut self.instance;

        if !instance.state.aborted {
            original.publish(instance);
        }

        if original.state.error.is_none() {
            original.state.error = self.failure.take();
        }

        instance.state.running = false;
        original.state.running = false;
        original.active_instance = None;

        instance.emit(EventKind::Complete);
        original.emit(EventKind::Complete);

        debug!(
            benchmark = %original.display_name(),
            instance = %instance.instance_id,
            cycles = original.state.cycles,
            hz = original.hz,
            aborted = original.state.aborted,
            failed = original.state.error.is_some(),
            "run complete"
        );
    }
}

/// Records `error` as the failure of the cycle and emits it, aborting the run unless a
/// listener cancels the event. Returns whether the event was cancelled.
fn fail(
    instance: &mut Benchmark,
    mirror: &mut Mirror<'_>,
    failure: &mut Option<Error>,
    error: Error,
) -> bool {
    warn!(instance = %instance.instance_id, %error, "cycle failed");

    failure.get_or_insert_with(|| error.clone());
    instance.state.error = Some(error);

    let mut event = Event::new(EventKind::Error);
    instance.emit_via(&mut event, mirror);

    let cancelled = event.is_cancelled();

    if !cancelled {
        instance.abort_via(mirror);
    }

    cancelled
}

/// Executes one cycle of the instance, compiling its measurement routine on first use.
fn measure(instance: &mut Benchmark) -> Result<Outcome> {
    let name = instance.display_name();

    let routine = match instance.state.routine.take() {
        Some(routine) => routine,
        None => Routine::compile(&instance.definition, &instance.calibration, &name)?,
    };

    let outcome = routine.measure(
        instance.state.count,
        &instance.calibration,
        &instance.abort_signal,
        &name,
    );

    instance.state.routine = Some(routine);
    outcome
}

/// Records a measured cycle and decides the iteration count of the next one, or that there
/// is no next one.
///
/// Fails with [`Error::EmptyTest`] if the cycle is still below the timer resolution once the
/// divisor table is used up, as the body then does no measurable work at any count.
#[expect(
    clippy::cast_precision_loss,
    reason = "iteration counts and sample sizes are far below 2^52"
)]
fn record(instance: &mut Benchmark, clocked: f64) -> Result<()> {
    let count = instance.state.count.get() as f64;
    let period = clocked / count;

    instance.hz = 1.0 / period;
    instance.stats.push(period);

    let elapsed = elapsed(instance);
    instance.times.record_cycle(clocked, period, elapsed);

    let exhausted = elapsed >= instance.options.max_time().as_secs_f64()
        && instance.stats.sample().len() >= instance.options.min_samples().get();

    let min_time = effective_min_time(instance);

    if clocked >= min_time {
        instance.state.running = !exhausted;
    } else {
        let next = next_count(instance, clocked, period, min_time);

        if next.is_none() && clocked < instance.calibration.resolution_secs() {
            return Err(Error::EmptyTest {
                name: instance.display_name(),
            });
        }

        if next.is_none() {
            warn!(
                instance = %instance.instance_id,
                cycles = instance.state.cycles,
                clocked,
                "iteration count cannot converge, stopping"
            );
        }

        if let Some(next) = next {
            instance.state.count = next;
        }

        instance.state.running = next.is_some() && !exhausted;
    }

    trace!(
        instance = %instance.instance_id,
        cycles = instance.state.cycles,
        count = instance.state.count.get(),
        clocked,
        hz = instance.hz,
        running = instance.state.running,
        "cycle measured"
    );

    Ok(())
}

/// Stops a run whose cycle produced no measurement once the time budget is spent, so a
/// failure that listeners keep tolerating cannot extend the run forever.
fn expire(instance: &mut Benchmark) {
    let elapsed = elapsed(instance);

    if elapsed >= instance.options.max_time().as_secs_f64() {
        instance.state.running = false;
    }
}

fn elapsed(instance: &Benchmark) -> f64 {
    instance.times.started.map_or(0.0, |started| {
        instance
            .calibration
            .seconds_between(started, instance.calibration.now())
    })
}

fn effective_min_time(instance: &Benchmark) -> f64 {
    let configured = instance.options.min_time();

    if configured.is_zero() {
        instance.calibration.default_min_time_secs()
    } else {
        configured.as_secs_f64()
    }
}

/// Picks the iteration count for the next cycle of a cycle that fell short of `min_time`.
///
/// Cycles too short to resolve jump ahead by the divisor table while it lasts; all others
/// extrapolate linearly from the measured period. Returns `None` if the count would not be
/// finite.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    reason = "the value is checked to be finite, positive and in range before the conversion"
)]
fn next_count(
    instance: &Benchmark,
    clocked: f64,
    period: f64,
    min_time: f64,
) -> Option<NonZero<u64>> {
    let divisor = DIVISORS
        .iter()
        .find(|(cycle, _)| *cycle == instance.state.cycles)
        .map(|(_, divisor)| *divisor)
        .filter(|divisor| *divisor != 0.0);

    let next = match divisor {
        Some(divisor) if clocked < instance.calibration.resolution_secs() => {
            (DIVISOR_BUDGET / divisor).floor()
        }
        _ => instance.state.count.get() as f64 + ((min_time - clocked) / period).ceil(),
    };

    if !next.is_finite() || next < 1.0 || next >= u64::MAX as f64 {
        return None;
    }

    NonZero::new(next as u64)
}
