use std::any::Any;
use std::hint::black_box;
use std::num::NonZero;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use new_zealand::nz;
use tracing::debug;

use crate::calibration::Calibration;
use crate::deferred::{self, Completion};
use crate::definition::{Definition, Test};
use crate::{AbortHandle, Error, Result};

/// The shape of the timed loop around a synchronous test body.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Template {
    /// The body is called directly in a tight loop.
    Inline,

    /// Every call goes through an opaque function reference, so the optimizer can neither
    /// hoist nor drop the body.
    Indirect,
}

/// The result of measuring one cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Outcome {
    /// The cycle completed in the given number of seconds.
    Clocked(f64),

    /// The run was aborted while the cycle was waiting for a deferred signal.
    Aborted,
}

/// The measurement routine selected for a definition at the start of a run.
#[derive(Debug)]
pub(crate) struct Routine {
    definition: Arc<Definition>,
    template: Template,
}

impl Routine {
    /// Selects the measurement template for `definition`.
    ///
    /// Synchronous bodies are pretested with a single iteration. If the inline template
    /// panics, the indirect template is pretested instead. Deferred bodies are dispatched
    /// without a pretest.
    pub(crate) fn compile(
        definition: &Arc<Definition>,
        calibration: &Calibration,
        name: &str,
    ) -> Result<Self> {
        let inline = Self {
            definition: Arc::clone(definition),
            template: Template::Inline,
        };

        let Test::Sync(_) = &definition.test else {
            return Ok(inline);
        };

        let Err(reason) = inline.time_sync(nz!(1), calibration) else {
            return Ok(inline);
        };

        debug!(
            name,
            reason = reason.as_str(),
            "inline pretest failed, using indirect template"
        );

        let indirect = Self {
            template: Template::Indirect,
            ..inline
        };

        indirect
            .time_sync(nz!(1), calibration)
            .map(|_| indirect)
            .map_err(|message| Error::Execution {
                name: name.to_string(),
                message,
            })
    }

    #[cfg(test)]
    pub(crate) fn template(&self) -> Template {
        self.template
    }

    /// Executes one cycle of `count` iterations and clocks it.
    pub(crate) fn measure(
        &self,
        count: NonZero<u64>,
        calibration: &Arc<Calibration>,
        abort: &AbortHandle,
        name: &str,
    ) -> Result<Outcome> {
        let execution_error = |message| Error::Execution {
            name: name.to_string(),
            message,
        };

        if let Test::Deferred(_) = &self.definition.test {
            return self.time_deferred(count, calibration, abort, name);
        }

        let clocked = self.time_sync(count, calibration).map_err(execution_error)?;

        Ok(Outcome::Clocked(clocked))
    }

    /// Runs setup, the timed loop and teardown, returning the clocked seconds or the panic
    /// message.
    fn time_sync(
        &self,
        count: NonZero<u64>,
        calibration: &Calibration,
    ) -> std::result::Result<f64, String> {
        let Test::Sync(body) = &self.definition.test else {
            return Err("a deferred test cannot be timed synchronously".to_string());
        };

        let template = self.template;
        let definition = &self.definition;

        panic::catch_unwind(AssertUnwindSafe(|| {
            definition.run_setup();

            let start = calibration.now();

            match template {
                Template::Inline => {
                    let body = &**body;

                    for _ in 0..count.get() {
                        body();
                    }
                }
                Template::Indirect => {
                    for _ in 0..count.get() {
                        black_box(body)();
                    }
                }
            }

            let end = calibration.now();

            definition.run_teardown();

            calibration.seconds_between(start, end)
        }))
        .map_err(panic_message)
    }

    /// Dispatches the deferred body `count` times in sequence, clocking from the first
    /// dispatch to the last signal.
    fn time_deferred(
        &self,
        count: NonZero<u64>,
        calibration: &Arc<Calibration>,
        abort: &AbortHandle,
        name: &str,
    ) -> Result<Outcome> {
        let Test::Deferred(body) = &self.definition.test else {
            return Err(Error::configuration("a synchronous test cannot be deferred"));
        };

        let execution_error = |message| Error::Execution {
            name: name.to_string(),
            message,
        };

        panic::catch_unwind(AssertUnwindSafe(|| self.definition.run_setup()))
            .map_err(|payload| execution_error(panic_message(payload)))?;

        let mut first_dispatch = None;
        let mut last_signal = None;

        for dispatched in 0..count.get() {
            let (handle, receiver) = deferred::dispatch_handle(dispatched, calibration);
            first_dispatch.get_or_insert(handle.started());

            panic::catch_unwind(AssertUnwindSafe(|| body(handle)))
                .map_err(|payload| execution_error(panic_message(payload)))?;

            match deferred::wait(&receiver, abort) {
                Completion::Resolved(finished) => last_signal = Some(finished),
                Completion::Aborted => return Ok(Outcome::Aborted),
                Completion::Abandoned => {
                    return Err(execution_error(
                        "the deferred handle was dropped without being resolved".to_string(),
                    ));
                }
            }
        }

        panic::catch_unwind(AssertUnwindSafe(|| self.definition.run_teardown()))
            .map_err(|payload| execution_error(panic_message(payload)))?;

        let clocked = match (first_dispatch, last_signal) {
            (Some(start), Some(end)) => calibration.seconds_between(start, end),
            _ => 0.0,
        };

        Ok(Outcome::Clocked(clocked))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "the test panicked with a non-string payload".to_string()
    }
}
