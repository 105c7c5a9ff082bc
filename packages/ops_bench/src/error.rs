use thiserror::Error;

/// Errors that can occur when defining or running a benchmark.
///
/// Configuration and timer errors are returned directly to the caller. Empty test and execution
/// errors happen during a run and are recorded on the benchmark instead, where they are visible
/// via [`Benchmark::error()`][crate::Benchmark::error] and the `error` event.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The benchmark definition or an options override was rejected.
    #[error("invalid benchmark configuration: {problem}")]
    Configuration {
        /// A human-readable description of the problem.
        problem: String,
    },

    /// The test body stayed below the timer resolution even at the largest iteration counts.
    #[error("the test \"{name}\" is empty; this may be the result of dead code removal")]
    EmptyTest {
        /// The display name of the benchmark.
        name: String,
    },

    /// The test body, setup or teardown logic panicked during a cycle.
    #[error("the test \"{name}\" failed: {message}")]
    Execution {
        /// The display name of the benchmark.
        name: String,

        /// The panic message, if one could be extracted.
        message: String,
    },

    /// No timer source with a measurable resolution is available.
    #[error("no usable timer: {problem}")]
    Timer {
        /// A human-readable description of the problem.
        problem: String,
    },
}

impl Error {
    pub(crate) fn configuration(problem: impl Into<String>) -> Self {
        Self::Configuration {
            problem: problem.into(),
        }
    }
}

/// A specialized `Result` type for benchmark operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
