#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adaptive micro-benchmarking engine that measures how many operations per second a piece of
//! code performs, together with a statistically defensible margin of error.
//!
//! A [`Benchmark`] wraps a test body. Running it executes the body in cycles of a growing
//! number of iterations until each cycle takes long enough for the timer to measure it
//! accurately, then keeps sampling until the configured time budget is spent. Every cycle
//! contributes one period (seconds per iteration) to the [`Stats`] of the benchmark.
//!
//! Two benchmarks can be compared with a Mann-Whitney U test via [`Benchmark::compare()`],
//! which only declares a winner if the difference in their samples is significant.
//!
//! # Operating principles
//!
//! ## Calibration
//!
//! Before the first run, the engine selects the most precise timer source the platform offers
//! and measures its resolution. The [`Calibration`] decides the default minimum cycle time and
//! can be shared between benchmarks.
//!
//! ## Events
//!
//! Benchmarks emit `start`, `cycle`, `abort`, `error`, `reset` and `complete` events. Listeners
//! registered via [`Benchmark::on()`] can cancel the action that follows an event by returning
//! `false` and can stop a run by calling [`Event::abort()`] on a `cycle` event.
//!
//! ## Deferred test bodies
//!
//! A test body registered via [`BenchmarkBuilder::deferred_test()`] receives a [`Deferred`]
//! handle and signals completion by resolving it, possibly from another thread. The time until
//! the signal is what gets measured.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use ops_bench::{Benchmark, EventKind, Options};
//!
//! let options = Options::default().with_max_time(Duration::from_millis(100));
//!
//! let mut fast = Benchmark::builder()
//!     .options(options.clone().with_name("sum_100"))
//!     .test(|| {
//!         std::hint::black_box((0..100_u64).sum::<u64>());
//!     })
//!     .build()
//!     .unwrap();
//!
//! let mut slow = Benchmark::builder()
//!     .options(options.with_name("sum_10000"))
//!     .test(|| {
//!         std::hint::black_box((0..10_000_u64).map(std::hint::black_box).sum::<u64>());
//!     })
//!     .build()
//!     .unwrap();
//!
//! fast.on(EventKind::Cycle, |_, benchmark| {
//!     println!("{} cycles so far", benchmark.cycles());
//!     true
//! });
//!
//! fast.run();
//! slow.run();
//!
//! println!("{fast}");
//! println!("{slow}");
//! println!("{} vs {}: {}", fast.name(), slow.name(), fast.compare(&slow));
//! ```

mod abort_handle;
mod benchmark;
mod calibration;
mod collection;
mod compare;
mod deferred;
mod definition;
mod error;
mod event;
mod event_channel;
mod execution;
mod options;
mod pal;
mod routine;
mod stats;
mod suite;

pub use abort_handle::AbortHandle;
pub use benchmark::Benchmark;
pub use calibration::{Calibration, TimerUnit};
pub use collection::{Filter, Invocation, filter, invoke, join, join_pairs};
pub use compare::{Comparison, compare_samples};
pub use deferred::Deferred;
pub use definition::BenchmarkBuilder;
pub use error::Error;
pub(crate) use error::Result;
pub use event::{Event, EventKind, InstanceId};
pub use event_channel::{IntoEventKinds, ListenerId};
pub use options::{Options, OptionsOverride};
pub use stats::{Stats, Times};
pub use suite::Suite;

#[cfg(test)]
pub(crate) const ERR_POISONED_LOCK: &str =
    "encountered poisoned lock - program validity cannot be guaranteed";
