//! Helpers for working with groups of benchmarks.

use std::fmt::Display;

use crate::{Benchmark, Comparison, OptionsOverride, Result};

/// Selects benchmarks from a group with [`filter()`].
#[derive(derive_more::Debug)]
#[non_exhaustive]
pub enum Filter {
    /// Benchmarks that measured at least one cycle with a finite hz and did not fail.
    Successful,

    /// The successful benchmarks with the lowest periods, including every one that cannot be
    /// told apart from the fastest.
    Fastest,

    /// The successful benchmarks with the highest periods, including every one that cannot be
    /// told apart from the slowest.
    Slowest,

    /// Benchmarks for which the predicate returns `true`.
    Predicate(#[debug(ignore)] Box<dyn Fn(&Benchmark) -> bool>),
}

impl Filter {
    /// Creates a filter from a predicate.
    pub fn by<F>(predicate: F) -> Self
    where
        F: Fn(&Benchmark) -> bool + 'static,
    {
        Self::Predicate(Box::new(predicate))
    }
}

/// Selects the benchmarks matching `filter`, preserving their order unless the filter ranks
/// them.
///
/// # Examples
///
/// ```
/// use ops_bench::{Benchmark, Filter, filter};
///
/// fn report(benchmarks: &[Benchmark]) {
///     for fastest in filter(benchmarks, Filter::Fastest) {
///         println!("fastest is {}", fastest.display_name());
///     }
/// }
/// # report(&[]);
/// ```
#[must_use]
pub fn filter(benchmarks: &[Benchmark], filter: Filter) -> Vec<&Benchmark> {
    match filter {
        Filter::Successful => benchmarks.iter().filter(|b| is_successful(b)).collect(),
        Filter::Fastest => extremes(benchmarks, false),
        Filter::Slowest => extremes(benchmarks, true),
        Filter::Predicate(predicate) => benchmarks.iter().filter(|b| predicate(b)).collect(),
    }
}

fn is_successful(benchmark: &Benchmark) -> bool {
    benchmark.cycles() > 0 && benchmark.hz().is_finite() && benchmark.error().is_none()
}

/// The successful benchmarks ordered by the upper bound of their mean period, truncated to
/// those the comparator cannot tell apart from the first.
fn extremes(benchmarks: &[Benchmark], slowest_first: bool) -> Vec<&Benchmark> {
    let mut ranked: Vec<&Benchmark> = benchmarks.iter().filter(|b| is_successful(b)).collect();

    ranked.sort_by(|a, b| {
        let ordering = upper_bound(a).total_cmp(&upper_bound(b));

        if slowest_first {
            ordering.reverse()
        } else {
            ordering
        }
    });

    let Some(extreme) = ranked.first().copied() else {
        return ranked;
    };

    ranked.retain(|candidate| extreme.compare(candidate) == Comparison::Indeterminate);
    ranked
}

fn upper_bound(benchmark: &Benchmark) -> f64 {
    benchmark.stats().mean() + benchmark.stats().moe()
}

/// Joins the displayed `values` with `separator`.
///
/// # Examples
///
/// ```
/// assert_eq!(ops_bench::join([1, 2, 3], ", "), "1, 2, 3");
/// ```
#[must_use]
pub fn join<I>(values: I, separator: &str) -> String
where
    I: IntoIterator,
    I::Item: Display,
{
    let mut joined = String::new();

    for (index, value) in values.into_iter().enumerate() {
        if index > 0 {
            joined.push_str(separator);
        }

        joined.push_str(&value.to_string());
    }

    joined
}

/// Joins key-value pairs, rendering each pair as `key`, `pair_separator`, `value` and
/// separating the pairs with `separator`.
///
/// # Examples
///
/// ```
/// let joined = ops_bench::join_pairs([("hz", 10), ("cycles", 5)], ", ", ": ");
///
/// assert_eq!(joined, "hz: 10, cycles: 5");
/// ```
#[must_use]
pub fn join_pairs<I, K, V>(pairs: I, separator: &str, pair_separator: &str) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Display,
    V: Display,
{
    join(
        pairs
            .into_iter()
            .map(|(key, value)| format!("{key}{pair_separator}{value}")),
        separator,
    )
}

/// An operation that [`invoke()`] applies to every benchmark of a group.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Invocation {
    /// Runs each benchmark with the given overrides, one after another.
    Run(OptionsOverride),

    /// Aborts each benchmark.
    Abort,

    /// Resets each benchmark.
    Reset,
}

/// Applies `invocation` to every benchmark in order.
///
/// # Errors
///
/// Returns the first [`Error::Configuration`][crate::Error::Configuration] raised by
/// applying run overrides. The benchmarks before the rejected one have already run.
pub fn invoke(benchmarks: &mut [Benchmark], invocation: &Invocation) -> Result<()> {
    for benchmark in benchmarks {
        match invocation {
            Invocation::Run(overrides) => {
                benchmark.run_with(overrides)?;
            }
            Invocation::Abort => {
                benchmark.abort();
            }
            Invocation::Reset => {
                benchmark.reset();
            }
        }
    }

    Ok(())
}
