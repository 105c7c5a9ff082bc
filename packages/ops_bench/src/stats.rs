use std::time::SystemTime;

use crate::calibration::Stamp;

/// Two-tailed 95% critical values of Student's t-distribution, indexed by degrees of
/// freedom minus one.
const T_TABLE: [f64; 30] = [
    12.706, 4.303, 3.182, 2.776, 2.571, 2.447, 2.365, 2.306, 2.262, 2.228, 2.201, 2.179, 2.16,
    2.145, 2.131, 2.12, 2.11, 2.101, 2.093, 2.086, 2.08, 2.074, 2.069, 2.064, 2.06, 2.056, 2.052,
    2.048, 2.045, 2.042,
];

/// The critical value used once the degrees of freedom exceed the table.
const T_INFINITY: f64 = 1.96;

/// The statistics of a benchmark run, derived from the periods of its cycles.
///
/// Every derived value is recomputed from the full sample whenever a period is appended.
/// The sample itself only ever grows, in cycle order.
///
/// # Examples
///
/// ```
/// use ops_bench::Stats;
///
/// let stats = Stats::from_sample([0.010, 0.012, 0.011]);
///
/// assert_eq!(stats.sample().len(), 3);
/// assert!((stats.mean() - 0.011).abs() < 1e-12);
/// assert!(stats.rme() > 0.0);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stats {
    sample: Vec<f64>,
    mean: f64,
    variance: f64,
    deviation: f64,
    sem: f64,
    moe: f64,
    rme: f64,
}

impl Stats {
    /// Computes the statistics of an existing sample of periods, in seconds.
    #[must_use]
    pub fn from_sample(periods: impl IntoIterator<Item = f64>) -> Self {
        let mut stats = Self {
            sample: periods.into_iter().collect(),
            ..Self::default()
        };

        stats.recompute();
        stats
    }

    /// The recorded periods, in seconds per iteration, in cycle order.
    #[must_use]
    pub fn sample(&self) -> &[f64] {
        &self.sample
    }

    /// The arithmetic mean of the sample, in seconds.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// The sample variance.
    #[must_use]
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// The sample standard deviation.
    #[must_use]
    pub fn deviation(&self) -> f64 {
        self.deviation
    }

    /// The standard error of the mean.
    #[must_use]
    pub fn sem(&self) -> f64 {
        self.sem
    }

    /// The margin of error of the mean at 95% confidence, in seconds.
    #[must_use]
    pub fn moe(&self) -> f64 {
        self.moe
    }

    /// The margin of error as a percentage of the mean.
    #[must_use]
    pub fn rme(&self) -> f64 {
        self.rme
    }

    /// Overrides the relative margin of error, for exercising formatting.
    #[cfg(test)]
    pub(crate) fn with_rme(mut self, rme: f64) -> Self {
        self.rme = rme;
        self
    }

    pub(crate) fn push(&mut self, period: f64) {
        self.sample.push(period);
        self.recompute();
    }

    #[expect(
        clippy::cast_precision_loss,
        reason = "sample sizes are far below 2^52"
    )]
    fn recompute(&mut self) {
        let size = self.sample.len();

        if size == 0 {
            *self = Self::default();
            return;
        }

        let n = size as f64;
        let mean = self.sample.iter().sum::<f64>() / n;

        let variance = if size > 1 {
            self.sample
                .iter()
                .map(|period| (period - mean).powi(2))
                .sum::<f64>()
                / (n - 1.0)
        } else {
            0.0
        };

        let deviation = variance.sqrt();
        let sem = deviation / n.sqrt();
        let moe = sem * critical_t(size.saturating_sub(1));
        let rme = if mean == 0.0 { 0.0 } else { moe / mean * 100.0 };

        self.mean = mean;
        self.variance = variance;
        self.deviation = deviation;
        self.sem = sem;
        self.moe = moe;
        self.rme = if rme.is_finite() { rme } else { 0.0 };
    }
}

/// Looks up the 95% critical value for the given degrees of freedom; zero degrees of freedom
/// are treated as one.
fn critical_t(degrees_of_freedom: usize) -> f64 {
    T_TABLE
        .get(degrees_of_freedom.max(1).saturating_sub(1))
        .copied()
        .unwrap_or(T_INFINITY)
}

/// Timing data of the current or most recent run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Times {
    cycle: f64,
    elapsed: f64,
    period: f64,
    timestamp: Option<SystemTime>,

    pub(crate) started: Option<Stamp>,
}

impl Times {
    /// The duration of the last cycle, in seconds.
    #[must_use]
    pub fn cycle(&self) -> f64 {
        self.cycle
    }

    /// The time since the run started, in seconds.
    #[must_use]
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// The duration of one iteration in the last cycle, in seconds.
    #[must_use]
    pub fn period(&self) -> f64 {
        self.period
    }

    /// When the run started.
    #[must_use]
    pub fn timestamp(&self) -> Option<SystemTime> {
        self.timestamp
    }

    pub(crate) fn start(&mut self, started: Stamp) {
        *self = Self {
            timestamp: Some(SystemTime::now()),
            started: Some(started),
            ..Self::default()
        };
    }

    pub(crate) fn record_cycle(&mut self, clocked: f64, period: f64, elapsed: f64) {
        self.cycle = clocked;
        self.period = period;
        self.elapsed = elapsed;
    }

    pub(crate) fn is_initial(&self) -> bool {
        *self == Self::default()
    }
}
