use std::fmt;

/// Critical values of the Mann-Whitney U statistic at 95% confidence, two-tailed.
///
/// Row `i` covers a larger sample of `i + 5` elements; column `j` covers a smaller sample of
/// `j + 3` elements.
const U_TABLE: [&[u32]; 26] = [
    &[0, 1, 2],
    &[1, 2, 3, 5],
    &[1, 3, 5, 6, 8],
    &[2, 4, 6, 8, 10, 13],
    &[2, 4, 7, 10, 12, 15, 17],
    &[3, 5, 8, 11, 14, 17, 20, 23],
    &[3, 6, 9, 13, 16, 19, 23, 26, 30],
    &[4, 7, 11, 14, 18, 22, 26, 29, 33, 37],
    &[4, 8, 12, 16, 20, 24, 28, 33, 37, 41, 45],
    &[5, 9, 13, 17, 22, 26, 31, 36, 40, 45, 50, 55],
    &[5, 10, 14, 19, 24, 29, 34, 39, 44, 49, 54, 59, 64],
    &[6, 11, 15, 21, 26, 31, 37, 42, 47, 53, 59, 64, 70, 75],
    &[6, 11, 17, 22, 28, 34, 39, 45, 51, 57, 63, 67, 75, 81, 87],
    &[7, 12, 18, 24, 30, 36, 42, 48, 55, 61, 67, 74, 80, 86, 93, 99],
    &[7, 13, 19, 25, 32, 38, 45, 52, 58, 65, 72, 78, 85, 92, 99, 106, 113],
    &[8, 14, 20, 27, 34, 41, 48, 55, 62, 69, 76, 83, 90, 98, 105, 112, 119, 127],
    &[
        8, 15, 22, 29, 36, 43, 50, 58, 65, 73, 80, 88, 96, 103, 111, 119, 126, 134, 142,
    ],
    &[
        9, 16, 23, 30, 38, 45, 53, 61, 69, 77, 85, 93, 101, 109, 117, 125, 133, 141, 150, 158,
    ],
    &[
        9, 17, 24, 32, 40, 48, 56, 64, 73, 81, 89, 98, 106, 115, 123, 132, 140, 149, 157, 166,
        175,
    ],
    &[
        10, 17, 25, 33, 42, 50, 59, 67, 76, 85, 94, 102, 111, 120, 129, 138, 147, 156, 165, 174,
        183, 192,
    ],
    &[
        10, 18, 27, 35, 44, 53, 62, 71, 80, 89, 98, 107, 117, 126, 135, 145, 154, 163, 173, 182,
        192, 201, 211,
    ],
    &[
        11, 19, 28, 37, 46, 55, 64, 74, 83, 93, 102, 112, 122, 132, 141, 151, 161, 171, 181, 191,
        200, 210, 220, 230,
    ],
    &[
        11, 20, 29, 38, 48, 57, 67, 77, 87, 97, 107, 118, 125, 138, 147, 158, 168, 178, 188, 199,
        209, 219, 230, 240, 250,
    ],
    &[
        12, 21, 30, 40, 50, 60, 70, 80, 90, 101, 111, 122, 132, 143, 154, 164, 175, 186, 196, 207,
        218, 228, 239, 250, 261, 272,
    ],
    &[
        13, 22, 32, 42, 52, 62, 73, 83, 94, 105, 116, 127, 138, 149, 160, 171, 182, 193, 204, 215,
        226, 238, 249, 260, 271, 282, 294,
    ],
    &[
        13, 23, 33, 43, 54, 65, 76, 87, 98, 109, 120, 131, 143, 154, 166, 177, 189, 200, 212, 223,
        235, 247, 258, 270, 282, 293, 305, 317,
    ],
];

/// Smallest sample size of the larger sample covered by [`U_TABLE`].
const U_TABLE_MIN_LARGER: usize = 5;

/// Smallest sample size of the smaller sample covered by [`U_TABLE`].
const U_TABLE_MIN_SMALLER: usize = 3;

/// Combined sample sizes above this use the normal approximation instead of [`U_TABLE`].
const NORMAL_APPROXIMATION_THRESHOLD: usize = 30;

/// The two-tailed 95% critical z-score.
const Z_CRITICAL: f64 = 1.96;

/// The outcome of comparing the period samples of two benchmarks.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "a significance test has no outcomes beyond these three"
)]
pub enum Comparison {
    /// The first benchmark is significantly faster (its periods rank lower).
    Faster,

    /// The first benchmark is significantly slower (its periods rank higher).
    Slower,

    /// No statistically significant difference could be established.
    Indeterminate,
}

impl Comparison {
    /// The classic `+1`/`-1`/`0` encoding of the comparison.
    #[must_use]
    pub fn signum(self) -> i8 {
        match self {
            Self::Faster => 1,
            Self::Slower => -1,
            Self::Indeterminate => 0,
        }
    }

    /// The same comparison seen from the other operand.
    #[must_use]
    pub fn reversed(self) -> Self {
        match self {
            Self::Faster => Self::Slower,
            Self::Slower => Self::Faster,
            Self::Indeterminate => Self::Indeterminate,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Faster => "faster",
            Self::Slower => "slower",
            Self::Indeterminate => "indeterminate",
        };

        f.write_str(text)
    }
}

/// Decides with a Mann-Whitney U test whether the periods in `a` are significantly lower or
/// higher than those in `b`.
///
/// Samples too small for the critical value table, including empty ones, are
/// [`Comparison::Indeterminate`].
///
/// # Examples
///
/// ```
/// use ops_bench::{Comparison, compare_samples};
///
/// let quick = [1.0, 1.1, 0.9, 1.0, 1.05];
/// let slow = [2.0, 2.1, 1.9, 2.0, 2.05];
///
/// assert_eq!(compare_samples(&quick, &slow), Comparison::Faster);
/// assert_eq!(compare_samples(&slow, &quick), Comparison::Slower);
/// ```
#[must_use]
pub fn compare_samples(a: &[f64], b: &[f64]) -> Comparison {
    let u1 = u_statistic(a, b);
    let u2 = u_statistic(b, a);
    let u = u1.min(u2);

    let direction = if u == u1 {
        Comparison::Faster
    } else {
        Comparison::Slower
    };

    let n1 = a.len();
    let n2 = b.len();

    let significant = if n1.saturating_add(n2) > NORMAL_APPROXIMATION_THRESHOLD {
        z_score(u, n1, n2).abs() > Z_CRITICAL
    } else {
        critical_u(n1, n2).is_some_and(|critical| u <= f64::from(critical))
    };

    if significant {
        direction
    } else {
        Comparison::Indeterminate
    }
}

/// Sums, over every period in `sample`, how many periods of `other` are lower, counting ties
/// as one half.
fn u_statistic(sample: &[f64], other: &[f64]) -> f64 {
    sample
        .iter()
        .map(|&x| {
            other
                .iter()
                .map(|&y| {
                    if y < x {
                        1.0
                    } else if y == x {
                        0.5
                    } else {
                        0.0
                    }
                })
                .sum::<f64>()
        })
        .sum()
}

#[expect(
    clippy::cast_precision_loss,
    reason = "sample sizes are far below 2^52"
)]
fn z_score(u: f64, n1: usize, n2: usize) -> f64 {
    let n1 = n1 as f64;
    let n2 = n2 as f64;

    (u - n1 * n2 / 2.0) / (n1 * n2 * (n1 + n2 + 1.0) / 12.0).sqrt()
}

fn critical_u(n1: usize, n2: usize) -> Option<u32> {
    let larger = n1.max(n2).checked_sub(U_TABLE_MIN_LARGER)?;
    let smaller = n1.min(n2).checked_sub(U_TABLE_MIN_SMALLER)?;

    U_TABLE.get(larger)?.get(smaller).copied()
}
