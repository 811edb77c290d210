//! McNemar's test on paired binary outcomes.
//!
//! Only discordant pairs carry information. With few of them the exact
//! two-sided binomial test is used; above `exact_max` the chi-square
//! approximation with continuity correction takes over.

use serde::{Deserialize, Serialize};

use super::StatsError;

/// Default discordant-pair count up to which the exact test is used.
pub const DEFAULT_EXACT_MAX: usize = 25;

/// Which form of the test produced the p-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McNemarMethod {
    ExactBinomial,
    ChiSquare,
}

/// Outcome of one paired comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct McNemarResult {
    pub n_shared: usize,
    pub a_wrong_b_right: usize,
    pub a_right_b_wrong: usize,
    pub p_value: f64,
    pub method: McNemarMethod,
}

/// Compare paired correctness vectors of models A and B.
pub fn mcnemar(a: &[bool], b: &[bool], exact_max: usize) -> Result<McNemarResult, StatsError> {
    if a.len() != b.len() {
        return Err(StatsError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let (mut b01, mut b10) = (0usize, 0usize);
    for (&ra, &rb) in a.iter().zip(b) {
        match (ra, rb) {
            (false, true) => b01 += 1,
            (true, false) => b10 += 1,
            _ => {}
        }
    }

    Ok(from_counts(a.len(), b01, b10, exact_max))
}

/// Test from precomputed discordant counts.
pub fn from_counts(n_shared: usize, b01: usize, b10: usize, exact_max: usize) -> McNemarResult {
    let discordant = b01 + b10;
    let (p_value, method) = if discordant <= exact_max {
        (exact_p(b01, b10), McNemarMethod::ExactBinomial)
    } else {
        (chi_square_p(b01, b10), McNemarMethod::ChiSquare)
    };

    McNemarResult {
        n_shared,
        a_wrong_b_right: b01,
        a_right_b_wrong: b10,
        p_value,
        method,
    }
}

/// Two-sided exact binomial p-value: 2·P(X ≤ min(b01, b10)), X ~ Bin(n, ½).
fn exact_p(b01: usize, b10: usize) -> f64 {
    let n = b01 + b10;
    if n == 0 {
        return 1.0;
    }
    let k = b01.min(b10);

    // Walk the pmf in log space so large n does not underflow.
    let mut log_pmf = -(n as f64) * std::f64::consts::LN_2;
    let mut tail = 0.0;
    for i in 0..=k {
        tail += log_pmf.exp();
        log_pmf += ((n - i) as f64).ln() - ((i + 1) as f64).ln();
    }
    (2.0 * tail).min(1.0)
}

/// Chi-square (1 df) p-value with continuity correction.
fn chi_square_p(b01: usize, b10: usize) -> f64 {
    let n = (b01 + b10) as f64;
    if n == 0.0 {
        return 1.0;
    }
    let diff = (b01 as f64 - b10 as f64).abs() - 1.0;
    let statistic = diff.max(0.0).powi(2) / n;
    chi2_sf_1df(statistic).clamp(0.0, 1.0)
}

/// Survival function of chi-square with one degree of freedom.
fn chi2_sf_1df(x: f64) -> f64 {
    erfc((x / 2.0).sqrt())
}

/// Complementary error function (Chebyshev fit, |error| < 1.2e-7).
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87
                                    + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * poly.exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}
