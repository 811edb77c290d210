//! Percentile bootstrap confidence intervals.

use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Bootstrap parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Number of resamples B
    pub resamples: usize,

    /// RNG seed; a fixed seed makes intervals reproducible
    pub seed: u64,

    /// Two-sided miss rate (0.05 → 95% interval)
    pub alpha: f64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            resamples: 10_000,
            seed: 17,
            alpha: 0.05,
        }
    }
}

/// Point estimate with a percentile interval.
///
/// All fields are `None` for an empty sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Estimate {
    pub mean: Option<f64>,
    pub lo: Option<f64>,
    pub hi: Option<f64>,
    pub n: usize,
}

/// Mean of `values` with a bootstrap interval over resampled means.
pub fn bootstrap_ci(values: &[f64], config: &BootstrapConfig) -> Estimate {
    let n = values.len();
    if n == 0 {
        return Estimate::default();
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if config.resamples == 0 {
        return Estimate {
            mean: Some(mean),
            lo: None,
            hi: None,
            n,
        };
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut means: Vec<f64> = (0..config.resamples)
        .map(|_| {
            let total: f64 = (0..n).map(|_| values[rng.gen_range(0..n)]).sum();
            total / n as f64
        })
        .collect();
    means.sort_by(f64::total_cmp);

    let b = config.resamples;
    let lo_idx = ((config.alpha / 2.0) * b as f64).floor() as usize;
    let hi_idx = (((1.0 - config.alpha / 2.0) * b as f64).floor() as usize).min(b - 1);

    Estimate {
        mean: Some(mean),
        lo: Some(means[lo_idx.min(b - 1)]),
        hi: Some(means[hi_idx]),
        n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sample() {
        let est = bootstrap_ci(&[], &BootstrapConfig::default());
        assert_eq!(est, Estimate::default());
    }

    #[test]
    fn test_constant_sample_has_degenerate_interval() {
        let est = bootstrap_ci(&[1.0; 20], &BootstrapConfig::default());
        assert_eq!(est.mean, Some(1.0));
        assert_eq!(est.lo, Some(1.0));
        assert_eq!(est.hi, Some(1.0));
        assert_eq!(est.n, 20);
    }

    #[test]
    fn test_same_seed_same_interval() {
        let values: Vec<f64> = (0..50).map(|i| (i % 3 == 0) as u8 as f64).collect();
        let config = BootstrapConfig {
            resamples: 1000,
            ..Default::default()
        };
        assert_eq!(bootstrap_ci(&values, &config), bootstrap_ci(&values, &config));
    }

    #[test]
    fn test_interval_brackets_mean() {
        let values: Vec<f64> = (0..40).map(|i| (i % 4 == 0) as u8 as f64).collect();
        let est = bootstrap_ci(&values, &BootstrapConfig::default());
        let (lo, mean, hi) = (est.lo.unwrap(), est.mean.unwrap(), est.hi.unwrap());
        assert!(lo <= mean && mean <= hi);
        assert!(lo < hi);
    }

    #[test]
    fn test_coverage_of_known_proportion() {
        let p = 0.3;
        let n = 200;
        let mut sampler = StdRng::seed_from_u64(2024);
        let config = BootstrapConfig {
            resamples: 400,
            seed: 17,
            alpha: 0.05,
        };

        let trials = 200;
        let covered = (0..trials)
            .filter(|_| {
                let sample: Vec<f64> = (0..n)
                    .map(|_| if sampler.gen::<f64>() < p { 1.0 } else { 0.0 })
                    .collect();
                let est = bootstrap_ci(&sample, &config);
                est.lo.unwrap() <= p && p <= est.hi.unwrap()
            })
            .count();

        assert!(covered * 10 >= trials * 9, "interval covered p in {covered}/{trials} trials");
    }
}
