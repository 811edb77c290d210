//! Statistics for comparing models: bootstrap intervals and McNemar's test.

pub mod bootstrap;
pub mod mcnemar;

pub use bootstrap::{bootstrap_ci, BootstrapConfig, Estimate};
pub use mcnemar::{mcnemar, McNemarMethod, McNemarResult, DEFAULT_EXACT_MAX};

use thiserror::Error;

/// Errors from statistical routines.
#[derive(Error, Debug, PartialEq)]
pub enum StatsError {
    #[error("Paired samples differ in length: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
}
