//! # truthlayer-core
//!
//! Deterministic building blocks of the Truth Layer evaluation pipeline.
//!
//! This crate answers, for a model's answer to a question:
//! - Which atomic claims does the answer make?
//! - Does the retrieved evidence support, contradict, or not settle each one?
//! - How do models compare, and how sure are we?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same input always produces same output
//! 2. **No network calls**: Model and search backends live in `truthlayer-runtime`
//! 3. **Order-independent**: Verdicts do not depend on passage order or batching
//! 4. **Recomputable**: `RunSummary` is a pure projection of verdict records
//!
//! ## Example
//!
//! ```rust,ignore
//! use truthlayer_core::{LabelPolicy, LexicalEntailment, Claim, PassageScore, Label};
//!
//! let claim = Claim::new("gen", 0, "The Nile is the longest river in the world.");
//! let evidence = "The Nile is 6,650 km long, slightly shorter than the Amazon River.";
//! let scores = LexicalEntailment::new().score(evidence, &claim.text);
//! let verdict = LabelPolicy::default().decide(
//!     &claim,
//!     &[PassageScore { source_id: "p1".into(), scores }],
//! );
//! assert_eq!(verdict.label, Label::Contradicted);
//! ```

pub mod aggregate;
pub mod dataset;
pub mod evidence;
pub mod extraction;
pub mod fingerprint;
pub mod lexical;
pub mod policy;
pub mod stats;
pub mod types;

// Re-export main types at crate root
pub use aggregate::{
    AggregationConfig, Aggregator, ClaimLabel, CoverageGap, CoverageReport, DomainSummaryRow,
    GapReason, GroundTruth, ModelSummaryRow, PairwiseRow, RunSummary, VerdictRecord,
};
pub use dataset::{load_claim_labels, load_queries, DatasetError};
pub use evidence::{rank_passages, shorten};
pub use extraction::{ClaimExtractor, ExtractionConfig};
pub use fingerprint::{CacheKey, Fingerprint, Stage};
pub use lexical::LexicalEntailment;
pub use policy::LabelPolicy;
pub use stats::{BootstrapConfig, Estimate, McNemarResult, StatsError};
pub use types::{
    Claim, EvidencePassage, Expected, GenerationRecord, GenerationStatus, Label, NliScores,
    PassageScore, Provenance, Query, Verdict, WindowTruncation, UNKNOWN_DOMAIN,
};
