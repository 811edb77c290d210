//! # truthlayer-runtime
//!
//! Async evaluation pipeline for Truth Layer.
//!
//! This crate runs every (query, model) item through:
//! 1. Retrieval of ranked evidence from a search backend
//! 2. Generation constrained to the retrieved evidence window
//! 3. Claim extraction (deterministic, from `truthlayer-core`)
//! 4. Entailment verification of each claim against the window
//!
//! and aggregates the verdicts into the run's summary tables.
//!
//! ## Key Guarantees
//!
//! 1. **Cached by content**: every stage result is stored under a key
//!    derived from its inputs; a warm re-run issues no external calls
//! 2. **Bounded**: external calls go through one gate with a concurrency
//!    limit, retries, timeouts, circuit breakers and token budgets
//! 3. **Cancellable**: a cancelled run issues no new calls and still writes
//!    its partial artifacts
//!
//! ## Example
//!
//! ```rust,ignore
//! use truthlayer_runtime::{Pipeline, RunContext, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_file("truthlayer.yaml")?;
//! let runs_dir = config.output.runs_dir.clone();
//! let pipeline = Pipeline::builder(config).build()?;
//!
//! let run = RunContext::create(&runs_dir)?;
//! let summary = pipeline.evaluate_run(&run, &queries, &pipeline.model_ids()).await?;
//! ```

pub mod cache;
pub mod config;
pub mod generator;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod retrieval;
pub mod run;
pub mod verifier;

// Re-export main types at crate root
pub use cache::{CacheError, CacheStats, ResponseCache};
pub use config::{ConfigError, EntailmentBackend, RuntimeConfig};
pub use generator::{Generator, ModelHandle};
pub use orchestrator::{Pipeline, PipelineBuilder, RuntimeError, StageError};
pub use providers::{LlmProvider, ProviderError, ProviderRegistry};
pub use resilience::{CallError, CallGuard};
pub use retrieval::{InMemoryCorpus, Retriever, SearchBackend, SearchError};
pub use run::{summarize, ArtifactError, ArtifactWriter, RunContext};
pub use verifier::{EntailmentError, EntailmentModel, Verifier};
