//! Runtime configuration.
//!
//! Loaded from YAML or JSON. Every section has defaults, so an empty
//! document is a valid configuration. Durations are human-readable
//! strings such as `"15s"` or `"250ms"`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use truthlayer_core::{AggregationConfig, ExtractionConfig, LabelPolicy};

use crate::prompts;
use crate::resilience::CircuitBreakerConfig;

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Serde adapter for durations written as `"30s"`, `"1m 30s"`, `"250ms"`.
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub extraction: ExtractionConfig,
    pub verification: VerificationConfig,
    pub cache: CacheConfig,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,

    /// Timeout applied to every external call
    #[serde(with = "duration_str")]
    pub call_timeout: Duration,

    pub circuit_breaker: CircuitBreakerConfig,
    pub budgets: BudgetConfig,
    pub aggregation: AggregationConfig,
    pub output: OutputConfig,

    /// Model id → backend definition
    pub models: BTreeMap<String, ModelSpec>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            extraction: ExtractionConfig::default(),
            verification: VerificationConfig::default(),
            cache: CacheConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            retry: RetryConfig::default(),
            call_timeout: Duration::from_secs(30),
            circuit_breaker: CircuitBreakerConfig::default(),
            budgets: BudgetConfig::default(),
            aggregation: AggregationConfig::default(),
            output: OutputConfig::default(),
            models: BTreeMap::new(),
        }
    }
}

/// Evidence retrieval parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages per query
    pub k: usize,

    /// Corpus selector passed to the search backend
    pub corpus: String,

    /// Passages scoring below this are dropped
    pub min_relevance: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 5,
            corpus: "default".to_string(),
            min_relevance: 0.0,
        }
    }
}

/// Constrained generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Window size cap; extra passages are dropped and recorded
    pub max_passages: usize,

    /// Per-passage character limit in the source block
    pub passage_chars: usize,

    pub max_tokens: u32,
    pub temperature: f32,

    /// Answers drawn per (query, model); each is verified and scored on
    /// its own. Useful with a non-zero temperature.
    pub samples: usize,

    pub prompt: PromptTemplate,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_passages: 5,
            passage_chars: prompts::PASSAGE_CHAR_LIMIT,
            max_tokens: 300,
            temperature: 0.0,
            samples: 1,
            prompt: PromptTemplate::default(),
        }
    }
}

/// Prompt template for grounded answering.
///
/// `user` must contain `{question}` and `{sources}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PromptTemplate {
    pub system: String,
    pub user: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system: prompts::GROUNDED_SYSTEM_PROMPT.to_string(),
            user: prompts::GROUNDED_USER_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Fill in the placeholders.
    pub fn render(&self, question: &str, sources: &str) -> String {
        self.user
            .replace("{question}", question)
            .replace("{sources}", sources)
    }
}

/// Entailment backend selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntailmentBackend {
    /// Offline lexical scorer
    Lexical,

    /// Prompted scorer using a model from the `models` table
    Llm { model: String },

    /// Text-classification endpoint returning `[{label, score}]`
    Http {
        url: String,
        #[serde(default)]
        api_key: Option<String>,
    },
}

impl Default for EntailmentBackend {
    fn default() -> Self {
        EntailmentBackend::Lexical
    }
}

/// Verification parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VerificationConfig {
    /// Entailment/contradiction threshold τ
    pub threshold: f64,

    /// Ambiguity band ε
    pub epsilon: f64,

    pub backend: EntailmentBackend,

    /// Token cap for prompted scorers
    pub max_tokens: u32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        let policy = LabelPolicy::default();
        Self {
            threshold: policy.threshold,
            epsilon: policy.epsilon,
            backend: EntailmentBackend::default(),
            max_tokens: 128,
        }
    }
}

impl VerificationConfig {
    pub fn policy(&self) -> LabelPolicy {
        LabelPolicy::new(self.threshold, self.epsilon)
    }
}

/// Response cache location and size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,

    /// In-memory entries kept in front of the file store
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".truthlayer/cache"),
            max_entries: 10_000,
        }
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// (query, model) items processed at once
    pub max_in_flight_items: usize,

    /// Concurrent calls to model and search backends
    pub max_external_calls: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_in_flight_items: 8,
            max_external_calls: 4,
        }
    }
}

/// Retry with exponential backoff for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,

    #[serde(with = "duration_str")]
    pub min_delay: Duration,

    #[serde(with = "duration_str")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Token ceilings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BudgetConfig {
    pub global_max_tokens: u32,
    pub per_model_max_tokens: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            global_max_tokens: 5_000_000,
            per_model_max_tokens: 1_000_000,
        }
    }
}

/// Where run directories are created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub runs_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from("runs"),
        }
    }
}

/// One model under evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSpec {
    /// Provider type registered in the `ProviderRegistry`
    pub provider: String,

    /// Backend model name sent with each request
    pub model: String,

    /// Provider-specific settings
    #[serde(default)]
    pub config: JsonValue,
}

impl RuntimeConfig {
    /// Parse from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        if self.retrieval.k == 0 {
            return invalid("retrieval.k must be at least 1".to_string());
        }
        if self.generation.max_passages == 0 {
            return invalid("generation.max_passages must be at least 1".to_string());
        }
        if self.generation.samples == 0 {
            return invalid("generation.samples must be at least 1".to_string());
        }
        let v = &self.verification;
        if !(v.threshold > 0.0 && v.threshold <= 1.0) {
            return invalid(format!(
                "verification.threshold must be in (0, 1], got {}",
                v.threshold
            ));
        }
        if !(v.epsilon >= 0.0) {
            return invalid(format!(
                "verification.epsilon must be non-negative, got {}",
                v.epsilon
            ));
        }
        if self.concurrency.max_in_flight_items == 0 || self.concurrency.max_external_calls == 0 {
            return invalid("concurrency limits must be at least 1".to_string());
        }
        if self.aggregation.bootstrap_resamples == 0 {
            return invalid("aggregation.bootstrap_resamples must be at least 1".to_string());
        }
        if self.retry.min_delay > self.retry.max_delay {
            return invalid("retry.min_delay exceeds retry.max_delay".to_string());
        }
        if !self.generation.prompt.user.contains("{question}")
            || !self.generation.prompt.user.contains("{sources}")
        {
            return invalid(
                "generation.prompt.user must contain {question} and {sources}".to_string(),
            );
        }
        if let EntailmentBackend::Llm { model } = &v.backend {
            if !self.models.contains_key(model) {
                return invalid(format!(
                    "verification.backend.model '{}' is not defined under models",
                    model
                ));
            }
        }
        Ok(())
    }
}
