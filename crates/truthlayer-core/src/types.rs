//! Shared data model for the evaluation pipeline.
//!
//! Every record here is immutable once created. Reruns produce new records
//! under new cache keys; nothing is mutated in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Domain tag used when a query does not declare one.
pub const UNKNOWN_DOMAIN: &str = "unknown";

fn default_domain() -> String {
    UNKNOWN_DOMAIN.to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A question to be answered and verified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    /// Stable identifier, unique within a dataset
    pub id: String,

    /// The question text
    pub text: String,

    /// Domain tag used for per-domain breakdowns
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Expected-answer metadata, used only for scoring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Expected>,
}

impl Query {
    /// Create a query in the default domain.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            domain: default_domain(),
            expected: None,
        }
    }

    /// Set the domain tag.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Set the expected label applied to every claim of this query.
    pub fn with_expected_label(mut self, label: Label) -> Self {
        self.expected.get_or_insert_with(Expected::default).label = Some(label);
        self
    }
}

/// Expected-answer metadata attached to a query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Expected {
    /// Gold answer text, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    /// Label every claim of the answer is expected to receive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
}

/// Where a passage came from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Provenance {
    /// Corpus identifier (e.g., "wikipedia", "core-100")
    pub corpus: String,

    /// Document title, if the backend reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// URL or other locator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
}

/// A retrieved evidence passage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidencePassage {
    /// Backend-assigned identifier
    pub source_id: String,

    /// Passage text
    pub text: String,

    /// Retrieval score (higher is more relevant)
    pub score: f64,

    /// Corpus provenance
    pub provenance: Provenance,
}

impl EvidencePassage {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>, score: f64) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
            score,
            provenance: Provenance::default(),
        }
    }

    /// Set the corpus provenance.
    pub fn from_corpus(mut self, corpus: impl Into<String>) -> Self {
        self.provenance.corpus = corpus.into();
        self
    }

    /// Content hash of the normalized passage text.
    pub fn content_hash(&self) -> String {
        crate::fingerprint::text_hash(&self.text)
    }
}

/// Terminal state of a generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationStatus {
    /// The model produced an answer
    Answered,

    /// The backend declined on content-policy grounds
    Refused { reason: String },

    /// Retry budget exhausted or another non-recoverable backend failure
    Failed { reason: String },
}

impl GenerationStatus {
    pub fn is_answered(&self) -> bool {
        matches!(self, GenerationStatus::Answered)
    }
}

/// Record of any shortening applied to the supplied evidence window.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WindowTruncation {
    /// Passages supplied by the caller
    pub supplied: usize,

    /// Passages actually sent to the model
    pub used: usize,

    /// Source ids whose text was shortened in the prompt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shortened: Vec<String>,
}

/// One model answer for one query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRecord {
    /// Content-addressed id derived from the generation cache key
    pub id: String,

    pub query_id: String,

    /// The question as asked, kept for claim decomposition and audit
    pub question: String,

    pub model_id: String,

    /// Zero-based sample index; a question may be answered several times
    #[serde(default)]
    pub sample: usize,

    /// Passages actually sent to the model, in prompt order
    pub evidence_window: Vec<EvidencePassage>,

    /// Present when the window differs from what the caller supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation: Option<WindowTruncation>,

    /// Raw response text (empty unless answered)
    pub response: String,

    pub status: GenerationStatus,

    pub created_at: DateTime<Utc>,
}

impl GenerationRecord {
    /// Ids of the passages in the evidence window.
    pub fn evidence_ids(&self) -> Vec<String> {
        self.evidence_window
            .iter()
            .map(|p| p.source_id.clone())
            .collect()
    }
}

/// An atomic, self-contained claim extracted from a generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    /// `<generation_id>:<position>`
    pub id: String,

    pub generation_id: String,

    pub text: String,

    /// Zero-based position within the generation
    pub position: usize,
}

impl Claim {
    pub fn new(generation_id: &str, position: usize, text: impl Into<String>) -> Self {
        Self {
            id: format!("{}:{}", generation_id, position),
            generation_id: generation_id.to_string(),
            text: text.into(),
            position,
        }
    }
}

/// Verification label.
///
/// `Error` is a sentinel for claims whose verification could not complete;
/// it is excluded from every metric denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Supported,
    Contradicted,
    Unverifiable,
    Error,
}

impl Label {
    /// String form used in artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Supported => "supported",
            Label::Contradicted => "contradicted",
            Label::Unverifiable => "unverifiable",
            Label::Error => "error",
        }
    }

    /// Parse a label, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supported" => Some(Label::Supported),
            "contradicted" => Some(Label::Contradicted),
            "unverifiable" => Some(Label::Unverifiable),
            "error" => Some(Label::Error),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Label::Error)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-way entailment scores for one (premise, hypothesis) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NliScores {
    pub entailment: f64,
    pub neutral: f64,
    pub contradiction: f64,
}

impl NliScores {
    pub fn new(entailment: f64, neutral: f64, contradiction: f64) -> Self {
        Self {
            entailment,
            neutral,
            contradiction,
        }
    }
}

/// Entailment scores of one evidence passage against a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageScore {
    pub source_id: String,
    pub scores: NliScores,
}

/// The verifier's decision for one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub claim_id: String,

    /// Claim text, kept so verdict files are readable on their own
    pub claim: String,

    /// Ids of every passage considered
    pub evidence_ids: Vec<String>,

    pub label: Label,

    /// Confidence in `label` (0.0 - 1.0)
    pub confidence: f64,

    /// Highest entailment score across the evidence
    pub max_entail: f64,

    /// Highest contradiction score across the evidence
    pub max_contradict: f64,

    /// Passage that decided the label, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_evidence: Option<String>,

    /// Failure description for `Label::Error` verdicts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Set on the stand-in verdict of a generation with zero claims
    #[serde(default, skip_serializing_if = "is_false")]
    pub placeholder: bool,
}

impl Verdict {
    /// Sentinel verdict for a claim that could not be verified.
    pub fn error(claim: &Claim, evidence_ids: Vec<String>, reason: impl Into<String>) -> Self {
        Self {
            claim_id: claim.id.clone(),
            claim: claim.text.clone(),
            evidence_ids,
            label: Label::Error,
            confidence: 0.0,
            max_entail: 0.0,
            max_contradict: 0.0,
            best_evidence: None,
            error: Some(reason.into()),
            placeholder: false,
        }
    }

    /// Stand-in verdict for an answered generation that yielded no claims.
    pub fn placeholder(generation: &GenerationRecord) -> Self {
        Self {
            claim_id: format!("{}:0", generation.id),
            claim: String::new(),
            evidence_ids: generation.evidence_ids(),
            label: Label::Unverifiable,
            confidence: 1.0,
            max_entail: 0.0,
            max_contradict: 0.0,
            best_evidence: None,
            error: None,
            placeholder: true,
        }
    }

    /// Verifier support for `expected`, used for soft agreement.
    pub fn score_for(&self, expected: Label) -> f64 {
        match expected {
            Label::Supported => self.max_entail,
            Label::Contradicted => self.max_contradict,
            Label::Unverifiable => 1.0 - self.max_entail.max(self.max_contradict),
            Label::Error => 0.0,
        }
    }
}
