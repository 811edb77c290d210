//! Entailment verification of claims against evidence.
//!
//! An [`EntailmentModel`] scores (premise, hypothesis) pairs; the
//! [`Verifier`] feeds every passage of a claim's evidence through it and
//! hands the scores to the core [`LabelPolicy`]. Each passage is scored
//! independently, so batching never changes a verdict.

#[cfg(feature = "hf-inference")]
mod http;
mod lexical;
mod llm;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use truthlayer_core::{Claim, EvidencePassage, Fingerprint, LabelPolicy, NliScores, PassageScore, Verdict};

use crate::providers::ProviderError;
use crate::resilience::{CallError, CallGuard};

#[cfg(feature = "hf-inference")]
pub use http::HttpEntailment;
pub use lexical::LexicalEntailmentModel;
pub use llm::LlmEntailment;

/// Errors from entailment backends.
#[derive(Error, Debug, Clone)]
pub enum EntailmentError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Entailment API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// Output that cannot be read as three-way scores. Never retried.
    #[error("Malformed verifier output: {0}")]
    Malformed(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Entailment backend not configured: {0}")]
    NotConfigured(String),
}

impl EntailmentError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            EntailmentError::HttpError(_)
            | EntailmentError::RateLimited
            | EntailmentError::Timeout(_) => true,
            EntailmentError::ApiError { status, .. } => *status >= 500 || *status == 408,
            EntailmentError::Provider(e) => e.is_transient(),
            EntailmentError::Malformed(_) | EntailmentError::NotConfigured(_) => false,
        }
    }
}

impl crate::resilience::Transient for EntailmentError {
    fn is_transient(&self) -> bool {
        EntailmentError::is_transient(self)
    }

    fn timed_out(after: Duration) -> Self {
        EntailmentError::Timeout(after)
    }
}

/// Three-way NLI scorer.
#[async_trait]
pub trait EntailmentModel: Send + Sync {
    /// Score `hypothesis` against each premise; one result per premise, in
    /// premise order.
    async fn score(
        &self,
        premises: &[String],
        hypothesis: &str,
    ) -> Result<Vec<NliScores>, EntailmentError>;

    /// Stable identifier, part of every verification cache key.
    fn id(&self) -> &str;

    /// Whether scoring leaves the process. External models go through the
    /// call guard; local ones are never gated or cancelled.
    fn is_external(&self) -> bool {
        true
    }
}

#[derive(Serialize)]
struct VerificationParams<'a> {
    claim_id: &'a str,
    claim: &'a str,
    evidence: Vec<(&'a str, String)>,
    threshold: f64,
    epsilon: f64,
    backend: &'a str,
}

/// Claim verifier: entailment model plus label policy.
#[derive(Clone)]
pub struct Verifier {
    model: Arc<dyn EntailmentModel>,
    policy: LabelPolicy,
}

impl Verifier {
    pub fn new(model: Arc<dyn EntailmentModel>, policy: LabelPolicy) -> Self {
        Self { model, policy }
    }

    pub fn policy(&self) -> &LabelPolicy {
        &self.policy
    }

    pub fn model_id(&self) -> &str {
        self.model.id()
    }

    /// Verify one claim against its evidence.
    ///
    /// Empty evidence is Unverifiable without calling the model. A backend
    /// that cannot produce scores yields an `Err`; callers record it as an
    /// error verdict.
    pub async fn verify(
        &self,
        claim: &Claim,
        evidence: &[EvidencePassage],
        guard: &CallGuard,
    ) -> Result<Verdict, CallError<EntailmentError>> {
        if evidence.is_empty() {
            return Ok(self.policy.decide(claim, &[]));
        }

        let premises: Vec<String> = evidence.iter().map(|p| p.text.clone()).collect();
        let scores = if self.model.is_external() {
            guard
                .call(self.model.id(), || self.model.score(&premises, &claim.text))
                .await?
        } else {
            self.model
                .score(&premises, &claim.text)
                .await
                .map_err(CallError::Backend)?
        };

        if scores.len() != evidence.len() {
            return Err(CallError::Backend(EntailmentError::Malformed(format!(
                "expected {} score sets, got {}",
                evidence.len(),
                scores.len()
            ))));
        }

        let passage_scores: Vec<PassageScore> = evidence
            .iter()
            .zip(scores)
            .map(|(p, scores)| PassageScore {
                source_id: p.source_id.clone(),
                scores,
            })
            .collect();
        Ok(self.policy.decide(claim, &passage_scores))
    }

    /// Fingerprint of everything that shapes the verdict for `claim`.
    pub fn fingerprint(
        &self,
        claim: &Claim,
        evidence: &[EvidencePassage],
    ) -> Result<Fingerprint, serde_json::Error> {
        Fingerprint::of(&VerificationParams {
            claim_id: &claim.id,
            claim: &claim.text,
            evidence: evidence
                .iter()
                .map(|p| (p.source_id.as_str(), p.content_hash()))
                .collect(),
            threshold: self.policy.threshold,
            epsilon: self.policy.epsilon,
            backend: self.model.id(),
        })
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("model", &self.model.id())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Read an NLI label name: `entailment`, `neutral`, `contradiction` in any
/// case, or MNLI-style `LABEL_0..2` (contradiction, neutral, entailment).
pub(crate) fn nli_slot(label: &str) -> Option<usize> {
    match label.trim().to_ascii_lowercase().as_str() {
        "entailment" | "entails" | "label_2" => Some(0),
        "neutral" | "label_1" => Some(1),
        "contradiction" | "contradicts" | "label_0" => Some(2),
        _ => None,
    }
}

/// Check a score is a usable probability.
pub(crate) fn probability(name: &str, value: f64) -> Result<f64, EntailmentError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(EntailmentError::Malformed(format!(
            "{} score {} outside [0, 1]",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::resilience::{BudgetTracker, CircuitBreaker, CircuitBreakerConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;
    use truthlayer_core::Label;

    /// Scores each premise from a fixed table keyed by premise text.
    struct TableModel {
        rows: Vec<(&'static str, NliScores)>,
        external: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EntailmentModel for TableModel {
        async fn score(
            &self,
            premises: &[String],
            _hypothesis: &str,
        ) -> Result<Vec<NliScores>, EntailmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            premises
                .iter()
                .map(|p| {
                    self.rows
                        .iter()
                        .find(|(text, _)| text == p)
                        .map(|(_, s)| *s)
                        .ok_or_else(|| EntailmentError::Malformed(format!("no row for {}", p)))
                })
                .collect()
        }

        fn id(&self) -> &str {
            "table"
        }

        fn is_external(&self) -> bool {
            self.external
        }
    }

    fn guard() -> CallGuard {
        CallGuard::new(
            2,
            CancellationToken::new(),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
            Arc::new(BudgetTracker::new(u32::MAX, u32::MAX, Vec::<String>::new())),
            RetryConfig {
                max_retries: 0,
                ..Default::default()
            },
            Duration::from_secs(5),
        )
    }

    fn verifier(rows: Vec<(&'static str, NliScores)>, external: bool) -> Verifier {
        Verifier::new(
            Arc::new(TableModel {
                rows,
                external,
                calls: AtomicUsize::new(0),
            }),
            LabelPolicy::default(),
        )
    }

    fn passage(id: &str, text: &str) -> EvidencePassage {
        EvidencePassage::new(id, text, 1.0)
    }

    #[tokio::test]
    async fn test_policy_applied_to_scores() {
        let claim = Claim::new("g", 0, "X is Y.");
        let v = verifier(
            vec![
                ("support", NliScores::new(0.9, 0.05, 0.05)),
                ("contra", NliScores::new(0.1, 0.0, 0.9)),
                ("tie", NliScores::new(0.5, 0.0, 0.5)),
            ],
            true,
        );

        let supported = v.verify(&claim, &[passage("a", "support")], &guard()).await.unwrap();
        assert_eq!(supported.label, Label::Supported);
        assert_eq!(supported.best_evidence.as_deref(), Some("a"));

        let contradicted = v.verify(&claim, &[passage("b", "contra")], &guard()).await.unwrap();
        assert_eq!(contradicted.label, Label::Contradicted);

        let tied = v.verify(&claim, &[passage("c", "tie")], &guard()).await.unwrap();
        assert_eq!(tied.label, Label::Unverifiable);
    }

    #[tokio::test]
    async fn test_empty_evidence_skips_model() {
        let claim = Claim::new("g", 0, "X is Y.");
        let model = Arc::new(TableModel {
            rows: vec![],
            external: true,
            calls: AtomicUsize::new(0),
        });
        let v = Verifier::new(model.clone(), LabelPolicy::default());
        let verdict = v.verify(&claim, &[], &guard()).await.unwrap();
        assert_eq!(verdict.label, Label::Unverifiable);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_output_is_not_retried() {
        let claim = Claim::new("g", 0, "X is Y.");
        let v = verifier(vec![], true);
        let err = v
            .verify(&claim, &[passage("a", "unknown")], &guard())
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Backend(EntailmentError::Malformed(_))));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_local_model_ignores_cancellation() {
        let claim = Claim::new("g", 0, "X is Y.");
        let v = verifier(vec![("support", NliScores::new(0.9, 0.05, 0.05))], false);
        let guard = guard();
        guard.cancel_token().cancel();
        let verdict = v.verify(&claim, &[passage("a", "support")], &guard).await.unwrap();
        assert_eq!(verdict.label, Label::Supported);

        let external = verifier(vec![("support", NliScores::new(0.9, 0.05, 0.05))], true);
        let err = external
            .verify(&claim, &[passage("a", "support")], &guard)
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Cancelled));
    }

    #[tokio::test]
    async fn test_verdict_independent_of_passage_order() {
        let claim = Claim::new("g", 0, "X is Y.");
        let v = verifier(
            vec![
                ("one", NliScores::new(0.7, 0.2, 0.1)),
                ("two", NliScores::new(0.2, 0.1, 0.65)),
                ("three", NliScores::new(0.1, 0.8, 0.1)),
            ],
            false,
        );
        let forward = [passage("1", "one"), passage("2", "two"), passage("3", "three")];
        let backward = [passage("3", "three"), passage("2", "two"), passage("1", "one")];
        let a = v.verify(&claim, &forward, &guard()).await.unwrap();
        let b = v.verify(&claim, &backward, &guard()).await.unwrap();
        assert_eq!(a.label, b.label);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.best_evidence, b.best_evidence);
    }

    #[test]
    fn test_fingerprint_tracks_inputs() {
        let v = verifier(vec![], false);
        let claim = Claim::new("g", 0, "X is Y.");
        let evidence = [passage("a", "text")];
        let base = v.fingerprint(&claim, &evidence).unwrap();
        assert_eq!(base, v.fingerprint(&claim, &evidence).unwrap());
        assert_ne!(base, v.fingerprint(&Claim::new("g", 0, "X is Z."), &evidence).unwrap());
        assert_ne!(base, v.fingerprint(&claim, &[passage("a", "other")]).unwrap());

        let stricter = Verifier::new(
            Arc::new(TableModel {
                rows: vec![],
                external: false,
                calls: AtomicUsize::new(0),
            }),
            LabelPolicy::new(0.8, 0.05),
        );
        assert_ne!(base, stricter.fingerprint(&claim, &evidence).unwrap());
    }

    #[test]
    fn test_label_slots() {
        assert_eq!(nli_slot("ENTAILMENT"), Some(0));
        assert_eq!(nli_slot("LABEL_1"), Some(1));
        assert_eq!(nli_slot("label_0"), Some(2));
        assert_eq!(nli_slot("maybe"), None);
        assert!(probability("entailment", 1.2).is_err());
        assert!(probability("entailment", f64::NAN).is_err());
    }
}
