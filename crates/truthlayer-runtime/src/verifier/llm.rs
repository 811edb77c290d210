//! Prompted entailment scoring with a chat model.
//!
//! The model is asked for `{"entailment", "neutral", "contradiction"}` as
//! JSON. Code fences and surrounding prose are tolerated; anything else is
//! a malformed output and fails the claim without a retry.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use truthlayer_core::NliScores;

use super::{probability, EntailmentError, EntailmentModel};
use crate::prompts::{entailment_user_prompt, ENTAILMENT_SYSTEM_PROMPT};
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider};
use crate::resilience::BudgetTracker;

/// Entailment model that prompts an [`LlmProvider`].
pub struct LlmEntailment {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    id: String,
    scope: String,
    budgets: Option<Arc<BudgetTracker>>,
}

#[derive(Debug, Deserialize)]
struct RawScores {
    entailment: f64,
    #[serde(default)]
    neutral: Option<f64>,
    contradiction: f64,
}

impl LlmEntailment {
    /// `scope` names the model entry used for budgets and the circuit
    /// breaker.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        scope: impl Into<String>,
        completion: CompletionConfig,
    ) -> Self {
        let scope = scope.into();
        Self {
            id: format!("llm:{}:{}", scope, completion.model),
            provider,
            completion,
            scope,
            budgets: None,
        }
    }

    /// Record token usage against `budgets`.
    pub fn with_budgets(mut self, budgets: Arc<BudgetTracker>) -> Self {
        self.budgets = Some(budgets);
        self
    }

    async fn score_one(&self, premise: &str, hypothesis: &str) -> Result<NliScores, EntailmentError> {
        let messages = vec![
            ChatMessage::system(ENTAILMENT_SYSTEM_PROMPT),
            ChatMessage::user(entailment_user_prompt(premise, hypothesis)),
        ];
        let response = self.provider.complete(messages, &self.completion).await?;
        if let Some(budgets) = &self.budgets {
            budgets.record_usage(&self.scope, &response.usage, &self.completion.model);
        }
        if let Some(reason) = response.refusal {
            return Err(EntailmentError::Malformed(format!("scorer refused: {}", reason)));
        }
        parse_scores(&response.content)
    }
}

/// Parse the scorer's JSON reply.
pub(crate) fn parse_scores(content: &str) -> Result<NliScores, EntailmentError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let body = match (start, end) {
        (Some(s), Some(e)) if s < e => &content[s..=e],
        _ => {
            return Err(EntailmentError::Malformed(format!(
                "no JSON object in '{}'",
                content.trim()
            )))
        }
    };

    let raw: RawScores =
        serde_json::from_str(body).map_err(|e| EntailmentError::Malformed(e.to_string()))?;
    let entailment = probability("entailment", raw.entailment)?;
    let contradiction = probability("contradiction", raw.contradiction)?;
    let neutral = match raw.neutral {
        Some(n) => probability("neutral", n)?,
        None => (1.0 - entailment - contradiction).max(0.0),
    };
    Ok(NliScores::new(entailment, neutral, contradiction))
}

#[async_trait]
impl EntailmentModel for LlmEntailment {
    async fn score(
        &self,
        premises: &[String],
        hypothesis: &str,
    ) -> Result<Vec<NliScores>, EntailmentError> {
        let mut scores = Vec::with_capacity(premises.len());
        for premise in premises {
            scores.push(self.score_one(premise, hypothesis).await?);
        }
        Ok(scores)
    }

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ScriptedProvider, ScriptedReply};

    #[test]
    fn test_parse_plain_and_fenced() {
        let plain = parse_scores(r#"{"entailment": 0.8, "neutral": 0.15, "contradiction": 0.05}"#)
            .unwrap();
        assert_eq!(plain, NliScores::new(0.8, 0.15, 0.05));

        let fenced = parse_scores(
            "Here you go:\n```json\n{\"entailment\": 0.1, \"contradiction\": 0.7}\n```",
        )
        .unwrap();
        assert_eq!(fenced.contradiction, 0.7);
        assert!((fenced.neutral - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_scores("entailed"), Err(EntailmentError::Malformed(_))));
        assert!(matches!(
            parse_scores(r#"{"entailment": "high", "contradiction": 0}"#),
            Err(EntailmentError::Malformed(_))
        ));
        assert!(matches!(
            parse_scores(r#"{"entailment": 1.5, "contradiction": 0}"#),
            Err(EntailmentError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_scores_each_premise_and_records_usage() {
        let provider = Arc::new(
            ScriptedProvider::new(
                "judge",
                ScriptedReply::Answer(
                    r#"{"entailment": 0.1, "neutral": 0.8, "contradiction": 0.1}"#.to_string(),
                ),
            )
            .with_rule(
                "PREMISE:\nCanberra",
                ScriptedReply::Answer(
                    r#"{"entailment": 0.9, "neutral": 0.05, "contradiction": 0.05}"#.to_string(),
                ),
            ),
        );
        let budgets = Arc::new(BudgetTracker::new(10_000, 10_000, ["judge"]));
        let model = LlmEntailment::new(
            provider.clone(),
            "judge",
            CompletionConfig {
                model: "scripted-judge".to_string(),
                ..Default::default()
            },
        )
        .with_budgets(budgets.clone());

        let scores = model
            .score(
                &["Canberra is the capital.".to_string(), "Bananas.".to_string()],
                "The capital is Canberra.",
            )
            .await
            .unwrap();
        assert_eq!(scores[0].entailment, 0.9);
        assert_eq!(scores[1].neutral, 0.8);
        assert_eq!(provider.calls(), 2);
        assert_eq!(budgets.usage()["judge"].calls, 2);
        assert_eq!(model.id(), "llm:judge:scripted-judge");
    }

    #[tokio::test]
    async fn test_refusal_is_malformed() {
        let provider = Arc::new(ScriptedProvider::new(
            "judge",
            ScriptedReply::Refuse("safety".to_string()),
        ));
        let model = LlmEntailment::new(provider, "judge", CompletionConfig::default());
        let err = model.score(&["p".to_string()], "h").await.unwrap_err();
        assert!(matches!(err, EntailmentError::Malformed(_)));
        assert!(!err.is_transient());
    }
}
