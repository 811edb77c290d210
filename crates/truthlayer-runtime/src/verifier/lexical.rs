//! Offline entailment model backed by the core lexical scorer.

use async_trait::async_trait;
use truthlayer_core::{LexicalEntailment, NliScores};

use super::{EntailmentError, EntailmentModel};

/// Deterministic, in-process scorer. Never gated by the call guard.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalEntailmentModel {
    scorer: LexicalEntailment,
}

impl LexicalEntailmentModel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntailmentModel for LexicalEntailmentModel {
    async fn score(
        &self,
        premises: &[String],
        hypothesis: &str,
    ) -> Result<Vec<NliScores>, EntailmentError> {
        Ok(premises
            .iter()
            .map(|p| self.scorer.score(p, hypothesis))
            .collect())
    }

    fn id(&self) -> &str {
        "lexical-v1"
    }

    fn is_external(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_one_score_per_premise() {
        let model = LexicalEntailmentModel::new();
        let scores = model
            .score(
                &[
                    "Canberra is the capital city of Australia.".to_string(),
                    "Bananas are yellow.".to_string(),
                ],
                "Canberra is the capital of Australia.",
            )
            .await
            .unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[0].entailment > scores[1].entailment);
    }
}
