//! Verdict label policy.
//!
//! Reduces per-passage entailment scores to one label with fixed rules:
//! 1. No evidence → UNVERIFIABLE
//! 2. Support and contradiction within epsilon of each other → UNVERIFIABLE
//! 3. Support clears the threshold and beats contradiction → SUPPORTED
//! 4. Contradiction clears the threshold and beats support → CONTRADICTED
//! 5. Else → UNVERIFIABLE
//!
//! Only the maxima over passages matter, so the outcome does not depend on
//! passage order or batching.

use serde::{Deserialize, Serialize};

use crate::types::{Claim, Label, PassageScore, Verdict};

/// Default confidence threshold τ.
pub const DEFAULT_THRESHOLD: f64 = 0.60;

/// Default ambiguity band.
pub const DEFAULT_EPSILON: f64 = 0.05;

/// Applies the labeling rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelPolicy {
    pub threshold: f64,
    pub epsilon: f64,
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl LabelPolicy {
    pub fn new(threshold: f64, epsilon: f64) -> Self {
        Self { threshold, epsilon }
    }

    /// Decide the label from maximum support and contradiction.
    pub fn label(&self, support: f64, contradict: f64) -> Label {
        if (support - contradict).abs() <= self.epsilon {
            return Label::Unverifiable;
        }
        if support >= self.threshold && support > contradict {
            return Label::Supported;
        }
        if contradict >= self.threshold && contradict > support {
            return Label::Contradicted;
        }
        Label::Unverifiable
    }

    /// Produce the verdict for `claim` given scores for every passage.
    pub fn decide(&self, claim: &Claim, scores: &[PassageScore]) -> Verdict {
        let mut evidence_ids: Vec<String> = scores.iter().map(|s| s.source_id.clone()).collect();
        evidence_ids.sort();

        if scores.is_empty() {
            return Verdict {
                claim_id: claim.id.clone(),
                claim: claim.text.clone(),
                evidence_ids,
                label: Label::Unverifiable,
                confidence: 1.0,
                max_entail: 0.0,
                max_contradict: 0.0,
                best_evidence: None,
                error: None,
                placeholder: false,
            };
        }

        let best_entail = argmax(scores, |s| s.scores.entailment);
        let best_contradict = argmax(scores, |s| s.scores.contradiction);
        let max_entail = best_entail.map_or(0.0, |s| s.scores.entailment);
        let max_contradict = best_contradict.map_or(0.0, |s| s.scores.contradiction);

        let label = self.label(max_entail, max_contradict);
        let (confidence, best) = match label {
            Label::Supported => (max_entail, best_entail),
            Label::Contradicted => (max_contradict, best_contradict),
            _ => {
                let best = if max_entail >= max_contradict {
                    best_entail
                } else {
                    best_contradict
                };
                (1.0 - max_entail.max(max_contradict), best)
            }
        };

        Verdict {
            claim_id: claim.id.clone(),
            claim: claim.text.clone(),
            evidence_ids,
            label,
            confidence: confidence.clamp(0.0, 1.0),
            max_entail,
            max_contradict,
            best_evidence: best.map(|s| s.source_id.clone()),
            error: None,
            placeholder: false,
        }
    }
}

/// Highest-scoring passage; ties go to the smallest source id so the result
/// is independent of input order.
fn argmax<F>(scores: &[PassageScore], key: F) -> Option<&PassageScore>
where
    F: Fn(&PassageScore) -> f64,
{
    scores.iter().filter(|s| !key(s).is_nan()).fold(None, |best, s| match best {
        None => Some(s),
        Some(b) => {
            let (ks, kb) = (key(s), key(b));
            if ks > kb || (ks == kb && s.source_id < b.source_id) {
                Some(s)
            } else {
                Some(b)
            }
        }
    })
}
