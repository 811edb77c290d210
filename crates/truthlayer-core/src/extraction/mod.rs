//! Claim extraction.
//!
//! Turns a generation's free-text answer into an ordered list of atomic,
//! self-contained claims:
//!
//! 1. Citation markers are stripped and hedging preambles removed
//! 2. Short span answers ("Canberra") are expanded using the question
//! 3. Longer answers are segmented into sentences
//! 4. Leading pronouns are resolved against the previous subject; a
//!    sentence whose pronoun has no antecedent is dropped
//! 5. Questions, refusals and fragments are dropped
//! 6. Duplicates (after normalization) are removed
//!
//! Extraction is pure: the same record always yields the same claims.

pub mod patterns;
pub mod rewrite;
pub mod segment;

use std::collections::HashSet;

use crate::fingerprint::normalize_text;
use crate::types::{Claim, GenerationRecord};
use patterns::{has_verb, is_non_claim, strip_citations, HEDGE_PREFIX_PATTERN};
use serde::{Deserialize, Serialize};

/// Extraction tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Sentences with fewer words are treated as fragments
    pub min_words: usize,

    /// Verb-less answers up to this many tokens are expanded into a claim
    pub span_max_tokens: usize,

    /// Resolve leading pronouns
    pub resolve_anaphora: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_words: 3,
            span_max_tokens: 4,
            resolve_anaphora: true,
        }
    }
}

/// Decomposes generations into claims.
#[derive(Debug, Clone, Default)]
pub struct ClaimExtractor {
    config: ExtractionConfig,
}

impl ClaimExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract claims from a generation.
    ///
    /// Refused or failed generations and empty answers yield no claims.
    pub fn extract(&self, record: &GenerationRecord) -> Vec<Claim> {
        if !record.status.is_answered() {
            return Vec::new();
        }
        self.decompose(&record.question, &record.response)
            .into_iter()
            .enumerate()
            .map(|(position, text)| Claim::new(&record.id, position, text))
            .collect()
    }

    /// Decompose an answer into claim texts, in answer order.
    pub fn decompose(&self, question: &str, answer: &str) -> Vec<String> {
        let cleaned = strip_citations(answer);
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return Vec::new();
        }

        if self.is_span(cleaned) {
            if is_non_claim(cleaned) {
                return Vec::new();
            }
            return vec![rewrite::claimify(question, cleaned)];
        }

        let sentences: Vec<String> = segment::split_sentences(cleaned)
            .into_iter()
            .map(|s| HEDGE_PREFIX_PATTERN.replace(&s, "").trim().to_string())
            .map(|s| capitalize_first(&s))
            .collect();

        let sentences = if self.config.resolve_anaphora {
            rewrite::resolve_anaphora(question, sentences)
        } else {
            sentences
        };

        let mut seen = HashSet::new();
        sentences
            .into_iter()
            .filter(|s| self.is_claim(s))
            .filter(|s| seen.insert(normalize_text(s)))
            .collect()
    }

    fn is_span(&self, text: &str) -> bool {
        let tokens = text.split_whitespace().count();
        tokens <= self.config.span_max_tokens && !has_verb(text)
    }

    fn is_claim(&self, sentence: &str) -> bool {
        if sentence.trim_end().ends_with('?') {
            return false;
        }
        if is_non_claim(sentence) {
            return false;
        }
        sentence.split_whitespace().count() >= self.config.min_words
    }
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenerationStatus;
    use chrono::Utc;

    fn record(question: &str, response: &str, status: GenerationStatus) -> GenerationRecord {
        GenerationRecord {
            id: "gen1".to_string(),
            query_id: "q1".to_string(),
            question: question.to_string(),
            model_id: "m".to_string(),
            sample: 0,
            evidence_window: vec![],
            truncation: None,
            response: response.to_string(),
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_multi_sentence_answer() {
        let extractor = ClaimExtractor::default();
        let claims = extractor.extract(&record(
            "Tell me about the Nile.",
            "The Nile is the longest river in Africa [S1]. It flows north into the Mediterranean [S2].",
            GenerationStatus::Answered,
        ));
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[0].text, "The Nile is the longest river in Africa.");
        assert_eq!(claims[1].text, "The Nile flows north into the Mediterranean.");
        assert_eq!(claims[1].id, "gen1:1");
        assert_eq!(claims[1].position, 1);
    }

    #[test]
    fn test_span_answer_is_claimified() {
        let extractor = ClaimExtractor::default();
        let claims = extractor.extract(&record(
            "What is the capital of Australia?",
            "Canberra",
            GenerationStatus::Answered,
        ));
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].text, "The capital of Australia is Canberra.");
    }

    #[test]
    fn test_refused_and_empty_yield_nothing() {
        let extractor = ClaimExtractor::default();
        let refused = record(
            "q?",
            "",
            GenerationStatus::Refused {
                reason: "policy".to_string(),
            },
        );
        assert!(extractor.extract(&refused).is_empty());
        assert!(extractor
            .extract(&record("q?", "   ", GenerationStatus::Answered))
            .is_empty());
        assert!(extractor
            .extract(&record("q?", "Insufficient evidence.", GenerationStatus::Answered))
            .is_empty());
    }

    #[test]
    fn test_questions_fragments_and_duplicates_dropped() {
        let extractor = ClaimExtractor::default();
        let claims = extractor.decompose(
            "Tell me about Paris.",
            "Paris is the capital of France. Is it big? Yes. Paris is the capital of France!",
        );
        assert_eq!(claims, vec!["Paris is the capital of France."]);
    }

    #[test]
    fn test_dangling_pronoun_is_not_a_claim() {
        let extractor = ClaimExtractor::default();
        let claims = extractor.decompose(
            "Tell me about rivers.",
            "It is very long. The Nile is in Africa.",
        );
        assert_eq!(claims, vec!["The Nile is in Africa."]);
    }

    #[test]
    fn test_hedge_prefix_removed() {
        let extractor = ClaimExtractor::default();
        let claims = extractor.decompose(
            "Who wrote Hamlet?",
            "I believe that William Shakespeare wrote Hamlet around 1600.",
        );
        assert_eq!(claims, vec!["William Shakespeare wrote Hamlet around 1600."]);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = ClaimExtractor::default();
        let rec = record(
            "Tell me about the Amazon.",
            "The Amazon is in South America. It carries more water than any other river.",
            GenerationStatus::Answered,
        );
        assert_eq!(extractor.extract(&rec), extractor.extract(&rec));
    }
}
