//! Deterministic lexical entailment scorer.
//!
//! A cheap, offline stand-in for an NLI model. Entailment grows with the
//! share of the claim's content words found in the passage; contradiction
//! fires on explicit cues in the passage sentence that best matches the
//! claim:
//!
//! - negation present on one side only
//! - numbers in the claim that the passage states differently
//! - a superlative in the claim met by a comparative pointing the other way
//!   ("longest" vs "shorter than")
//! - antonym pairs ("north" vs "south")
//!
//! Cues only count once the passage is clearly about the claim (coverage
//! at least 0.3), so unrelated passages stay neutral.

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;

use crate::extraction::segment::split_sentences;
use crate::types::NliScores;

lazy_static! {
    /// Thousands separators inside numbers: 6,650 -> 6650
    static ref DIGIT_GROUP_PATTERN: Regex = Regex::new(r"(\d),(\d)").unwrap();

    /// Contracted negation: isn't -> is not
    static ref CONTRACTED_NOT_PATTERN: Regex = Regex::new(r"(?i)n['’]t\b").unwrap();

    static ref TOKEN_PATTERN: Regex = Regex::new(r"[\p{L}\p{N}]+(?:\.\d+)?").unwrap();

    static ref NUMBER_PATTERN: Regex = Regex::new(r"^\d+(?:\.\d+)?$").unwrap();
}

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "of", "in", "on",
    "at", "to", "for", "by", "with", "from", "as", "and", "or", "that", "this", "it", "its",
    "which", "who", "whom", "has", "have", "had", "do", "does", "did", "there", "their",
    "than", "into", "about", "also", "one", "s",
];

const NEGATIONS: &[&str] = &["not", "no", "never", "neither", "nor", "none", "cannot"];

/// (superlative, comparatives that deny it)
const SUPERLATIVE_CONFLICTS: &[(&str, &[&str])] = &[
    ("longest", &["shorter", "second"]),
    ("largest", &["smaller", "second"]),
    ("biggest", &["smaller", "second"]),
    ("tallest", &["shorter", "second"]),
    ("highest", &["lower", "second"]),
    ("oldest", &["younger", "newer", "second"]),
    ("smallest", &["larger", "bigger", "second"]),
    ("shortest", &["longer", "second"]),
    ("first", &["second", "after"]),
];

const ANTONYMS: &[(&str, &str)] = &[
    ("north", "south"),
    ("east", "west"),
    ("true", "false"),
    ("before", "after"),
    ("increase", "decrease"),
    ("won", "lost"),
    ("alive", "dead"),
    ("larger", "smaller"),
    ("longer", "shorter"),
];

const NEGATION_CUE: f64 = 0.9;
const NUMBER_CUE: f64 = 0.8;
const SUPERLATIVE_CUE: f64 = 0.9;
const ANTONYM_CUE: f64 = 0.7;
const CUE_MIN_COVERAGE: f64 = 0.3;
const FULL_COVERAGE_ENTAILMENT: f64 = 0.95;

/// Lexical overlap entailment scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalEntailment;

impl LexicalEntailment {
    pub fn new() -> Self {
        Self
    }

    /// Score `premise` (an evidence passage) against `hypothesis` (a claim).
    pub fn score(&self, premise: &str, hypothesis: &str) -> NliScores {
        let hyp = Analysis::of(hypothesis);
        if hyp.content.is_empty() {
            return NliScores::new(0.0, 1.0, 0.0);
        }

        let whole = Analysis::of(premise);
        let coverage_all = hyp.coverage_in(&whole);

        // Cues are judged against the single most relevant sentence.
        let best_sentence = split_sentences(premise)
            .iter()
            .map(|s| Analysis::of(s))
            .fold(None::<(f64, Analysis)>, |best, candidate| {
                let cov = hyp.coverage_in(&candidate);
                match best {
                    Some((best_cov, _)) if best_cov >= cov => best,
                    _ => Some((cov, candidate)),
                }
            });

        let cue = match &best_sentence {
            Some((cov, sentence)) if *cov >= CUE_MIN_COVERAGE => {
                contradiction_cue(&hyp, sentence).map(|c| (c, *cov))
            }
            _ => None,
        };

        let (entailment, contradiction) = match cue {
            Some((strength, cov)) => (0.1 * coverage_all, strength * (0.5 + 0.5 * cov)),
            None if coverage_all >= 1.0 => (FULL_COVERAGE_ENTAILMENT, 0.0),
            None => (FULL_COVERAGE_ENTAILMENT * coverage_all * coverage_all, 0.0),
        };

        let neutral = (1.0 - entailment - contradiction).max(0.0);
        NliScores::new(entailment, neutral, contradiction)
    }
}

/// Tokenized view of a text.
#[derive(Debug, Clone, Default)]
struct Analysis {
    /// Stemmed content words
    content: BTreeSet<String>,
    /// All lowercase tokens, stopwords included
    all: BTreeSet<String>,
    numbers: BTreeSet<String>,
    negated: bool,
}

impl Analysis {
    fn of(text: &str) -> Self {
        let text = DIGIT_GROUP_PATTERN.replace_all(text, "$1$2");
        let text = CONTRACTED_NOT_PATTERN.replace_all(&text, " not");
        let lowered = text.to_lowercase();

        let mut analysis = Analysis::default();
        for m in TOKEN_PATTERN.find_iter(&lowered) {
            let token = m.as_str();
            analysis.all.insert(token.to_string());
            if NEGATIONS.contains(&token) {
                analysis.negated = true;
                continue;
            }
            if NUMBER_PATTERN.is_match(token) {
                analysis.numbers.insert(token.to_string());
            }
            if !STOPWORDS.contains(&token) {
                analysis.content.insert(stem(token));
            }
        }
        analysis
    }

    fn coverage_in(&self, premise: &Analysis) -> f64 {
        if self.content.is_empty() {
            return 0.0;
        }
        let hits = self.content.intersection(&premise.content).count();
        hits as f64 / self.content.len() as f64
    }

    fn has(&self, word: &str) -> bool {
        self.all.contains(word)
    }
}

/// Stemmed content words of `text`, stopwords and negations removed.
pub fn content_terms(text: &str) -> BTreeSet<String> {
    Analysis::of(text).content
}

fn stem(token: &str) -> String {
    if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

fn contradiction_cue(hyp: &Analysis, premise: &Analysis) -> Option<f64> {
    let mut strength: Option<f64> = None;
    let mut raise = |value: f64| {
        strength = Some(strength.map_or(value, |s: f64| s.max(value)));
    };

    if hyp.negated != premise.negated {
        raise(NEGATION_CUE);
    }

    if !hyp.numbers.is_empty()
        && !premise.numbers.is_empty()
        && hyp.numbers.is_disjoint(&premise.numbers)
    {
        raise(NUMBER_CUE);
    }

    for (superlative, deniers) in SUPERLATIVE_CONFLICTS {
        if hyp.has(superlative) && deniers.iter().any(|d| premise.has(d) && !hyp.has(d)) {
            raise(SUPERLATIVE_CUE);
        }
    }

    for (left, right) in ANTONYMS {
        let flipped = (hyp.has(left) && premise.has(right) && !premise.has(left))
            || (hyp.has(right) && premise.has(left) && !premise.has(right));
        if flipped {
            raise(ANTONYM_CUE);
        }
    }

    strength
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label_of(scores: NliScores) -> &'static str {
        if scores.entailment >= 0.6 && scores.entailment > scores.contradiction {
            "entail"
        } else if scores.contradiction >= 0.6 {
            "contradict"
        } else {
            "neutral"
        }
    }

    #[test]
    fn test_nile_is_contradicted() {
        let scores = LexicalEntailment::new().score(
            "The Nile is 6,650 km long, slightly shorter than the Amazon River.",
            "The Nile is the longest river in the world.",
        );
        assert_eq!(label_of(scores), "contradict");
        assert!(scores.contradiction > scores.entailment);
    }

    #[test]
    fn test_full_overlap_entails() {
        let scores = LexicalEntailment::new().score(
            "Canberra is the capital city of Australia, located in the ACT.",
            "The capital of Australia is Canberra.",
        );
        assert_eq!(label_of(scores), "entail");
    }

    #[test]
    fn test_unrelated_passage_is_neutral() {
        let scores = LexicalEntailment::new().score(
            "Photosynthesis converts light into chemical energy.",
            "The capital of Australia is Canberra.",
        );
        assert_eq!(label_of(scores), "neutral");
        assert_eq!(scores.contradiction, 0.0);
    }

    #[test]
    fn test_negation_mismatch_contradicts() {
        let scores = LexicalEntailment::new().score(
            "Pluto is not classified as a planet.",
            "Pluto is classified as a planet.",
        );
        assert_eq!(label_of(scores), "contradict");
    }

    #[test]
    fn test_number_mismatch_contradicts() {
        let scores = LexicalEntailment::new().score(
            "Cornell University was founded in 1865.",
            "Cornell University was founded in 1870.",
        );
        assert_eq!(label_of(scores), "contradict");
    }

    #[test]
    fn test_cue_in_other_sentence_ignored() {
        let scores = LexicalEntailment::new().score(
            "Canberra is the capital of Australia. Sydney is not the capital.",
            "Canberra is the capital of Australia.",
        );
        assert_eq!(label_of(scores), "entail");
    }

    #[test]
    fn test_scores_are_bounded() {
        let scores = LexicalEntailment::new().score("x", "");
        assert_eq!(scores, NliScores::new(0.0, 1.0, 0.0));
        let s = LexicalEntailment::new().score(
            "The Nile is not the longest river; it is shorter than 7000 km.",
            "The Nile is the longest river at 6650 km.",
        );
        assert!(s.entailment + s.neutral + s.contradiction <= 1.0 + 1e-9);
    }
}
