//! Shared text patterns for claim extraction.
//!
//! Segmentation, rewriting and filtering all read from this one table so a
//! new pattern only needs to be added here.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // =========================================================================
    // CLEANUP
    // =========================================================================

    /// Inline source markers emitted by the constrained prompt: [S1], [2], [S1, S3]
    pub static ref CITATION_PATTERN: Regex = Regex::new(
        r"\s*\[(?:[Ss]?\d+)(?:\s*,\s*[Ss]?\d+)*\]"
    ).unwrap();

    /// Bullet or numbered list marker at line start
    pub static ref LIST_MARKER_PATTERN: Regex = Regex::new(
        r"^\s*(?:[-*•]|\d+[.)])\s+"
    ).unwrap();

    /// Hedging preambles that carry no factual content
    pub static ref HEDGE_PREFIX_PATTERN: Regex = Regex::new(
        r"(?i)^(?:i believe|i think|from what i recall|it'?s commonly thought|it is commonly thought|in my opinion|as far as i know)\s*,?\s*(?:that\s+)?"
    ).unwrap();

    // =========================================================================
    // NON-CLAIMS
    // =========================================================================

    /// Statements that decline to assert anything
    pub static ref NON_CLAIM_PATTERN: Regex = Regex::new(
        r"(?i)\b(?:insufficient evidence|not enough (?:information|evidence)|i (?:don't|do not) know|cannot (?:determine|answer)|unable to (?:determine|answer)|no information (?:is )?(?:available|provided))\b|^\s*(?:unknown|n/a|none)\s*\.?\s*$"
    ).unwrap();

    // =========================================================================
    // REWRITING
    // =========================================================================

    /// Verbs whose presence means a short answer is already a sentence
    pub static ref VERB_PATTERN: Regex = Regex::new(
        r"(?i)\b(?:is|are|was|were|be|been|has|have|had|did|does|do|wrote|won|became|lies|flows|contains|includes|founded|born|died|located|called|known)\b"
    ).unwrap();

    /// Sentence-initial pronoun that needs an antecedent
    pub static ref LEADING_PRONOUN_PATTERN: Regex = Regex::new(
        r"^(?P<pronoun>It|He|She|They|This|That|These|Those|Its|His|Her|Their)\b"
    ).unwrap();

    /// Leading noun phrase of a declarative sentence, up to its main verb
    pub static ref SUBJECT_PATTERN: Regex = Regex::new(
        r"^(?P<subject>(?:The |A |An )?[A-Z][\w'’-]*(?:\s+(?:of|the|and|de|von|van|[A-Z][\w'’-]*|\d+))*?)\s+(?:is|are|was|were|has|have|had|lies|flows|became|wrote|won|remains|contains)\b"
    ).unwrap();

    /// "What/Which/Who is X?" style question, capturing the topic X
    pub static ref QUESTION_TOPIC_PATTERN: Regex = Regex::new(
        r"(?i)^\s*(?:what|which|who|where)\s+(?:is|are|was|were)\s+(?P<topic>.+?)\s*\??\s*$"
    ).unwrap();

    /// "Who <predicate>?"
    pub static ref WHO_PATTERN: Regex = Regex::new(
        r"(?i)^\s*who\s+(?P<rest>.+?)\s*\??\s*$"
    ).unwrap();

    /// "When/What year was X <participle>?"
    pub static ref WHEN_PATTERN: Regex = Regex::new(
        r"(?i)^\s*(?:when|in what year|what year)\s+(?P<aux>was|were|did)\s+(?P<rest>.+?)\s*\??\s*$"
    ).unwrap();

    /// "Where is X (located)?"
    pub static ref WHERE_PATTERN: Regex = Regex::new(
        r"(?i)^\s*where\s+(?P<aux>is|are|was|were)\s+(?P<rest>.+?)\s*\??\s*$"
    ).unwrap();

    /// "What/Which is X?"
    pub static ref WHAT_PATTERN: Regex = Regex::new(
        r"(?i)^\s*(?:what|which)\s+(?P<aux>is|are|was|were)\s+(?P<rest>.+?)\s*\??\s*$"
    ).unwrap();
}

/// Remove inline citation markers.
pub fn strip_citations(text: &str) -> String {
    CITATION_PATTERN.replace_all(text, "").into_owned()
}

/// Check whether a sentence declines to assert anything.
pub fn is_non_claim(text: &str) -> bool {
    NON_CLAIM_PATTERN.is_match(text)
}

/// Check whether a sentence contains a recognised verb.
pub fn has_verb(text: &str) -> bool {
    VERB_PATTERN.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_citations() {
        assert_eq!(
            strip_citations("The Nile is long [S1]. It flows north [S1, S2]."),
            "The Nile is long. It flows north."
        );
        assert_eq!(strip_citations("No markers here"), "No markers here");
    }

    #[test]
    fn test_non_claim_detection() {
        assert!(is_non_claim("Insufficient evidence in the provided sources."));
        assert!(is_non_claim("Unknown"));
        assert!(is_non_claim("I don't know the answer"));
        assert!(!is_non_claim("The Nile is in Africa."));
        assert!(!is_non_claim("The unknown soldier is buried there."));
    }

    #[test]
    fn test_subject_capture() {
        let caps = SUBJECT_PATTERN
            .captures("The Nile River is the longest river in Africa.")
            .unwrap();
        assert_eq!(&caps["subject"], "The Nile River");

        let caps = SUBJECT_PATTERN
            .captures("Jane Austen wrote Pride and Prejudice.")
            .unwrap();
        assert_eq!(&caps["subject"], "Jane Austen");
    }

    #[test]
    fn test_question_topic() {
        let caps = QUESTION_TOPIC_PATTERN
            .captures("What is the capital of Australia?")
            .unwrap();
        assert_eq!(&caps["topic"], "the capital of Australia");
    }
}
