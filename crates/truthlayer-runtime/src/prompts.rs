//! Prompts for grounded generation and prompted entailment scoring.
//!
//! The generation prompt is split in two:
//! 1. System prompt - fixed, identical for every query
//! 2. User prompt - question plus the numbered source block
//!
//! Both feed the generation fingerprint, so editing either one changes
//! every generation cache key.

/// Per-passage character limit in the source block.
pub const PASSAGE_CHAR_LIMIT: usize = 500;

/// Answer recorded when no evidence was retrieved. No model is called.
pub const INSUFFICIENT_EVIDENCE: &str =
    "Insufficient evidence in the provided sources to answer reliably.";

/// System prompt constraining answers to the supplied sources.
pub const GROUNDED_SYSTEM_PROMPT: &str = "You are a factual assistant. Answer ONLY using the provided sources. \
Cite sources inline like [S1], [S2]. \
If information is not present in sources, say 'Insufficient evidence.'";

/// User prompt template. `{sources}` is the numbered source block.
pub const GROUNDED_USER_TEMPLATE: &str = "Question: {question}\n\nSources:\n{sources}\n\nAnswer:";

/// System prompt for the prompted entailment scorer.
pub const ENTAILMENT_SYSTEM_PROMPT: &str = r#"
You are a natural language inference classifier.

Given a PREMISE and a HYPOTHESIS, estimate how strongly the premise:
- entails the hypothesis (the hypothesis must be true if the premise is true)
- contradicts the hypothesis (the hypothesis must be false if the premise is true)
- is neutral (neither follows)

Use only the premise. Do not use outside knowledge.

Respond with a single JSON object and nothing else:
{"entailment": 0.0-1.0, "neutral": 0.0-1.0, "contradiction": 0.0-1.0}

The three scores should sum to 1.0.
"#;

/// Build the user prompt for one premise/hypothesis pair.
pub fn entailment_user_prompt(premise: &str, hypothesis: &str) -> String {
    format!("PREMISE:\n{}\n\nHYPOTHESIS:\n{}", premise, hypothesis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grounded_template_has_placeholders() {
        assert!(GROUNDED_USER_TEMPLATE.contains("{question}"));
        assert!(GROUNDED_USER_TEMPLATE.contains("{sources}"));
        assert!(GROUNDED_SYSTEM_PROMPT.contains("[S1]"));
    }

    #[test]
    fn test_entailment_prompt_requests_json() {
        assert!(ENTAILMENT_SYSTEM_PROMPT.contains("\"entailment\""));
        assert!(ENTAILMENT_SYSTEM_PROMPT.contains("\"contradiction\""));
        let user = entailment_user_prompt("The sky is blue.", "The sky is green.");
        assert!(user.starts_with("PREMISE:\nThe sky is blue."));
        assert!(user.ends_with("HYPOTHESIS:\nThe sky is green."));
    }
}
