//! Rewriting sentences into self-contained claims.
//!
//! Two rewrites are applied: sentence-initial pronouns are replaced with the
//! most recent explicit subject, and short span answers are expanded into a
//! declarative sentence using the question.

use super::patterns::{
    LEADING_PRONOUN_PATTERN, QUESTION_TOPIC_PATTERN, SUBJECT_PATTERN, WHAT_PATTERN,
    WHEN_PATTERN, WHERE_PATTERN, WHO_PATTERN,
};

/// Replace leading pronouns with the last explicit subject.
///
/// The question's topic seeds the subject so that an answer opening with
/// "It" still resolves. Sentences whose pronoun has no antecedent are
/// dropped: they cannot be checked on their own.
pub fn resolve_anaphora(question: &str, sentences: Vec<String>) -> Vec<String> {
    let mut subject = question_topic(question);

    sentences
        .into_iter()
        .filter_map(|sentence| {
            let resolved = match (&subject, LEADING_PRONOUN_PATTERN.captures(&sentence)) {
                (None, Some(_)) => {
                    tracing::debug!(sentence = %sentence, "Dropping sentence with unresolved pronoun");
                    return None;
                }
                (Some(antecedent), Some(caps)) => {
                    let pronoun = &caps["pronoun"];
                    let rest = &sentence[pronoun.len()..];
                    let replacement = match pronoun {
                        "Its" | "His" | "Her" | "Their" => format!("{}'s", antecedent),
                        _ => antecedent.clone(),
                    };
                    format!("{}{}", replacement, rest)
                }
                _ => sentence,
            };

            if let Some(caps) = SUBJECT_PATTERN.captures(&resolved) {
                let candidate = &caps["subject"];
                if !LEADING_PRONOUN_PATTERN.is_match(candidate) {
                    subject = Some(candidate.to_string());
                }
            }
            Some(resolved)
        })
        .collect()
}

/// Expand a short span answer into a declarative claim.
pub fn claimify(question: &str, answer: &str) -> String {
    let answer = answer.trim().trim_end_matches(['.', '!']).trim();

    if let Some(caps) = WHO_PATTERN.captures(question) {
        return finish(format!("{} {}", answer, &caps["rest"]));
    }

    if let Some(caps) = WHEN_PATTERN.captures(question) {
        let aux = caps["aux"].to_lowercase();
        let rest = &caps["rest"];
        return match rest.rsplit_once(' ') {
            Some((head, verb)) if aux != "did" => {
                finish(format!("{} {} {} in {}", head, aux, verb, answer))
            }
            Some((head, verb)) => finish(format!("{} {} in {}", head, past_tense(verb), answer)),
            None => fallback(question, answer),
        };
    }

    if let Some(caps) = WHERE_PATTERN.captures(question) {
        let aux = caps["aux"].to_lowercase();
        let rest = &caps["rest"];
        return match rest.rsplit_once(' ') {
            Some((head, last)) if is_participle(last) => {
                finish(format!("{} {} {} in {}", head, aux, last, answer))
            }
            _ => finish(format!("{} {} in {}", rest, aux, answer)),
        };
    }

    if let Some(caps) = WHAT_PATTERN.captures(question) {
        let aux = caps["aux"].to_lowercase();
        return finish(format!("{} {} {}", &caps["rest"], aux, answer));
    }

    fallback(question, answer)
}

fn fallback(question: &str, answer: &str) -> String {
    format!("The answer to \"{}\" is {}.", question.trim(), answer)
}

fn question_topic(question: &str) -> Option<String> {
    QUESTION_TOPIC_PATTERN
        .captures(question)
        .map(|caps| capitalize(&caps["topic"]))
}

fn is_participle(word: &str) -> bool {
    word.ends_with("ed") || matches!(word, "born" | "found" | "built" | "held")
}

fn past_tense(verb: &str) -> String {
    if verb.ends_with('e') {
        format!("{}d", verb)
    } else {
        format!("{}ed", verb)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn finish(s: String) -> String {
    let s = capitalize(s.trim());
    if s.ends_with(['.', '!', '?']) {
        s
    } else {
        format!("{}.", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pronoun_resolves_to_previous_subject() {
        let out = resolve_anaphora(
            "Tell me about the Nile.",
            strings(&["The Nile is in Africa.", "It flows north.", "Its delta is fertile."]),
        );
        assert_eq!(out[1], "The Nile flows north.");
        assert_eq!(out[2], "The Nile's delta is fertile.");
    }

    #[test]
    fn test_question_topic_seeds_subject() {
        let out = resolve_anaphora(
            "What is the capital of Australia?",
            strings(&["It is Canberra."]),
        );
        assert_eq!(out[0], "The capital of Australia is Canberra.");
    }

    #[test]
    fn test_unresolvable_pronoun_dropped() {
        let out = resolve_anaphora("Tell me something.", strings(&["It is raining."]));
        assert!(out.is_empty());

        // A later explicit subject still resolves what follows it.
        let out = resolve_anaphora(
            "Tell me something.",
            strings(&["It is raining.", "The Thames is in London.", "It floods often."]),
        );
        assert_eq!(out, strings(&["The Thames is in London.", "The Thames floods often."]));
    }

    #[test]
    fn test_claimify_question_shapes() {
        assert_eq!(
            claimify("Who wrote Pride and Prejudice?", "Jane Austen"),
            "Jane Austen wrote Pride and Prejudice."
        );
        assert_eq!(
            claimify("When was Cornell University founded?", "1865"),
            "Cornell University was founded in 1865."
        );
        assert_eq!(
            claimify("What is the capital of Australia?", "Canberra."),
            "The capital of Australia is Canberra."
        );
        assert_eq!(
            claimify("Where is the Eiffel Tower located?", "Paris"),
            "The Eiffel Tower is located in Paris."
        );
    }

    #[test]
    fn test_claimify_fallback() {
        assert_eq!(
            claimify("How many moons does Mars have?", "2"),
            "The answer to \"How many moons does Mars have?\" is 2."
        );
    }
}
