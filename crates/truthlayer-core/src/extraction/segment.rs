//! Sentence segmentation.

use super::patterns::LIST_MARKER_PATTERN;

/// Tokens that end with a period without ending a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "st", "jr", "sr", "vs", "etc", "e.g", "i.e", "inc",
    "ltd", "co", "no", "u.s", "u.k", "approx", "ca", "mt", "ft", "gen", "col", "lt",
];

/// Split free text into sentences.
///
/// Lines and list items are segmented independently, then each line is cut
/// at terminal punctuation followed by whitespace and an uppercase letter,
/// digit, or opening quote. Abbreviations and single-letter initials do not
/// end a sentence. Semicolon-joined clauses become separate sentences.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    for line in text.lines() {
        let line = LIST_MARKER_PATTERN.replace(line, "");
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        for sentence in split_line(line) {
            for clause in sentence.split("; ") {
                let clause = clause.trim();
                if !clause.is_empty() {
                    sentences.push(clause.to_string());
                }
            }
        }
    }
    sentences
}

fn split_line(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if matches!(c, '.' | '!' | '?') {
            // Absorb closing quotes and brackets after the terminator.
            let mut end = i + 1;
            while end < chars.len() && matches!(chars[end], '"' | '\'' | '”' | '’' | ')') {
                end += 1;
            }
            let followed_by_break = end < chars.len()
                && chars[end].is_whitespace()
                && next_non_space(&chars, end)
                    .map(|n| n.is_uppercase() || n.is_ascii_digit() || matches!(n, '"' | '“'))
                    .unwrap_or(false);

            if followed_by_break && !(c == '.' && ends_with_abbreviation(&chars[start..i])) {
                out.push(chars[start..end].iter().collect::<String>().trim().to_string());
                start = end;
            }
            i = end;
            continue;
        }
        i += 1;
    }

    let tail: String = chars[start..].iter().collect();
    if !tail.trim().is_empty() {
        out.push(tail.trim().to_string());
    }
    out
}

fn next_non_space(chars: &[char], from: usize) -> Option<char> {
    chars[from..].iter().copied().find(|c| !c.is_whitespace())
}

fn ends_with_abbreviation(before: &[char]) -> bool {
    let word: String = before
        .iter()
        .rev()
        .take_while(|c| !c.is_whitespace())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let word = word.trim_start_matches(['(', '"', '“']);

    // Initials such as the "J" in "J. K. Rowling".
    if word.chars().count() == 1 && word.chars().all(char::is_uppercase) {
        return true;
    }
    ABBREVIATIONS.contains(&word.to_lowercase().as_str())
}
