//! Ranking and deduplication of retrieved evidence.
//!
//! Backends return passages in whatever order they like. Before anything
//! downstream sees them, passages are cleaned, filtered by a relevance
//! floor, deduplicated by normalized text hash and ordered by descending
//! score. The ordering is stable: ties keep the backend's rank.

use std::collections::HashSet;

use crate::fingerprint::text_hash;
use crate::types::EvidencePassage;

/// Collapse runs of whitespace and trim.
pub fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Rank raw backend passages into at most `k` deduplicated passages.
///
/// Passages scoring below `min_relevance`, with NaN scores, or with empty
/// text are dropped. A passage is a duplicate when a higher-ranked one has
/// the same normalized text or the same source id; only the first is kept.
/// An empty result is a valid outcome, not an error.
pub fn rank_passages(
    raw: Vec<EvidencePassage>,
    k: usize,
    min_relevance: f64,
) -> Vec<EvidencePassage> {
    let mut candidates: Vec<EvidencePassage> = raw
        .into_iter()
        .filter(|p| !p.score.is_nan() && p.score >= min_relevance)
        .map(|mut p| {
            p.text = clean_text(&p.text);
            p
        })
        .filter(|p| !p.text.is_empty())
        .collect();

    // Stable sort keeps backend rank for equal scores.
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut seen_text = HashSet::new();
    let mut seen_source = HashSet::new();
    candidates
        .into_iter()
        .filter(|p| {
            let hash = text_hash(&p.text);
            if seen_text.contains(&hash) || seen_source.contains(&p.source_id) {
                return false;
            }
            seen_text.insert(hash);
            seen_source.insert(p.source_id.clone());
            true
        })
        .take(k)
        .collect()
}

/// Shorten `text` to at most `width` characters on a word boundary,
/// appending an ellipsis. Returns `None` when no shortening was needed.
pub fn shorten(text: &str, width: usize) -> Option<String> {
    if text.chars().count() <= width {
        return None;
    }
    let budget = width.saturating_sub(1);
    let cut: String = text.chars().take(budget).collect();
    let trimmed = match cut.rfind(' ') {
        Some(idx) if idx > 0 => &cut[..idx],
        _ => cut.as_str(),
    };
    Some(format!("{}…", trimmed.trim_end()))
}
