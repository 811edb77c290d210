//! Evidence retrieval.
//!
//! A [`SearchBackend`] answers `search(query_text, corpus_id, k)` with raw
//! passages in its own order. The [`Retriever`] turns that into the
//! pipeline's evidence list: cleaned, floored, deduplicated by normalized
//! text hash and sorted by descending score. No matches is an empty list,
//! never an error.

mod memory;
#[cfg(feature = "wikipedia")]
mod wikipedia;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use truthlayer_core::{rank_passages, EvidencePassage, Fingerprint};

use crate::config::RetrievalConfig;

pub use memory::{CorpusDocument, InMemoryCorpus};
#[cfg(feature = "wikipedia")]
pub use wikipedia::WikipediaSearch;

/// Errors from search backends.
#[derive(Error, Debug, Clone)]
pub enum SearchError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Search API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Unexpected search response: {0}")]
    ParseError(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Unknown corpus '{0}'")]
    UnknownCorpus(String),

    #[error("Corpus load failed: {0}")]
    Corpus(String),
}

impl SearchError {
    /// Whether retrying the same search may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::HttpError(_) | SearchError::RateLimited | SearchError::Timeout(_) => {
                true
            }
            SearchError::ApiError { status, .. } => *status >= 500 || *status == 408,
            _ => false,
        }
    }
}

impl crate::resilience::Transient for SearchError {
    fn is_transient(&self) -> bool {
        SearchError::is_transient(self)
    }

    fn timed_out(after: Duration) -> Self {
        SearchError::Timeout(after)
    }
}

/// Query interface of an external search service.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Up to `k` passages for `query_text` from `corpus_id`, best first.
    async fn search(
        &self,
        query_text: &str,
        corpus_id: &str,
        k: usize,
    ) -> Result<Vec<EvidencePassage>, SearchError>;

    /// Backend name, used as the circuit breaker scope.
    fn name(&self) -> &str;
}

#[derive(Serialize)]
struct RetrievalParams<'a> {
    backend: &'a str,
    query: &'a str,
    corpus: &'a str,
    k: usize,
    min_relevance: f64,
}

/// Ranked, deduplicated evidence on top of a search backend.
#[derive(Clone)]
pub struct Retriever {
    backend: Arc<dyn SearchBackend>,
    min_relevance: f64,
}

impl Retriever {
    pub fn new(backend: Arc<dyn SearchBackend>, min_relevance: f64) -> Self {
        Self {
            backend,
            min_relevance,
        }
    }

    pub fn from_config(backend: Arc<dyn SearchBackend>, config: &RetrievalConfig) -> Self {
        Self::new(backend, config.min_relevance)
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// At most `k` passages, deduplicated and sorted by descending score.
    ///
    /// The backend is asked for `2k` candidates so duplicates do not starve
    /// the window.
    pub async fn retrieve(
        &self,
        query_text: &str,
        k: usize,
        corpus: &str,
    ) -> Result<Vec<EvidencePassage>, SearchError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let raw = self
            .backend
            .search(query_text, corpus, k.saturating_mul(2))
            .await?;
        let ranked = rank_passages(raw, k, self.min_relevance);
        tracing::debug!(
            backend = self.backend.name(),
            corpus,
            k,
            returned = ranked.len(),
            "Retrieved evidence"
        );
        Ok(ranked)
    }

    /// Fingerprint of every parameter that affects [`Retriever::retrieve`].
    pub fn fingerprint(
        &self,
        query_text: &str,
        k: usize,
        corpus: &str,
    ) -> Result<Fingerprint, serde_json::Error> {
        Fingerprint::of(&RetrievalParams {
            backend: self.backend.name(),
            query: query_text,
            corpus,
            k,
            min_relevance: self.min_relevance,
        })
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("backend", &self.backend.name())
            .field("min_relevance", &self.min_relevance)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend(Vec<EvidencePassage>);

    #[async_trait]
    impl SearchBackend for FixedBackend {
        async fn search(
            &self,
            _query_text: &str,
            _corpus_id: &str,
            k: usize,
        ) -> Result<Vec<EvidencePassage>, SearchError> {
            Ok(self.0.iter().take(k).cloned().collect())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn retriever(passages: Vec<EvidencePassage>, floor: f64) -> Retriever {
        Retriever::new(Arc::new(FixedBackend(passages)), floor)
    }

    #[tokio::test]
    async fn test_ranked_deduplicated_and_bounded() {
        let r = retriever(
            vec![
                EvidencePassage::new("a", "Canberra is the capital.", 0.4),
                EvidencePassage::new("b", "canberra  is the CAPITAL.", 0.9),
                EvidencePassage::new("c", "Sydney is the largest city.", 0.7),
                EvidencePassage::new("d", "Melbourne hosted the 1956 Olympics.", 0.2),
            ],
            0.0,
        );
        let passages = r.retrieve("capital of Australia", 2, "default").await.unwrap();
        let ids: Vec<&str> = passages.iter().map(|p| p.source_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_nothing_above_floor_is_empty_not_error() {
        let r = retriever(vec![EvidencePassage::new("a", "Unrelated text.", 0.1)], 0.5);
        assert!(r.retrieve("anything", 3, "default").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_k_skips_backend() {
        let r = retriever(vec![EvidencePassage::new("a", "Text.", 1.0)], 0.0);
        assert!(r.retrieve("anything", 0, "default").await.unwrap().is_empty());
    }

    #[test]
    fn test_fingerprint_tracks_parameters() {
        let r = retriever(vec![], 0.0);
        let base = r.fingerprint("q", 5, "default").unwrap();
        assert_eq!(base, r.fingerprint("q", 5, "default").unwrap());
        assert_ne!(base, r.fingerprint("q", 6, "default").unwrap());
        assert_ne!(base, r.fingerprint("q", 5, "other").unwrap());
        assert_ne!(base, retriever(vec![], 0.2).fingerprint("q", 5, "default").unwrap());
    }

    #[test]
    fn test_transient_classification() {
        assert!(SearchError::RateLimited.is_transient());
        assert!(SearchError::ApiError { status: 503, message: String::new() }.is_transient());
        assert!(!SearchError::ApiError { status: 404, message: String::new() }.is_transient());
        assert!(!SearchError::UnknownCorpus("x".into()).is_transient());
    }
}
