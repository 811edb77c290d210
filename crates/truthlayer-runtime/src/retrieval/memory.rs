//! In-process lexical search over a fixed document set.
//!
//! Scores are the fraction of the query's content terms found in the
//! document. Documents sharing no term with the query are not returned.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use truthlayer_core::lexical::content_terms;
use truthlayer_core::EvidencePassage;

use super::{SearchBackend, SearchError};

fn default_corpus() -> String {
    "default".to_string()
}

/// One searchable document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub id: String,
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default = "default_corpus")]
    pub corpus: String,
}

#[derive(Debug)]
struct Indexed {
    doc: CorpusDocument,
    terms: BTreeSet<String>,
}

/// Fixed corpus snapshot searchable in memory.
#[derive(Debug, Default)]
pub struct InMemoryCorpus {
    docs: Vec<Indexed>,
    corpora: HashSet<String>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document to the `default` corpus.
    pub fn with_passage(self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.with_document(CorpusDocument {
            id: id.into(),
            text: text.into(),
            title: None,
            corpus: default_corpus(),
        })
    }

    pub fn with_document(mut self, doc: CorpusDocument) -> Self {
        self.corpora.insert(doc.corpus.clone());
        let terms = content_terms(&doc.text);
        self.docs.push(Indexed { doc, terms });
        self
    }

    pub fn from_documents(docs: impl IntoIterator<Item = CorpusDocument>) -> Self {
        docs.into_iter()
            .fold(Self::new(), |corpus, doc| corpus.with_document(doc))
    }

    /// Load documents from a JSON array or JSON Lines file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SearchError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SearchError::Corpus(format!("{}: {}", path.display(), e)))?;
        Self::parse(&contents)
            .map_err(|e| SearchError::Corpus(format!("{}: {}", path.display(), e)))
    }

    fn parse(contents: &str) -> Result<Self, String> {
        if contents.trim_start().starts_with('[') {
            let docs: Vec<CorpusDocument> =
                serde_json::from_str(contents).map_err(|e| e.to_string())?;
            return Ok(Self::from_documents(docs));
        }

        let mut docs = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim_end_matches('\r').trim();
            if line.is_empty() {
                continue;
            }
            let doc: CorpusDocument =
                serde_json::from_str(line).map_err(|e| format!("line {}: {}", idx + 1, e))?;
            docs.push(doc);
        }
        Ok(Self::from_documents(docs))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[async_trait]
impl SearchBackend for InMemoryCorpus {
    async fn search(
        &self,
        query_text: &str,
        corpus_id: &str,
        k: usize,
    ) -> Result<Vec<EvidencePassage>, SearchError> {
        if !self.corpora.contains(corpus_id) {
            return Err(SearchError::UnknownCorpus(corpus_id.to_string()));
        }
        let query_terms = content_terms(query_text);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<(f64, &CorpusDocument)> = self
            .docs
            .iter()
            .filter(|d| d.doc.corpus == corpus_id)
            .filter_map(|d| {
                let overlap = query_terms.intersection(&d.terms).count();
                (overlap > 0).then(|| (overlap as f64 / query_terms.len() as f64, &d.doc))
            })
            .collect();
        // Stable: equal scores keep insertion order.
        hits.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(hits
            .into_iter()
            .take(k)
            .map(|(score, doc)| {
                let mut passage =
                    EvidencePassage::new(doc.id.clone(), doc.text.clone(), score)
                        .from_corpus(doc.corpus.clone());
                passage.provenance.title = doc.title.clone();
                passage
            })
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> InMemoryCorpus {
        InMemoryCorpus::new()
            .with_passage("nile", "The Nile is 6,650 km long, slightly shorter than the Amazon River.")
            .with_passage("canberra", "Canberra is the capital city of Australia.")
            .with_passage("sydney", "Sydney is the largest city in Australia.")
    }

    #[tokio::test]
    async fn test_best_overlap_first() {
        let hits = corpus()
            .search("What is the capital of Australia?", "default", 5)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|p| p.source_id.as_str()).collect();
        assert_eq!(ids, vec!["canberra", "sydney"]);
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[0].provenance.corpus, "default");
    }

    #[tokio::test]
    async fn test_no_overlap_is_empty() {
        let hits = corpus().search("photosynthesis", "default", 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_corpus_is_error() {
        let err = corpus().search("Nile", "medical", 5).await.unwrap_err();
        assert!(matches!(err, SearchError::UnknownCorpus(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_load_jsonl_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let jsonl = dir.path().join("corpus.jsonl");
        std::fs::write(
            &jsonl,
            "{\"id\": \"a\", \"text\": \"Alpha.\"}\r\n\n{\"id\": \"b\", \"text\": \"Beta.\", \"corpus\": \"wiki\"}\n",
        )
        .unwrap();
        let corpus = InMemoryCorpus::load(&jsonl).unwrap();
        assert_eq!(corpus.len(), 2);
        assert!(corpus.corpora.contains("wiki"));

        let json = dir.path().join("corpus.json");
        std::fs::write(&json, r#"[{"id": "a", "text": "Alpha.", "title": "A"}]"#).unwrap();
        assert_eq!(InMemoryCorpus::load(&json).unwrap().len(), 1);

        let bad = dir.path().join("bad.jsonl");
        std::fs::write(&bad, "{\"id\": \"a\"}\n").unwrap();
        assert!(matches!(InMemoryCorpus::load(&bad), Err(SearchError::Corpus(_))));
    }
}
