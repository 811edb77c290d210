//! Wikipedia search through the MediaWiki action API.
//!
//! Titles come from full-text search; each title contributes the first few
//! sentences of its plain-text intro. Wikipedia reports no relevance score,
//! so passages are scored by search rank: `1 / (rank + 1)`.

use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use truthlayer_core::evidence::clean_text;
use truthlayer_core::EvidencePassage;

use super::{SearchBackend, SearchError};

const DEFAULT_API_URL: &str = "https://en.wikipedia.org/w/api.php";
const DEFAULT_SENTENCES: usize = 3;
const DEFAULT_RESULTS: usize = 2;

lazy_static! {
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?]\s+").unwrap();
}

/// MediaWiki search backend. The corpus id is reported as provenance.
#[derive(Debug)]
pub struct WikipediaSearch {
    api_url: String,
    sentences: usize,
    results: usize,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: SearchQuery,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

impl WikipediaSearch {
    pub fn new() -> Result<Self, SearchError> {
        Self::from_config(&JsonValue::Null)
    }

    /// ```json
    /// { "api_url": "https://en.wikipedia.org/w/api.php", "sentences": 3, "results": 2 }
    /// ```
    ///
    /// `results` caps titles per search regardless of the requested `k`.
    pub fn from_config(config: &JsonValue) -> Result<Self, SearchError> {
        let timeout = Duration::from_secs(config["timeout_secs"].as_u64().unwrap_or(15));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("truthlayer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SearchError::HttpError(e.to_string()))?;
        Ok(Self {
            api_url: config["api_url"]
                .as_str()
                .unwrap_or(DEFAULT_API_URL)
                .to_string(),
            sentences: config["sentences"]
                .as_u64()
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_SENTENCES),
            results: config["results"]
                .as_u64()
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_RESULTS),
            timeout,
            client,
        })
    }

    async fn get_json(&self, params: &[(&str, &str)]) -> Result<JsonValue, SearchError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout(self.timeout)
                } else {
                    SearchError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::ApiError {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))
    }

    async fn search_titles(&self, query_text: &str, n: usize) -> Result<Vec<String>, SearchError> {
        let limit = n.to_string();
        let body = self
            .get_json(&[
                ("action", "query"),
                ("list", "search"),
                ("format", "json"),
                ("srsearch", query_text),
                ("srlimit", limit.as_str()),
            ])
            .await?;
        let parsed: SearchResponse =
            serde_json::from_value(body).map_err(|e| SearchError::ParseError(e.to_string()))?;
        Ok(parsed.query.search.into_iter().map(|h| h.title).collect())
    }

    async fn summary(&self, title: &str) -> Result<String, SearchError> {
        let body = self
            .get_json(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("format", "json"),
                ("titles", title),
            ])
            .await?;
        let extract = extract_text(&body).unwrap_or_default();
        Ok(first_sentences(&clean_text(&extract), self.sentences))
    }
}

/// Plain-text extract of the first page in a `prop=extracts` response.
fn extract_text(body: &JsonValue) -> Option<String> {
    body["query"]["pages"]
        .as_object()?
        .values()
        .find_map(|page| page["extract"].as_str().map(str::to_string))
}

/// The first `n` sentences of `text` (at least one).
fn first_sentences(text: &str, n: usize) -> String {
    let n = n.max(1);
    let mut end = text.len();
    for (count, m) in SENTENCE_END.find_iter(text).enumerate() {
        if count + 1 == n {
            end = m.start() + 1;
            break;
        }
    }
    text[..end].trim().to_string()
}

fn page_url(title: &str) -> String {
    format!("https://en.wikipedia.org/wiki/{}", title.replace(' ', "_"))
}

#[async_trait]
impl SearchBackend for WikipediaSearch {
    async fn search(
        &self,
        query_text: &str,
        corpus_id: &str,
        k: usize,
    ) -> Result<Vec<EvidencePassage>, SearchError> {
        let titles = self.search_titles(query_text, k.min(self.results)).await?;

        let mut passages = Vec::with_capacity(titles.len());
        for (rank, title) in titles.into_iter().enumerate() {
            let text = self.summary(&title).await?;
            if text.is_empty() {
                continue;
            }
            let mut passage = EvidencePassage::new(
                format!("wikipedia:{}", title),
                text,
                1.0 / (rank as f64 + 1.0),
            )
            .from_corpus(corpus_id);
            passage.provenance.locator = Some(page_url(&title));
            passage.provenance.title = Some(title);
            passages.push(passage);
        }
        Ok(passages)
    }

    fn name(&self) -> &str {
        "wikipedia"
    }
}
