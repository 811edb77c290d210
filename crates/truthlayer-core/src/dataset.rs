//! Query dataset loading from JSONL, JSON or YAML.
//!
//! Records accept a few common spellings: `text` or `question` for the
//! question, a string or integer `id`, and either a nested `expected`
//! block or flat `answer` / `label` fields.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::aggregate::ClaimLabel;
use crate::types::{Expected, Label, Query, UNKNOWN_DOMAIN};

/// Errors that can occur when loading datasets.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Failed to read dataset file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Line {line}: {source}")]
    JsonLineError {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown label '{0}'")]
    UnknownLabel(String),

    #[error("Dataset validation failed: {0}")]
    ValidationError(String),

    #[error("Unsupported dataset format: {0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawQuery {
    id: RawId,
    #[serde(alias = "question")]
    text: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    expected: Option<Expected>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default, alias = "expected_label")]
    label: Option<String>,
}

impl RawQuery {
    fn into_query(self) -> Result<Query, DatasetError> {
        let mut expected = self.expected.unwrap_or_default();
        if expected.answer.is_none() {
            expected.answer = self.answer;
        }
        if let Some(raw) = self.label {
            let label = Label::parse(&raw).ok_or(DatasetError::UnknownLabel(raw))?;
            expected.label = Some(label);
        }
        let has_expected = expected.answer.is_some() || expected.label.is_some();

        Ok(Query {
            id: self.id.into_string(),
            text: self.text.trim().to_string(),
            domain: self
                .domain
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_DOMAIN.to_string()),
            expected: has_expected.then_some(expected),
        })
    }
}

/// Parse JSON Lines. Blank lines are skipped and trailing `\r` stripped.
pub fn parse_jsonl(contents: &str) -> Result<Vec<Query>, DatasetError> {
    let mut queries = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim_end_matches('\r').trim();
        if line.is_empty() {
            continue;
        }
        let raw: RawQuery = serde_json::from_str(line).map_err(|source| {
            DatasetError::JsonLineError {
                line: idx + 1,
                source,
            }
        })?;
        queries.push(raw.into_query()?);
    }
    validate(&queries)?;
    Ok(queries)
}

/// Parse a JSON array of queries.
pub fn from_json(json: &str) -> Result<Vec<Query>, DatasetError> {
    let raw: Vec<RawQuery> = serde_json::from_str(json)?;
    finish(raw)
}

/// Parse a YAML sequence of queries.
pub fn from_yaml(yaml: &str) -> Result<Vec<Query>, DatasetError> {
    let raw: Vec<RawQuery> = serde_yaml::from_str(yaml)?;
    finish(raw)
}

/// Load queries, choosing the format from the file extension.
pub fn load_queries(path: impl AsRef<Path>) -> Result<Vec<Query>, DatasetError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let queries = match extension(path).as_str() {
        "jsonl" | "ndjson" => parse_jsonl(&contents),
        "json" => from_json(&contents),
        "yaml" | "yml" => from_yaml(&contents),
        other => Err(DatasetError::UnsupportedFormat(other.to_string())),
    }?;
    tracing::debug!(path = %path.display(), queries = queries.len(), "Loaded queries");
    Ok(queries)
}

/// Load per-claim expected labels (`{query_id, position, label}` records)
/// from JSONL or a JSON array.
pub fn load_claim_labels(path: impl AsRef<Path>) -> Result<Vec<ClaimLabel>, DatasetError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    match extension(path).as_str() {
        "jsonl" | "ndjson" => contents
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx, line.trim_end_matches('\r').trim()))
            .filter(|(_, line)| !line.is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line).map_err(|source| DatasetError::JsonLineError {
                    line: idx + 1,
                    source,
                })
            })
            .collect(),
        "json" => Ok(serde_json::from_str(&contents)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(&contents)?),
        other => Err(DatasetError::UnsupportedFormat(other.to_string())),
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn finish(raw: Vec<RawQuery>) -> Result<Vec<Query>, DatasetError> {
    let queries = raw
        .into_iter()
        .map(RawQuery::into_query)
        .collect::<Result<Vec<_>, _>>()?;
    validate(&queries)?;
    Ok(queries)
}

/// Ensure ids are unique and non-empty and every query has text.
fn validate(queries: &[Query]) -> Result<(), DatasetError> {
    let mut seen = HashSet::new();
    for query in queries {
        if query.id.trim().is_empty() {
            return Err(DatasetError::ValidationError("empty query id".to_string()));
        }
        if query.text.is_empty() {
            return Err(DatasetError::ValidationError(format!(
                "query '{}' has no text",
                query.id
            )));
        }
        if !seen.insert(query.id.as_str()) {
            return Err(DatasetError::ValidationError(format!(
                "duplicate query id '{}'",
                query.id
            )));
        }
    }
    Ok(())
}
