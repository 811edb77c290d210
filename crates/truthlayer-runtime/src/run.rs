//! Run context and persisted run artifacts.
//!
//! A run owns one timestamped directory under the configured runs dir.
//! The [`RunContext`] is created at run start, passed to every stage and
//! closed when the artifacts are written. It carries the run's cancellation
//! token and its error log.
//!
//! ```text
//! runs/20250101-120000/
//!   verdicts/<model>.json          one array of verdict records per model
//!   generations/<model>.json       generation records, including refusals
//!   per_model_summary.json
//!   per_domain_summary.json
//!   pairwise_significance.json
//!   coverage.json
//!   errors.json
//!   queries.json                   queries the run evaluated
//!   claim_labels.json              per-claim expected labels, if any
//!   run.json                       run metadata
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use truthlayer_core::{
    Aggregator, AggregationConfig, ClaimLabel, CoverageGap, GenerationRecord, GroundTruth, Query,
    RunSummary, VerdictRecord,
};

use crate::cache::CacheStats;
use crate::resilience::LlmUsage;

pub const VERDICTS_DIR: &str = "verdicts";
pub const GENERATIONS_DIR: &str = "generations";
pub const PER_MODEL_FILE: &str = "per_model_summary.json";
pub const PER_DOMAIN_FILE: &str = "per_domain_summary.json";
pub const PAIRWISE_FILE: &str = "pairwise_significance.json";
pub const COVERAGE_FILE: &str = "coverage.json";
pub const ERRORS_FILE: &str = "errors.json";
pub const QUERIES_FILE: &str = "queries.json";
pub const CLAIM_LABELS_FILE: &str = "claim_labels.json";
pub const RUN_FILE: &str = "run.json";

/// Errors reading or writing run artifacts.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Run directory already exists: {0}")]
    Exists(PathBuf),

    #[error("Run {0} is closed")]
    Closed(String),

    #[error("Models '{first}' and '{second}' would share the artifact file '{stem}.json'")]
    FileStemCollision {
        first: String,
        second: String,
        stem: String,
    },

    #[error("Artifact writer task failed: {0}")]
    Task(String),
}

/// Kind of a per-key problem recorded in the error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunErrorKind {
    CacheCorrupt,
    CacheWrite,
    RetrievalFailed,
    GenerationFailed,
    VerificationFailed,
}

/// One entry of `errors.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunErrorEntry {
    pub kind: RunErrorKind,
    pub query_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub message: String,
}

/// `run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub cancelled: bool,
    pub models: Vec<String>,
    pub queries: usize,
    pub verdicts: usize,
    pub usage: BTreeMap<String, LlmUsage>,
    pub cache: CacheStats,
    pub aggregation: AggregationConfig,
}

/// State of one run, from creation to close.
#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    dir: PathBuf,
    created_at: DateTime<Utc>,
    cancel: CancellationToken,
    errors: Mutex<Vec<RunErrorEntry>>,
    closed: Mutex<Option<DateTime<Utc>>>,
}

impl RunContext {
    /// Create `<runs_dir>/<YYYYmmdd-HHMMSS>`. A second run started in the
    /// same second gets a `-2`, `-3`, ... suffix.
    pub fn create(runs_dir: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let runs_dir = runs_dir.as_ref();
        let created_at = Utc::now();
        let stamp = created_at.format("%Y%m%d-%H%M%S").to_string();

        create_dir(runs_dir)?;
        let mut run_id = stamp.clone();
        let mut suffix = 1;
        loop {
            let dir = runs_dir.join(&run_id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok(Self::new(run_id, dir, created_at)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    suffix += 1;
                    run_id = format!("{}-{}", stamp, suffix);
                }
                Err(source) => return Err(ArtifactError::Io { path: dir, source }),
            }
        }
    }

    /// Use an explicit directory, which must not exist yet.
    pub fn at(dir: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let dir = dir.into();
        if dir.exists() {
            return Err(ArtifactError::Exists(dir));
        }
        create_dir(&dir)?;
        let run_id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run".to_string());
        Ok(Self::new(run_id, dir, Utc::now()))
    }

    fn new(run_id: String, dir: PathBuf, created_at: DateTime<Utc>) -> Self {
        tracing::info!(run_id = %run_id, dir = %dir.display(), "Run created");
        Self {
            run_id,
            dir,
            created_at,
            cancel: CancellationToken::new(),
            errors: Mutex::new(Vec::new()),
            closed: Mutex::new(None),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Token observed by every external call of this run.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop issuing new external calls. In-flight calls finish and are
    /// cached.
    pub fn cancel(&self) {
        tracing::warn!(run_id = %self.run_id, "Run cancellation requested");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn record_error(&self, entry: RunErrorEntry) {
        tracing::warn!(
            run_id = %self.run_id,
            kind = ?entry.kind,
            query_id = %entry.query_id,
            model_id = ?entry.model_id,
            message = %entry.message,
            "Run error recorded"
        );
        self.errors.lock().push(entry);
    }

    /// Error log, sorted so the file does not depend on completion order.
    pub fn errors(&self) -> Vec<RunErrorEntry> {
        let mut errors = self.errors.lock().clone();
        errors.sort_by(|a, b| {
            (&a.query_id, &a.model_id, a.kind, &a.key, &a.message)
                .cmp(&(&b.query_id, &b.model_id, b.kind, &b.key, &b.message))
        });
        errors
    }

    pub fn is_closed(&self) -> bool {
        self.closed.lock().is_some()
    }

    /// Mark the run finished. Closing twice is an error.
    pub fn close(&self) -> Result<DateTime<Utc>, ArtifactError> {
        let mut closed = self.closed.lock();
        if closed.is_some() {
            return Err(ArtifactError::Closed(self.run_id.clone()));
        }
        let now = Utc::now();
        *closed = Some(now);
        tracing::info!(run_id = %self.run_id, "Run closed");
        Ok(now)
    }

    /// Writer for this run's directory.
    pub fn artifacts(&self) -> ArtifactWriter {
        ArtifactWriter::new(&self.dir)
    }
}

/// Writes and reads the files of one run directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run `write` on the blocking thread pool, off the async executor.
    pub async fn offload<F>(&self, write: F) -> Result<(), ArtifactError>
    where
        F: FnOnce(&ArtifactWriter) -> Result<(), ArtifactError> + Send + 'static,
    {
        let writer = self.clone();
        tokio::task::spawn_blocking(move || write(&writer))
            .await
            .map_err(|e| ArtifactError::Task(e.to_string()))?
    }

    /// One array per model, sorted by (query, sample, position). Every
    /// model gets a file, even when it produced no verdicts.
    pub fn write_verdicts(
        &self,
        models: &[String],
        records: &[VerdictRecord],
    ) -> Result<(), ArtifactError> {
        check_file_stems(models)?;
        let verdict_dir = self.dir.join(VERDICTS_DIR);
        create_dir(&verdict_dir)?;

        let mut by_model: BTreeMap<&str, Vec<&VerdictRecord>> =
            models.iter().map(|m| (m.as_str(), Vec::new())).collect();
        for record in records {
            by_model
                .entry(record.model_id.as_str())
                .or_default()
                .push(record);
        }
        for (model, mut rows) in by_model {
            rows.sort_by(|a, b| {
                (&a.query_id, a.sample, a.position).cmp(&(&b.query_id, b.sample, b.position))
            });
            write_json(&verdict_dir.join(format!("{}.json", file_stem(model))), &rows)?;
        }
        Ok(())
    }

    /// Generation records per model, sorted by (query, sample).
    pub fn write_generations(
        &self,
        models: &[String],
        records: &[GenerationRecord],
    ) -> Result<(), ArtifactError> {
        check_file_stems(models)?;
        let generation_dir = self.dir.join(GENERATIONS_DIR);
        create_dir(&generation_dir)?;

        let mut by_model: BTreeMap<&str, Vec<&GenerationRecord>> =
            models.iter().map(|m| (m.as_str(), Vec::new())).collect();
        for record in records {
            by_model
                .entry(record.model_id.as_str())
                .or_default()
                .push(record);
        }
        for (model, mut rows) in by_model {
            rows.sort_by(|a, b| (&a.query_id, a.sample).cmp(&(&b.query_id, b.sample)));
            write_json(
                &generation_dir.join(format!("{}.json", file_stem(model))),
                &rows,
            )?;
        }
        Ok(())
    }

    /// The four summary tables.
    pub fn write_summary(&self, summary: &RunSummary) -> Result<(), ArtifactError> {
        write_json(&self.dir.join(PER_MODEL_FILE), &summary.per_model)?;
        write_json(&self.dir.join(PER_DOMAIN_FILE), &summary.per_domain)?;
        write_json(&self.dir.join(PAIRWISE_FILE), &summary.pairwise)?;
        write_json(&self.dir.join(COVERAGE_FILE), &summary.coverage)
    }

    pub fn write_errors(&self, errors: &[RunErrorEntry]) -> Result<(), ArtifactError> {
        write_json(&self.dir.join(ERRORS_FILE), &errors)
    }

    pub fn write_inputs(
        &self,
        queries: &[Query],
        claim_labels: &[ClaimLabel],
    ) -> Result<(), ArtifactError> {
        write_json(&self.dir.join(QUERIES_FILE), &queries)?;
        if !claim_labels.is_empty() {
            write_json(&self.dir.join(CLAIM_LABELS_FILE), &claim_labels)?;
        }
        Ok(())
    }

    pub fn write_metadata(&self, metadata: &RunMetadata) -> Result<(), ArtifactError> {
        write_json(&self.dir.join(RUN_FILE), metadata)
    }

    /// Every verdict record in `verdicts/`, in file-name order.
    pub fn read_verdicts(&self) -> Result<Vec<VerdictRecord>, ArtifactError> {
        let verdict_dir = self.dir.join(VERDICTS_DIR);
        let entries = fs::read_dir(&verdict_dir).map_err(|source| ArtifactError::Io {
            path: verdict_dir.clone(),
            source,
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ArtifactError::Io {
                path: verdict_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut records = Vec::new();
        for path in paths {
            records.extend(read_json::<Vec<VerdictRecord>>(&path)?);
        }
        Ok(records)
    }

    pub fn read_queries(&self) -> Result<Vec<Query>, ArtifactError> {
        read_json(&self.dir.join(QUERIES_FILE))
    }

    /// Per-claim labels; a run without the file has none.
    pub fn read_claim_labels(&self) -> Result<Vec<ClaimLabel>, ArtifactError> {
        let path = self.dir.join(CLAIM_LABELS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_json(&path)
    }

    /// Item-level gaps (refused, failed, cancelled) from `coverage.json`.
    /// Verifier-error gaps are rederived from the verdicts.
    pub fn read_item_gaps(&self) -> Result<Vec<CoverageGap>, ArtifactError> {
        let path = self.dir.join(COVERAGE_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let coverage: truthlayer_core::CoverageReport = read_json(&path)?;
        Ok(coverage
            .gaps
            .into_iter()
            .filter(|g| g.claim_id.is_none())
            .collect())
    }

    pub fn read_summary(&self) -> Result<RunSummary, ArtifactError> {
        Ok(RunSummary {
            per_model: read_json(&self.dir.join(PER_MODEL_FILE))?,
            per_domain: read_json(&self.dir.join(PER_DOMAIN_FILE))?,
            pairwise: read_json(&self.dir.join(PAIRWISE_FILE))?,
            coverage: read_json(&self.dir.join(COVERAGE_FILE))?,
        })
    }
}

/// Recompute a run's summary from its persisted verdicts and inputs.
pub fn summarize(dir: impl AsRef<Path>, config: AggregationConfig) -> Result<RunSummary, ArtifactError> {
    let artifacts = ArtifactWriter::new(dir.as_ref());
    let records = artifacts.read_verdicts()?;
    let mut truth = GroundTruth::from_queries(&artifacts.read_queries()?);
    truth.extend_claims(artifacts.read_claim_labels()?);
    let gaps = artifacts.read_item_gaps()?;
    Ok(Aggregator::new(config).summarize(&records, &truth, &gaps))
}

/// Model ids may contain `/` or `:`; keep file names flat. An id that had
/// to be rewritten gets a short digest suffix, so `a/b` and `a_b` map to
/// different files.
pub fn file_stem(model_id: &str) -> String {
    let flat: String = model_id
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | ' ' => '_',
            c => c,
        })
        .collect();
    if flat == model_id {
        return flat;
    }
    let digest = hex::encode(Sha256::digest(model_id.as_bytes()));
    format!("{}-{}", flat, &digest[..8])
}

/// Fail when two model ids would write the same artifact file.
pub fn check_file_stems(models: &[String]) -> Result<(), ArtifactError> {
    let mut stems: BTreeMap<String, &str> = BTreeMap::new();
    for model in models {
        let stem = file_stem(model);
        match stems.get(&stem) {
            Some(first) if *first != model.as_str() => {
                return Err(ArtifactError::FileStemCollision {
                    first: first.to_string(),
                    second: model.clone(),
                    stem,
                });
            }
            _ => {
                stems.insert(stem, model);
            }
        }
    }
    Ok(())
}

fn create_dir(path: &Path) -> Result<(), ArtifactError> {
    fs::create_dir_all(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    bytes.push(b'\n');
    fs::write(path, bytes).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let bytes = fs::read(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use truthlayer_core::{Claim, Label, LabelPolicy, GapReason};

    fn record(model: &str, query: &str, position: usize, label: Label) -> VerdictRecord {
        let claim = Claim::new(&format!("{}-{}", model, query), position, "A claim.");
        let mut verdict = LabelPolicy::default().decide(&claim, &[]);
        verdict.label = label;
        VerdictRecord {
            query_id: query.to_string(),
            model_id: model.to_string(),
            domain: "geo".to_string(),
            generation_id: claim.generation_id.clone(),
            sample: 0,
            position,
            verdict,
        }
    }

    #[test]
    fn test_run_ids_are_unique_per_second() {
        let runs = tempfile::tempdir().unwrap();
        let a = RunContext::create(runs.path()).unwrap();
        let b = RunContext::create(runs.path()).unwrap();
        assert_ne!(a.dir(), b.dir());
        assert!(a.dir().is_dir() && b.dir().is_dir());
        assert_eq!(a.run_id().len(), "20250101-120000".len());
    }

    #[test]
    fn test_close_once() {
        let runs = tempfile::tempdir().unwrap();
        let run = RunContext::create(runs.path()).unwrap();
        assert!(!run.is_closed());
        run.close().unwrap();
        assert!(run.is_closed());
        assert!(matches!(run.close(), Err(ArtifactError::Closed(_))));
    }

    #[test]
    fn test_explicit_dir_must_be_new() {
        let runs = tempfile::tempdir().unwrap();
        assert!(matches!(RunContext::at(runs.path()), Err(ArtifactError::Exists(_))));
        let run = RunContext::at(runs.path().join("nightly")).unwrap();
        assert_eq!(run.run_id(), "nightly");
    }

    #[test]
    fn test_errors_sorted() {
        let runs = tempfile::tempdir().unwrap();
        let run = RunContext::create(runs.path()).unwrap();
        for q in ["q2", "q1"] {
            run.record_error(RunErrorEntry {
                kind: RunErrorKind::CacheCorrupt,
                query_id: q.to_string(),
                model_id: None,
                key: Some("abc".to_string()),
                message: "bad".to_string(),
            });
        }
        let ids: Vec<String> = run.errors().into_iter().map(|e| e.query_id).collect();
        assert_eq!(ids, vec!["q1", "q2"]);
    }

    #[test]
    fn test_verdict_files_per_model_and_summarize() {
        let runs = tempfile::tempdir().unwrap();
        let run = RunContext::create(runs.path()).unwrap();
        let artifacts = run.artifacts();
        let queries = vec![
            Query::new("q1", "Q1?").with_expected_label(Label::Supported),
            Query::new("q2", "Q2?").with_expected_label(Label::Supported),
        ];
        let records = vec![
            record("org/model-a", "q2", 0, Label::Supported),
            record("org/model-a", "q1", 0, Label::Unverifiable),
        ];
        let models = vec!["org/model-a".to_string(), "model-b".to_string()];
        let gaps = vec![CoverageGap {
            model_id: "model-b".to_string(),
            query_id: "q1".to_string(),
            sample: 0,
            claim_id: None,
            reason: GapReason::Refused,
            detail: "content_filter".to_string(),
        }];

        let config = AggregationConfig {
            bootstrap_resamples: 50,
            ..Default::default()
        };
        let truth = GroundTruth::from_queries(&queries);
        let summary = Aggregator::new(config).summarize(&records, &truth, &gaps);
        artifacts.write_inputs(&queries, &[]).unwrap();
        artifacts.write_verdicts(&models, &records).unwrap();
        artifacts.write_summary(&summary).unwrap();

        let a: Vec<VerdictRecord> =
            read_json(&run.dir().join("verdicts").join(format!("{}.json", file_stem("org/model-a"))))
                .unwrap();
        assert_eq!(a.iter().map(|r| r.query_id.as_str()).collect::<Vec<_>>(), vec!["q1", "q2"]);
        let b: Vec<VerdictRecord> =
            read_json(&run.dir().join("verdicts").join("model-b.json")).unwrap();
        assert!(b.is_empty());

        assert_eq!(artifacts.read_summary().unwrap(), summary);
        assert_eq!(summarize(run.dir(), config).unwrap(), summary);
    }

    #[test]
    fn test_table_columns_are_fixed() {
        let runs = tempfile::tempdir().unwrap();
        let artifacts = ArtifactWriter::new(runs.path());
        let records = vec![record("m", "q1", 0, Label::Supported)];
        let queries = vec![Query::new("q1", "Q?").with_expected_label(Label::Supported)];
        let summary = Aggregator::new(AggregationConfig {
            bootstrap_resamples: 10,
            ..Default::default()
        })
        .summarize(&records, &GroundTruth::from_queries(&queries), &[]);
        artifacts.write_summary(&summary).unwrap();

        let rows: Vec<serde_json::Map<String, serde_json::Value>> =
            read_json(&runs.path().join(PER_MODEL_FILE)).unwrap();
        let mut columns: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        columns.sort();
        let mut expected = vec![
            "model", "n", "exact", "loose", "soft", "recall", "supported", "contradicted",
            "unverifiable",
        ];
        expected.sort();
        assert_eq!(columns, expected);
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("model-b"), "model-b");
        let stem = file_stem("meta-llama/Llama-3:8b");
        assert!(stem.starts_with("meta-llama_Llama-3_8b-"));
        assert_eq!(stem.len(), "meta-llama_Llama-3_8b-".len() + 8);
    }

    #[test]
    fn test_similar_model_ids_get_separate_files() {
        assert_ne!(file_stem("a/b"), file_stem("a_b"));
        assert!(check_file_stems(&["a/b".to_string(), "a_b".to_string()]).is_ok());

        let runs = tempfile::tempdir().unwrap();
        let artifacts = ArtifactWriter::new(runs.path());
        let models = vec!["a/b".to_string(), "a_b".to_string()];
        let records = vec![record("a/b", "q1", 0, Label::Supported), record("a_b", "q1", 0, Label::Contradicted)];
        artifacts.write_verdicts(&models, &records).unwrap();

        let read = artifacts.read_verdicts().unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read.iter().filter(|r| r.model_id == "a/b").count(), 1);
    }

    #[test]
    fn test_colliding_stems_rejected() {
        let flat = file_stem("x/y");
        let err = check_file_stems(&["x/y".to_string(), flat.clone()]).unwrap_err();
        assert!(matches!(err, ArtifactError::FileStemCollision { stem, .. } if stem == flat));
        assert!(check_file_stems(&["m".to_string(), "m".to_string()]).is_ok());
    }

    #[tokio::test]
    async fn test_offloaded_writes() {
        let runs = tempfile::tempdir().unwrap();
        let artifacts = ArtifactWriter::new(runs.path());
        let errors = vec![RunErrorEntry {
            kind: RunErrorKind::CacheWrite,
            query_id: "q1".to_string(),
            model_id: None,
            key: None,
            message: "disk full".to_string(),
        }];
        artifacts
            .offload(move |w| w.write_errors(&errors))
            .await
            .unwrap();
        let read: Vec<RunErrorEntry> = read_json(&runs.path().join(ERRORS_FILE)).unwrap();
        assert_eq!(read[0].message, "disk full");

        let failed = artifacts.offload(|_| panic!("writer crashed")).await;
        assert!(matches!(failed, Err(ArtifactError::Task(_))));
    }

    proptest::proptest! {
        #[test]
        fn prop_file_stem_is_flat(model_id in "[a-zA-Z0-9/:. _-]{1,40}") {
            let stem = file_stem(&model_id);
            proptest::prop_assert!(!stem.contains('/') && !stem.contains(':') && !stem.contains(' '));
        }

        #[test]
        fn prop_distinct_ids_distinct_stems(a in "[a-z/_]{1,6}", b in "[a-z/_]{1,6}") {
            proptest::prop_assume!(a != b);
            proptest::prop_assert_ne!(file_stem(&a), file_stem(&b));
        }
    }
}
