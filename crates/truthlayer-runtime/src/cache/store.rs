//! Durable file store: one self-describing JSON document per cache entry.
//!
//! Layout is `<root>/<stage>/<key>.json`. Documents are written to a
//! temporary file in the same directory and renamed into place, so a
//! reader never observes a partial entry.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use truthlayer_core::{CacheKey, Fingerprint, Stage};

use super::CacheError;

/// Envelope format version.
pub const SCHEMA_VERSION: u32 = 1;

const ENTRY_SCHEMA_JSON: &str = include_str!("../../schemas/cache-entry.schema.json");

static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, CacheError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: JsonValue = match serde_json::from_str(ENTRY_SCHEMA_JSON) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };
        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result
        .as_ref()
        .map_err(|e| CacheError::Schema(e.clone()))
}

/// A stored cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub schema_version: u32,
    pub key: String,
    pub stage: Stage,
    pub query_id: String,
    pub model_id: Option<String>,
    pub fingerprint: Fingerprint,
    pub created_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl Envelope {
    pub fn new(key: &CacheKey, payload: JsonValue) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            key: key.digest().to_string(),
            stage: key.stage,
            query_id: key.query_id.clone(),
            model_id: key.model_id.clone(),
            fingerprint: key.fingerprint.clone(),
            created_at: Utc::now(),
            payload,
        }
    }
}

/// Check a raw document against the entry schema and the key it was
/// looked up under.
pub fn validate_document(key: &CacheKey, document: &JsonValue) -> Result<(), String> {
    let validator = get_validator().map_err(|e| e.to_string())?;
    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();
    if !errors.is_empty() {
        return Err(errors.join("; "));
    }
    if document["key"].as_str() != Some(key.digest()) {
        return Err("entry key does not match its file name".to_string());
    }
    Ok(())
}

/// Directory of cache entries.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    temp_counter: AtomicU64,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            temp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the entry for `key`.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(key.stage.as_str())
            .join(format!("{}.json", key.digest()))
    }

    /// Load the entry for `key`.
    ///
    /// A missing file is `Ok(None)`. A file that cannot be parsed or does
    /// not match the schema is `Err(CacheError::Corrupt)`.
    pub async fn load(&self, key: &CacheKey) -> Result<Option<Envelope>, CacheError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        let corrupt = |reason: String| CacheError::Corrupt {
            path: path.clone(),
            reason,
        };
        let document: JsonValue =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        validate_document(key, &document).map_err(&corrupt)?;
        let envelope: Envelope =
            serde_json::from_value(document).map_err(|e| corrupt(e.to_string()))?;
        Ok(Some(envelope))
    }

    /// Write the entry for `key` atomically.
    pub async fn store(&self, key: &CacheKey, payload: JsonValue) -> Result<Envelope, CacheError> {
        let path = self.path_for(key);
        let envelope = Envelope::new(key, payload);
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        let dir = path.parent().unwrap_or(&self.root).to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| CacheError::Io {
                path: dir.clone(),
                source,
            })?;

        let tmp = dir.join(format!(
            ".{}.{}.{}.tmp",
            key.digest(),
            std::process::id(),
            self.temp_counter.fetch_add(1, Ordering::SeqCst)
        ));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| CacheError::Io {
                path: tmp.clone(),
                source,
            })?;
        if let Err(source) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CacheError::Io { path, source });
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(query: &str) -> CacheKey {
        let fp = Fingerprint::of(&serde_json::json!({"k": 5})).unwrap();
        CacheKey::new(query, Some("gpt"), Stage::Generation, fp)
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let key = key("q1");

        assert!(store.load(&key).await.unwrap().is_none());

        let written = store
            .store(&key, serde_json::json!({"answer": "Canberra"}))
            .await
            .unwrap();
        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded, written);
        assert_eq!(loaded.model_id.as_deref(), Some("gpt"));

        let path = store.path_for(&key);
        assert!(path.starts_with(dir.path().join("generation")));
        assert!(path.to_string_lossy().ends_with(&format!("{}.json", key.digest())));

        // No temporary files are left behind.
        let leftovers = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .map(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let key = key("q1");
        let path = store.path_for(&key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ not json").unwrap();

        assert!(matches!(
            store.load(&key).await,
            Err(CacheError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let key = key("q1");
        let path = store.path_for(&key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        let mut document = serde_json::to_value(Envelope::new(&key, serde_json::json!(1))).unwrap();
        document["schema_version"] = serde_json::json!(99);
        std::fs::write(&path, serde_json::to_vec(&document).unwrap()).unwrap();

        match store.load(&key).await {
            Err(CacheError::Corrupt { reason, .. }) => assert!(reason.contains("schema_version")),
            other => panic!("expected corrupt entry, got {:?}", other),
        }
    }

    #[test]
    fn test_key_mismatch_rejected() {
        let a = key("q1");
        let b = key("q2");
        let document = serde_json::to_value(Envelope::new(&a, serde_json::json!(null))).unwrap();
        assert!(validate_document(&a, &document).is_ok());
        assert!(validate_document(&b, &document).is_err());
    }
}
