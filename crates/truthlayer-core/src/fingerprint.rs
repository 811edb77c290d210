//! Content addressing for cache keys.
//!
//! A cache key is the SHA-256 of `{query_id, model_id, stage, fingerprint}`
//! serialized as canonical JSON (object keys sorted). The fingerprint is
//! itself a SHA-256 over every parameter that affects the stage's output,
//! so changing any parameter yields a new key instead of colliding with an
//! old one.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Pipeline stage a cache entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Retrieval,
    Generation,
    Verification,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Retrieval => "retrieval",
            Stage::Generation => "generation",
            Stage::Verification => "verification",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hex digest of the parameters that shape a stage's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint any serializable parameter set.
    pub fn of<T: Serialize>(params: &T) -> Result<Self, serde_json::Error> {
        Ok(Self(hex::encode(canonical_digest(params)?)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content-addressed cache key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheKey {
    pub query_id: String,
    pub model_id: Option<String>,
    pub stage: Stage,
    pub fingerprint: Fingerprint,
    digest: String,
}

impl CacheKey {
    /// Derive a key. `model_id` is `None` for model-independent stages.
    pub fn new(
        query_id: impl Into<String>,
        model_id: Option<&str>,
        stage: Stage,
        fingerprint: Fingerprint,
    ) -> Self {
        let query_id = query_id.into();
        // Keys in sorted order; rendering a Value cannot fail.
        let material = serde_json::json!({
            "fingerprint": fingerprint.as_str(),
            "model_id": model_id,
            "query_id": query_id,
            "stage": stage.as_str(),
        });
        let digest = hex::encode(Sha256::digest(material.to_string().as_bytes()));

        Self {
            query_id,
            model_id: model_id.map(str::to_string),
            stage,
            fingerprint,
            digest,
        }
    }

    /// Full hex digest; also the entry's file name.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Shortened digest used for record ids.
    pub fn short_id(&self) -> &str {
        &self.digest[..16.min(self.digest.len())]
    }
}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Eq for CacheKey {}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stage, self.short_id())
    }
}

/// Normalize text for hashing and comparison: lowercase, collapse
/// whitespace, strip surrounding punctuation.
pub fn normalize_text(s: &str) -> String {
    const PUNCT: &[char] = &[
        ' ', '.', ',', ':', ';', '!', '?', '"', '\'', '(', ')', '[', ']', '{', '}',
    ];
    let lowered = s.to_lowercase();
    lowered
        .trim_matches(PUNCT)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 hex of the normalized text.
pub fn text_hash(s: &str) -> String {
    hex::encode(Sha256::digest(normalize_text(s).as_bytes()))
}

fn canonical_digest<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    // Going through Value sorts object keys.
    let value = serde_json::to_value(value)?;
    let bytes = serde_json::to_vec(&value)?;
    Ok(Sha256::digest(&bytes).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct Params {
        k: usize,
        template: &'static str,
    }

    #[test]
    fn test_identical_inputs_identical_key() {
        let fp = Fingerprint::of(&Params { k: 3, template: "t" }).unwrap();
        let a = CacheKey::new("q1", Some("gpt"), Stage::Generation, fp.clone());
        let b = CacheKey::new("q1", Some("gpt"), Stage::Generation, fp);
        assert_eq!(a, b);
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_changed_parameter_changes_key() {
        let a = CacheKey::new(
            "q1",
            Some("gpt"),
            Stage::Generation,
            Fingerprint::of(&Params { k: 3, template: "t" }).unwrap(),
        );
        let b = CacheKey::new(
            "q1",
            Some("gpt"),
            Stage::Generation,
            Fingerprint::of(&Params { k: 4, template: "t" }).unwrap(),
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_stage_and_model_separate_keys() {
        let fp = Fingerprint::of(&Params { k: 3, template: "t" }).unwrap();
        let retrieval = CacheKey::new("q1", None, Stage::Retrieval, fp.clone());
        let generation = CacheKey::new("q1", None, Stage::Generation, fp.clone());
        let model_a = CacheKey::new("q1", Some("a"), Stage::Generation, fp.clone());
        let model_b = CacheKey::new("q1", Some("b"), Stage::Generation, fp);
        assert_ne!(retrieval, generation);
        assert_ne!(generation, model_a);
        assert_ne!(model_a, model_b);
    }

    #[test]
    fn test_key_digest_is_sha256_of_sorted_json() {
        let fp = Fingerprint::of(&Params { k: 3, template: "t" }).unwrap();
        let key = CacheKey::new("q1", None, Stage::Retrieval, fp.clone());
        let material = format!(
            r#"{{"fingerprint":"{}","model_id":null,"query_id":"q1","stage":"retrieval"}}"#,
            fp
        );
        assert_eq!(key.digest(), hex::encode(Sha256::digest(material.as_bytes())));

        let quoted = CacheKey::new("q\"1", Some("m"), Stage::Retrieval, fp);
        assert_ne!(quoted.digest(), key.digest());
        assert_eq!(quoted.digest().len(), 64);
    }

    #[test]
    fn test_map_order_does_not_matter() {
        let mut first = HashMap::new();
        first.insert("alpha", 1);
        first.insert("beta", 2);
        let mut second = HashMap::new();
        second.insert("beta", 2);
        second.insert("alpha", 1);
        assert_eq!(
            Fingerprint::of(&first).unwrap(),
            Fingerprint::of(&second).unwrap()
        );
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  The  Nile, "), "the nile");
        assert_eq!(text_hash("The Nile."), text_hash("the   nile"));
    }
}
