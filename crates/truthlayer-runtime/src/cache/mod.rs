//! Content-addressed response cache.
//!
//! Two layers sit behind one call, [`ResponseCache::get_or_compute`]:
//!
//! 1. A bounded moka cache. `try_get_with` coalesces concurrent lookups of
//!    the same key, so the loader below runs at most once per key at a time
//!    and every waiter receives its result.
//! 2. A [`FileStore`] of JSON envelopes that survives across runs.
//!
//! On a miss in both, `compute` runs and its result is written through.
//! Errors from `compute` are returned to every waiter and never stored.
//! Entries that fail to parse or validate are logged as incidents and
//! recomputed.

mod store;

pub use store::{validate_document, Envelope, FileStore, SCHEMA_VERSION};

use std::any::Any;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use moka::future::Cache;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use truthlayer_core::CacheKey;

/// Errors from the cache layers.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache entry {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Failed to encode cache payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Cache entry schema unavailable: {0}")]
    Schema(String),
}

/// A per-key cache problem reported in the run error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheIncident {
    pub key: String,
    pub stage: String,
    pub query_id: String,
    pub model_id: Option<String>,
    pub error: String,

    /// Unreadable entry (as opposed to a failed write)
    pub corrupt: bool,
}

/// Lookup counters for one cache instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Calls to `get_or_compute`
    pub lookups: usize,

    /// Loaded from the file store
    pub disk_hits: usize,

    /// Computed fresh
    pub computed: usize,

    /// Entries found corrupt and recomputed
    pub corrupt: usize,
}

type Slot = Arc<dyn Any + Send + Sync>;

/// The response cache.
pub struct ResponseCache {
    memory: Cache<CacheKey, Slot>,
    store: FileStore,
    incidents: Mutex<Vec<CacheIncident>>,
    lookups: AtomicUsize,
    disk_hits: AtomicUsize,
    computed: AtomicUsize,
    corrupt: AtomicUsize,
}

impl ResponseCache {
    /// Cache rooted at `dir`, keeping up to `max_entries` in memory.
    pub fn new(dir: impl Into<PathBuf>, max_entries: u64) -> Self {
        Self {
            memory: Cache::builder().max_capacity(max_entries).build(),
            store: FileStore::new(dir),
            incidents: Mutex::new(Vec::new()),
            lookups: AtomicUsize::new(0),
            disk_hits: AtomicUsize::new(0),
            computed: AtomicUsize::new(0),
            corrupt: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Return the payload for `key`, computing it at most once.
    ///
    /// Concurrent callers with an equal key attach to the one in-flight
    /// computation. A failed computation is handed to all of them and the
    /// next caller tries again. Requesting one key as two different types
    /// is reported as a corrupt entry.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &CacheKey, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        E: From<CacheError> + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let loader = async {
            if let Some(value) = self.load::<T>(key).await {
                self.disk_hits.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(key = %key, query_id = %key.query_id, "Cache hit (disk)");
                return Ok(Arc::new(value) as Slot);
            }

            let value = compute().await?;
            self.computed.fetch_add(1, Ordering::SeqCst);
            self.persist(key, &value).await;
            Ok(Arc::new(value) as Slot)
        };

        let slot = self
            .memory
            .try_get_with(key.clone(), loader)
            .await
            .map_err(|e: Arc<E>| (*e).clone())?;

        match slot.downcast_ref::<T>() {
            Some(value) => Ok(value.clone()),
            None => {
                self.memory.invalidate(key).await;
                Err(CacheError::Corrupt {
                    path: self.store.path_for(key),
                    reason: "cached value has a different type".to_string(),
                }
                .into())
            }
        }
    }

    /// Drain the incidents recorded since the last call.
    pub fn take_incidents(&self) -> Vec<CacheIncident> {
        std::mem::take(&mut *self.incidents.lock())
    }

    /// Lookup counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            lookups: self.lookups.load(Ordering::SeqCst),
            disk_hits: self.disk_hits.load(Ordering::SeqCst),
            computed: self.computed.load(Ordering::SeqCst),
            corrupt: self.corrupt.load(Ordering::SeqCst),
        }
    }

    async fn load<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let result = match self.store.load(key).await {
            Ok(None) => return None,
            Ok(Some(envelope)) => serde_json::from_value::<T>(envelope.payload).map_err(|e| {
                CacheError::Corrupt {
                    path: self.store.path_for(key),
                    reason: format!("payload does not decode: {}", e),
                }
            }),
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.corrupt.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                self.report(key, &e, true);
                None
            }
        }
    }

    async fn persist<T: Serialize>(&self, key: &CacheKey, value: &T) {
        let result = match serde_json::to_value(value) {
            Ok(payload) => self.store.store(key, payload).await.map(|_| ()),
            Err(e) => Err(CacheError::from(e)),
        };
        if let Err(e) = result {
            tracing::warn!(key = %key, error = %e, "Failed to persist cache entry");
            self.report(key, &e, false);
        }
    }

    fn report(&self, key: &CacheKey, error: &CacheError, corrupt: bool) {
        self.incidents.lock().push(CacheIncident {
            key: key.digest().to_string(),
            stage: key.stage.to_string(),
            query_id: key.query_id.clone(),
            model_id: key.model_id.clone(),
            error: error.to_string(),
            corrupt,
        });
    }
}
