//! Scope-keyed, fingerprint-validated result cache
//!
//! Each scope (one file URL, one range list, one ad-hoc input set) owns one
//! [`CacheEntry`] mapping candidate endpoints to their latest results. The
//! entry records a fast content fingerprint of the scope's literal input;
//! when the input changes the fingerprint changes and the stale entry is
//! discarded by the orchestrator before probing resumes.
//!
//! The store is injected into the orchestrator, never ambient.

use crate::proxy::models::EnrichedResult;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Fast, non-cryptographic hash of a scope's literal input content
pub fn fingerprint(content: &[u8]) -> u32 {
    crc32fast::hash(content)
}

/// Cached results for one scope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint of the input content these results were derived from
    pub fingerprint: u32,
    /// Candidate endpoint -> latest result
    pub results: BTreeMap<String, EnrichedResult>,
}

impl CacheEntry {
    pub fn new(fingerprint: u32) -> Self {
        Self {
            fingerprint,
            results: BTreeMap::new(),
        }
    }
}

/// Persistence seam for cache entries
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn get(&self, scope_key: &str) -> Result<Option<CacheEntry>>;
    async fn put(&self, scope_key: &str, entry: &CacheEntry) -> Result<()>;
}

/// In-memory store for tests and one-shot runs
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn get(&self, scope_key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.lock().await.get(scope_key).cloned())
    }

    async fn put(&self, scope_key: &str, entry: &CacheEntry) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(scope_key.to_string(), entry.clone());
        Ok(())
    }
}

/// File-backed store: one JSON document mapping scope keys to entries.
/// The whole document is rewritten on every put; entries are small and a
/// put happens once per batch, not per probe.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file starts empty; a corrupt
    /// file is treated as empty rather than refusing to run.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cache file unreadable, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }
}

#[async_trait]
impl ResultStore for JsonFileStore {
    async fn get(&self, scope_key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.lock().await.get(scope_key).cloned())
    }

    async fn put(&self, scope_key: &str, entry: &CacheEntry) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(scope_key.to_string(), entry.clone());
        let doc = serde_json::to_vec_pretty(&*entries).map_err(|e| Error::Store(e.to_string()))?;
        tokio::fs::write(&self.path, doc)
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        debug!(path = %self.path.display(), scope_key, "cache entry persisted");
        Ok(())
    }
}
