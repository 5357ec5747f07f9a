//! Query result cache over an external key/value store.
//!
//! [`KvStore`] is the minimal store contract. [`QueryCache`] derives
//! per-project keys and turns every backend failure into a miss, so a
//! broken cache only costs a recomputation.
//!
//! Keys look like `rag:query:<project hash>:<query hash>` where the
//! project hash is the first 8 hex digits of SHA-256 over the project
//! identifier and the query hash is the full SHA-256 of the query text.

pub mod memory;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::fingerprint::digest_bytes;

/// Namespace shared by all query cache keys.
pub const KEY_PREFIX: &str = "rag:query:";

/// Default entry lifetime in seconds.
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Key/value store with per-entry expiry.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete every key starting with `prefix`. Returns how many went.
    async fn scan_and_delete(&self, prefix: &str) -> Result<usize>;

    /// Connectivity check used at startup.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Key prefix covering every cached query of `project`.
pub fn project_prefix(project: &str) -> String {
    let hash = digest_bytes(project.as_bytes());
    format!("{KEY_PREFIX}{}:", &hash[..8])
}

/// Cache key for (`project`, `query`).
pub fn cache_key(project: &str, query: &str) -> String {
    format!("{}{}", project_prefix(project), digest_bytes(query.as_bytes()))
}

/// Fail-soft cache of assembled contexts.
#[derive(Clone)]
pub struct QueryCache {
    store: Arc<dyn KvStore>,
    ttl_secs: u64,
}

impl QueryCache {
    pub fn new(store: Arc<dyn KvStore>, ttl_secs: u64) -> Self {
        Self { store, ttl_secs }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub async fn get(&self, project: &str, query: &str) -> Option<String> {
        let key = cache_key(project, query);
        match self.store.get(&key).await {
            Ok(hit) => {
                tracing::debug!(key = %key, hit = hit.is_some(), "query cache lookup");
                hit
            }
            Err(e) => {
                tracing::warn!(error = %e, "query cache get failed");
                None
            }
        }
    }

    pub async fn set(&self, project: &str, query: &str, value: &str) -> bool {
        match self.store.set(&cache_key(project, query), value, self.ttl_secs).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "query cache set failed");
                false
            }
        }
    }

    pub async fn delete(&self, project: &str, query: &str) -> bool {
        match self.store.delete(&cache_key(project, query)).await {
            Ok(existed) => existed,
            Err(e) => {
                tracing::warn!(error = %e, "query cache delete failed");
                false
            }
        }
    }

    /// Drop every cached query for `project`.
    pub async fn clear_project(&self, project: &str) -> usize {
        match self.store.scan_and_delete(&project_prefix(project)).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "query cache clear failed");
                0
            }
        }
    }
}
