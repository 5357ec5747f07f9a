//! Content fingerprints and change tracking.
//!
//! A fingerprint is the lowercase hex SHA-256 of a file's bytes. The
//! [`ChangeTracker`] keeps the last indexed fingerprint per absolute path
//! and decides whether a file has to be re-chunked.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// SHA-256 of `bytes` as lowercase hex.
pub fn digest_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Path → fingerprint map for one project.
///
/// Backed by a `BTreeMap` so serialized state is ordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeTracker {
    fingerprints: BTreeMap<String, String>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from a persisted map.
    pub fn load(fingerprints: BTreeMap<String, String>) -> Self {
        Self { fingerprints }
    }

    /// Snapshot for persistence.
    pub fn save(&self) -> BTreeMap<String, String> {
        self.fingerprints.clone()
    }

    /// `true` when `path` was never indexed, its content changed, or
    /// `force` is set.
    pub fn needs_reindex(&self, path: &str, digest: &str, force: bool) -> bool {
        force || self.fingerprints.get(path).map(String::as_str) != Some(digest)
    }

    pub fn record(&mut self, path: impl Into<String>, digest: impl Into<String>) {
        self.fingerprints.insert(path.into(), digest.into());
    }

    /// Drop `path`. Returns whether it was tracked.
    pub fn forget(&mut self, path: &str) -> bool {
        self.fingerprints.remove(path).is_some()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.fingerprints.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}
