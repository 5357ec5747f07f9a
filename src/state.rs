//! Persisted per-project index state.
//!
//! One pretty-printed JSON document per project lives at
//! `<state.dir>/index_state_<collection_id>.json`. Writes go to a temporary
//! file first and are renamed into place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const STATE_PREFIX: &str = "index_state_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexState {
    pub project_root: PathBuf,
    pub collection_id: String,
    /// Absolute file path → SHA-256 hex of the indexed content.
    #[serde(default)]
    pub fingerprints: BTreeMap<String, String>,
    #[serde(default)]
    pub total_chunk_count: usize,
    pub updated_at: DateTime<Utc>,
}

pub fn state_path(state_dir: &Path, collection_id: &str) -> PathBuf {
    state_dir.join(format!("{STATE_PREFIX}{collection_id}.json"))
}

/// Read the state for `collection_id`. `Ok(None)` when nothing was persisted.
pub async fn read_state(state_dir: &Path, collection_id: &str) -> Result<Option<IndexState>> {
    let path = state_path(state_dir, collection_id);
    if !path.exists() {
        return Ok(None);
    }
    read_state_file(&path).await.map(Some)
}

async fn read_state_file(path: &Path) -> Result<IndexState> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read index state: {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse index state: {}", path.display()))
}

pub async fn write_state(state_dir: &Path, state: &IndexState) -> Result<()> {
    tokio::fs::create_dir_all(state_dir)
        .await
        .with_context(|| format!("Failed to create state directory: {}", state_dir.display()))?;

    let path = state_path(state_dir, &state.collection_id);
    let bytes = serde_json::to_vec_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &path)
        .await
        .with_context(|| format!("Failed to write index state: {}", path.display()))?;
    Ok(())
}

/// Remove the persisted state. Returns whether a file existed.
pub async fn delete_state(state_dir: &Path, collection_id: &str) -> Result<bool> {
    let path = state_path(state_dir, collection_id);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
    }
}

/// Every readable state document in `state_dir`, sorted by file name.
///
/// A missing directory yields an empty list. Unreadable documents are
/// logged and skipped.
pub async fn list_states(state_dir: &Path) -> Result<Vec<IndexState>> {
    let mut entries = match tokio::fs::read_dir(state_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to list state directory: {}", state_dir.display()))
        }
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(STATE_PREFIX) && name.ends_with(".json") {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let mut states = Vec::with_capacity(paths.len());
    for path in paths {
        match read_state_file(&path).await {
            Ok(state) => states.push(state),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping index state"),
        }
    }
    Ok(states)
}

/// Size of a file in human-readable units, e.g. `"1.5 KB"`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

/// Human-readable size of the persisted state for `collection_id`.
pub fn state_size(state_dir: &Path, collection_id: &str) -> String {
    std::fs::metadata(state_path(state_dir, collection_id))
        .map(|m| format_file_size(m.len()))
        .unwrap_or_else(|_| format_file_size(0))
}
