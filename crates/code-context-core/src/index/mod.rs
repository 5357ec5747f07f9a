//! Embedding search service abstraction.
//!
//! The [`VectorIndex`] trait is the contract between the indexing/query
//! pipeline and whatever stores and searches embedded chunks. Collections
//! are per project and addressed by [`collection_id`].
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | `upsert` | Insert or replace documents by id |
//! | `query` | Top-k documents by ascending distance |
//! | `delete_by_metadata` | Remove every document matching a filter |
//! | `count` | Number of documents in a collection |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::fingerprint::digest_bytes;
use crate::models::{IndexDocument, MetadataFilter, SearchHit};

/// Abstract embedding search backend.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace `docs` (matched by id) in `collection`.
    async fn upsert(&self, collection: &str, docs: &[IndexDocument]) -> Result<()>;

    /// Up to `k` documents most relevant to `text`, ordered by ascending
    /// distance.
    async fn query(
        &self,
        collection: &str,
        text: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>>;

    /// Remove all documents matching `filter`. Returns how many went.
    async fn delete_by_metadata(&self, collection: &str, filter: &MetadataFilter) -> Result<usize>;

    async fn count(&self, collection: &str) -> Result<usize>;
}

/// Collection identifier for a project root:
/// `code_chunks_<dir name>_<first 8 hex of sha256(root)>`.
///
/// The directory name is reduced to `[A-Za-z0-9_-]` so the id is safe in
/// file names.
pub fn collection_id(root: &Path) -> String {
    let name: String = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string())
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let hash = digest_bytes(root.to_string_lossy().as_bytes());
    format!("code_chunks_{name}_{}", &hash[..8])
}

/// Document id for the `chunk_index`-th chunk of a file.
pub fn document_id(file_path: &str, chunk_index: usize) -> String {
    format!("{file_path}_{chunk_index}")
}
