//! Incremental indexing of one project tree.
//!
//! A [`ProjectIndexer`] owns the fingerprint map and chunk total for a
//! single project root. [`ProjectIndexer::index`] walks the tree, re-chunks
//! files whose content digest changed, replaces their chunks in the vector
//! index, and persists the state once per pass.
//!
//! # Pipeline (per file)
//!
//! ```text
//! read bytes ─▶ sha256 ─▶ unchanged? ─yes─▶ skipped
//!                              │no
//!                              ▼
//!         chunk ─▶ delete old chunks ─▶ upsert ─▶ record fingerprint
//! ```
//!
//! Per-file failures are logged and counted; the pass always continues.
//! Passes for one project are serialized by an internal lock.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tokio::sync::Mutex;
use walkdir::WalkDir;

use code_context_core::chunk::Chunker;
use code_context_core::debounce::normalize_extension;
use code_context_core::fingerprint::{digest_bytes, ChangeTracker};
use code_context_core::index::{collection_id, document_id, VectorIndex};
use code_context_core::models::{ChunkMetadata, IndexDocument, IndexSummary, MetadataFilter};

use crate::config::Config;
use crate::state::{self, IndexState};

/// Directory names never descended into while indexing.
pub const SKIP_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "__pycache__",
    "venv",
    "env",
    "dist",
    "build",
    ".next",
    "target",
    "bin",
    "obj",
];

/// Tunables shared by every project's indexer.
#[derive(Debug, Clone)]
pub struct IndexerSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub state_dir: PathBuf,
    /// Bound on delete/count calls to the vector index.
    pub service_timeout: Duration,
    /// Bound on one file's upsert, which includes embedding.
    pub upsert_timeout: Duration,
}

impl IndexerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            state_dir: config.state.dir.clone(),
            service_timeout: config.indexing.service_timeout(),
            upsert_timeout: config.embedding.request_budget(),
        }
    }
}

struct Tracked {
    tracker: ChangeTracker,
    total_chunk_count: usize,
}

pub struct ProjectIndexer {
    root: PathBuf,
    collection: String,
    chunker: Chunker,
    index: Arc<dyn VectorIndex>,
    settings: IndexerSettings,
    tracked: Mutex<Tracked>,
    indexed_files: AtomicUsize,
    total_chunks: AtomicUsize,
}

/// Run `fut`, failing with a descriptive error after `limit`.
pub(crate) async fn bounded<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .with_context(|| format!("{what} timed out after {limit:?}"))?
}

impl ProjectIndexer {
    /// Create the indexer for `root` (already canonical), restoring any
    /// persisted state for its collection.
    pub async fn open(
        root: PathBuf,
        settings: IndexerSettings,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Self> {
        let collection = collection_id(&root);
        let (tracker, total) = match state::read_state(&settings.state_dir, &collection).await {
            Ok(Some(saved)) => (ChangeTracker::load(saved.fingerprints), saved.total_chunk_count),
            Ok(None) => (ChangeTracker::new(), 0),
            Err(e) => {
                tracing::warn!(collection = %collection, error = %e, "ignoring unreadable index state");
                (ChangeTracker::new(), 0)
            }
        };
        tracing::debug!(root = %root.display(), files = tracker.len(), "opened project indexer");

        Ok(Self {
            indexed_files: AtomicUsize::new(tracker.len()),
            total_chunks: AtomicUsize::new(total),
            chunker: Chunker::new(settings.chunk_size, settings.chunk_overlap),
            tracked: Mutex::new(Tracked {
                tracker,
                total_chunk_count: total,
            }),
            root,
            collection,
            index,
            settings,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn collection_id(&self) -> &str {
        &self.collection
    }

    pub fn indexed_file_count(&self) -> usize {
        self.indexed_files.load(Ordering::Relaxed)
    }

    pub fn total_chunk_count(&self) -> usize {
        self.total_chunks.load(Ordering::Relaxed)
    }

    pub fn state_dir(&self) -> &Path {
        &self.settings.state_dir
    }

    /// Run one indexing pass over every file matching `extensions`.
    pub async fn index(&self, extensions: &[String], force: bool) -> Result<IndexSummary> {
        let files = self.enumerate(extensions)?;
        tracing::info!(
            root = %self.root.display(),
            candidates = files.len(),
            force,
            "indexing project"
        );
        self.index_files(&files, force).await
    }

    /// One pass over `files`. A file that vanished since enumeration
    /// counts as failed like any other per-file error.
    async fn index_files(&self, files: &[PathBuf], force: bool) -> Result<IndexSummary> {
        let mut tracked = self.tracked.lock().await;
        let mut summary = IndexSummary::default();
        let mut removed = 0usize;

        for path in files {
            let bytes = match tokio::fs::read(path).await {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot read file");
                    summary.failed_count += 1;
                    continue;
                }
            };
            let digest = digest_bytes(&bytes);
            let key = path.to_string_lossy().to_string();

            if !tracked.tracker.needs_reindex(&key, &digest, force) {
                summary.skipped_count += 1;
                continue;
            }

            let content = String::from_utf8_lossy(&bytes);
            match self.submit_file(path, &content).await {
                Ok((chunks, dropped)) => {
                    tracked.tracker.record(key, digest);
                    summary.indexed_count += 1;
                    summary.chunk_count += chunks;
                    removed += dropped;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to index file");
                    summary.failed_count += 1;
                }
            }
        }

        let counted = bounded(
            self.settings.service_timeout,
            "count",
            self.index.count(&self.collection),
        )
        .await;
        tracked.total_chunk_count = match counted {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "chunk count unavailable, estimating");
                (tracked.total_chunk_count + summary.chunk_count).saturating_sub(removed)
            }
        };

        self.publish(&tracked);
        if let Err(e) = self.write(&tracked).await {
            tracing::error!(collection = %self.collection, error = %e, "failed to persist index state");
        }

        tracing::info!(
            root = %self.root.display(),
            indexed = summary.indexed_count,
            chunks = summary.chunk_count,
            skipped = summary.skipped_count,
            failed = summary.failed_count,
            total_chunks = tracked.total_chunk_count,
            "indexing complete"
        );
        Ok(summary)
    }

    /// Drop a deleted file's chunks and fingerprint. Returns the number
    /// of chunks removed.
    pub async fn remove_file(&self, path: &Path) -> Result<usize> {
        let mut tracked = self.tracked.lock().await;
        let rel = self.relative(path);
        let removed = bounded(
            self.settings.service_timeout,
            "delete",
            self.index
                .delete_by_metadata(&self.collection, &MetadataFilter::file_path(rel.as_str())),
        )
        .await?;

        tracked.tracker.forget(&path.to_string_lossy());
        tracked.total_chunk_count = tracked.total_chunk_count.saturating_sub(removed);
        self.publish(&tracked);
        self.write(&tracked).await?;
        tracing::info!(file = %rel, removed, "removed deleted file from index");
        Ok(removed)
    }

    /// Remove every chunk of this project and its persisted state.
    pub async fn clear(&self) -> Result<usize> {
        let mut tracked = self.tracked.lock().await;
        let removed = bounded(
            self.settings.service_timeout,
            "delete",
            self.index
                .delete_by_metadata(&self.collection, &MetadataFilter::default()),
        )
        .await?;
        tracked.tracker = ChangeTracker::new();
        tracked.total_chunk_count = 0;
        self.publish(&tracked);
        state::delete_state(&self.settings.state_dir, &self.collection).await?;
        Ok(removed)
    }

    /// Write the current state to disk.
    pub async fn persist(&self) -> Result<()> {
        let tracked = self.tracked.lock().await;
        self.write(&tracked).await
    }

    fn publish(&self, tracked: &Tracked) {
        self.indexed_files
            .store(tracked.tracker.len(), Ordering::Relaxed);
        self.total_chunks
            .store(tracked.total_chunk_count, Ordering::Relaxed);
    }

    async fn write(&self, tracked: &Tracked) -> Result<()> {
        let snapshot = IndexState {
            project_root: self.root.clone(),
            collection_id: self.collection.clone(),
            fingerprints: tracked.tracker.save(),
            total_chunk_count: tracked.total_chunk_count,
            updated_at: Utc::now(),
        };
        state::write_state(&self.settings.state_dir, &snapshot).await
    }

    /// Chunk one file and replace its chunks in the index.
    /// Returns `(chunks submitted, stale chunks deleted)`.
    async fn submit_file(&self, path: &Path, content: &str) -> Result<(usize, usize)> {
        let rel = self.relative(path);
        let ext = path
            .extension()
            .map(|e| normalize_extension(&e.to_string_lossy()))
            .unwrap_or_default();
        let chunks = self.chunker.parse(content, &ext);

        let removed = bounded(
            self.settings.service_timeout,
            "delete",
            self.index
                .delete_by_metadata(&self.collection, &MetadataFilter::file_path(rel.as_str())),
        )
        .await?;

        if chunks.is_empty() {
            return Ok((0, removed));
        }

        let full_path = path.to_string_lossy().to_string();
        let docs: Vec<IndexDocument> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| IndexDocument {
                id: document_id(&rel, i),
                metadata: ChunkMetadata {
                    file_path: rel.clone(),
                    full_path: full_path.clone(),
                    file_extension: ext.clone(),
                    chunk_index: i,
                    chunk_type: chunk.kind,
                    start_line: chunk.start_line,
                    end_line: chunk.end_line,
                    function_name: chunk.function_name,
                    class_name: chunk.class_name,
                },
                text: chunk.content,
            })
            .collect();

        bounded(
            self.settings.upsert_timeout,
            "upsert",
            self.index.upsert(&self.collection, &docs),
        )
        .await?;
        Ok((docs.len(), removed))
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Files under the root matching `extensions`, in sorted walk order.
    fn enumerate(&self, extensions: &[String]) -> Result<Vec<PathBuf>> {
        let matcher = build_extension_set(extensions)?;
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e));

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if matcher.is_match(name.as_ref()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|n| SKIP_DIRS.contains(&n))
}

fn build_extension_set(extensions: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for ext in extensions {
        let pattern = format!("*{}", normalize_extension(ext));
        builder.add(GlobBuilder::new(&pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}
