//! Core data models shared by the chunker, the indexer and the query path.
//!
//! A [`Chunk`] is what the chunker produces from one file. The indexer
//! annotates it with file-level facts into a [`ChunkMetadata`] and submits
//! it to the embedding search service as an [`IndexDocument`]. Queries come
//! back as [`SearchHit`]s carrying the same metadata.

use serde::{Deserialize, Serialize};

/// Kind tag carried by every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Code,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Code => "code",
        }
    }
}

/// A contiguous run of source lines produced by the chunker.
///
/// Line numbers are 1-based and inclusive; `1 <= start_line <= end_line`.
/// Consecutive chunks may overlap by a few lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    pub kind: ChunkKind,
    pub start_line: usize,
    pub end_line: usize,
    pub function_name: Option<String>,
    pub class_name: Option<String>,
}

/// Chunk position and scope information plus the file facts attached
/// by the indexer. Stored alongside the embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Path relative to the project root, `/`-separated.
    pub file_path: String,
    /// Absolute path on disk.
    pub full_path: String,
    /// Lowercased extension with leading dot, e.g. `.py`.
    pub file_extension: String,
    pub chunk_index: usize,
    pub chunk_type: ChunkKind,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

/// One unit submitted to a [`VectorIndex`](crate::index::VectorIndex).
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    /// `<relative path>_<chunk index>`.
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A ranked result from the embedding search service.
///
/// Lower `distance` means more relevant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
}

/// Exact-match filter over chunk metadata. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    pub file_path: Option<String>,
    pub file_extension: Option<String>,
}

impl MetadataFilter {
    pub fn file_path(path: impl Into<String>) -> Self {
        Self {
            file_path: Some(path.into()),
            file_extension: None,
        }
    }

    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        self.file_path.as_ref().map_or(true, |p| *p == meta.file_path)
            && self
                .file_extension
                .as_ref()
                .map_or(true, |e| *e == meta.file_extension)
    }
}

/// Outcome of one indexing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    /// Files chunked and submitted during this pass.
    pub indexed_count: usize,
    /// Chunks submitted during this pass.
    pub chunk_count: usize,
    /// Files whose fingerprint was unchanged.
    pub skipped_count: usize,
    /// Files that failed to hash, read, or submit.
    pub failed_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(path: &str, ext: &str) -> ChunkMetadata {
        ChunkMetadata {
            file_path: path.to_string(),
            full_path: format!("/p/{path}"),
            file_extension: ext.to_string(),
            chunk_index: 0,
            chunk_type: ChunkKind::Code,
            start_line: 1,
            end_line: 3,
            function_name: None,
            class_name: None,
        }
    }

    #[test]
    fn test_filter_matches() {
        let m = meta("src/a.py", ".py");
        assert!(MetadataFilter::default().matches(&m));
        assert!(MetadataFilter::file_path("src/a.py").matches(&m));
        assert!(!MetadataFilter::file_path("src/b.py").matches(&m));
        let by_ext = MetadataFilter {
            file_path: None,
            file_extension: Some(".js".to_string()),
        };
        assert!(!by_ext.matches(&m));
    }

    #[test]
    fn test_metadata_json_shape() {
        let json = serde_json::to_value(meta("a.py", ".py")).unwrap();
        assert_eq!(json["chunk_type"], "code");
        assert!(json.get("function_name").is_none());
    }
}
