//! In-memory [`VectorIndex`] for tests and embedding-free runs.
//!
//! Documents live in a `HashMap` behind `std::sync::RwLock`. Relevance is
//! term overlap: the fraction of distinct query terms that appear in a
//! document, turned into a distance as `1 - score`. Documents sharing no
//! term with the query are not returned.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{IndexDocument, MetadataFilter, SearchHit};

use super::VectorIndex;

#[derive(Default)]
struct Collection {
    /// Insertion order, used to break score ties.
    order: Vec<String>,
    docs: HashMap<String, IndexDocument>,
}

/// In-memory index keyed by collection.
#[derive(Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids stored in `collection`, in insertion order.
    pub fn ids(&self, collection: &str) -> Vec<String> {
        let guard = self.collections.read().unwrap_or_else(|e| e.into_inner());
        guard
            .get(collection)
            .map(|c| c.order.clone())
            .unwrap_or_default()
    }
}

fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, collection: &str, docs: &[IndexDocument]) -> Result<()> {
        let mut guard = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let coll = guard.entry(collection.to_string()).or_default();
        for doc in docs {
            if coll.docs.insert(doc.id.clone(), doc.clone()).is_none() {
                coll.order.push(doc.id.clone());
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        text: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>> {
        let query_terms = terms(text);
        if query_terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let guard = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let Some(coll) = guard.get(collection) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<SearchHit> = coll
            .order
            .iter()
            .filter_map(|id| coll.docs.get(id))
            .filter(|doc| filter.map_or(true, |f| f.matches(&doc.metadata)))
            .filter_map(|doc| {
                let doc_terms = terms(&doc.text);
                let matched = query_terms.iter().filter(|t| doc_terms.contains(*t)).count();
                if matched == 0 {
                    return None;
                }
                let score = matched as f32 / query_terms.len() as f32;
                Some(SearchHit {
                    text: doc.text.clone(),
                    metadata: doc.metadata.clone(),
                    distance: 1.0 - score,
                })
            })
            .collect();

        // Stable sort keeps insertion order among equal distances.
        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_by_metadata(&self, collection: &str, filter: &MetadataFilter) -> Result<usize> {
        let mut guard = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let Some(coll) = guard.get_mut(collection) else {
            return Ok(0);
        };
        let before = coll.docs.len();
        coll.docs.retain(|_, doc| !filter.matches(&doc.metadata));
        let docs = &coll.docs;
        coll.order.retain(|id| docs.contains_key(id));
        Ok(before - coll.docs.len())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let guard = self.collections.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.get(collection).map_or(0, |c| c.docs.len()))
    }
}
