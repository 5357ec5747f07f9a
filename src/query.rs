//! Query orchestration for one project.
//!
//! Cache first, then top-k search, then token-budgeted assembly. Results
//! keep the order the vector index returned them in.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use code_context_core::budget::TokenBudgeter;
use code_context_core::cache::QueryCache;
use code_context_core::index::VectorIndex;

use crate::indexer::bounded;

/// Assembled context plus bookkeeping for callers that report it.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub context: String,
    /// Chunks returned by the search; unknown for cache hits.
    pub hits: Option<usize>,
    pub token_count: usize,
    pub cached: bool,
}

pub fn no_context_response(query: &str) -> String {
    format!("Query: {query}\n\nNo relevant code context found.")
}

pub struct QueryEngine {
    project: String,
    collection: String,
    index: Arc<dyn VectorIndex>,
    budgeter: TokenBudgeter,
    cache: Option<QueryCache>,
    search_timeout: Duration,
}

impl QueryEngine {
    pub fn new(
        project: String,
        collection: String,
        index: Arc<dyn VectorIndex>,
        budgeter: TokenBudgeter,
        cache: Option<QueryCache>,
        search_timeout: Duration,
    ) -> Self {
        Self {
            project,
            collection,
            index,
            budgeter,
            cache,
            search_timeout,
        }
    }

    pub async fn query(&self, text: &str, max_results: usize) -> QueryOutcome {
        if let Some(cache) = &self.cache {
            if let Some(context) = cache.get(&self.project, text).await {
                tracing::debug!(project = %self.project, "query cache hit");
                return QueryOutcome {
                    token_count: self.budgeter.count(&context),
                    context,
                    hits: None,
                    cached: true,
                };
            }
        }

        let searched = bounded(
            self.search_timeout,
            "search",
            self.index.query(&self.collection, text, max_results, None),
        )
        .await;
        let hits = match searched {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(project = %self.project, error = %e, "search failed");
                Vec::new()
            }
        };

        if hits.is_empty() {
            let context = no_context_response(text);
            return QueryOutcome {
                token_count: self.budgeter.count(&context),
                context,
                hits: Some(0),
                cached: false,
            };
        }

        let context = self.budgeter.assemble(text, &hits);
        if let Some(cache) = &self.cache {
            cache.set(&self.project, text, &context).await;
        }
        tracing::debug!(project = %self.project, hits = hits.len(), "assembled context");

        QueryOutcome {
            token_count: self.budgeter.count(&context),
            context,
            hits: Some(hits.len()),
            cached: false,
        }
    }

    /// Drop every cached query of this project.
    pub async fn clear_cache(&self) -> usize {
        match &self.cache {
            Some(cache) => cache.clear_project(&self.project).await,
            None => 0,
        }
    }
}
