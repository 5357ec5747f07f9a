//! Service bootstrap shared by the CLI and the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::SqlitePool;

use code_context_core::budget::TokenBudgeter;
use code_context_core::cache::{KvStore, QueryCache};
use code_context_core::index::VectorIndex;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::indexer::IndexerSettings;
use crate::kv_store::SqliteKvStore;
use crate::tokens::load_encoding;
use crate::vector_store::SqliteVectorIndex;
use crate::{db, migrate};

/// Collaborators every project is built from.
#[derive(Clone)]
pub struct Services {
    pub settings: IndexerSettings,
    pub index: Arc<dyn VectorIndex>,
    pub budgeter: TokenBudgeter,
    pub cache: Option<QueryCache>,
    pub search_timeout: Duration,
    pub embedding_model: String,
    pub default_extensions: Vec<String>,
}

impl Services {
    /// Open the database, run migrations, and wire the configured
    /// embedder, tokenizer, and cache.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;

        let embedder = create_embedder(&config.embedding)?;
        tracing::info!(
            provider = %config.embedding.provider,
            model = embedder.model_name(),
            dims = embedder.dims(),
            "embedding provider ready"
        );
        let index = Arc::new(SqliteVectorIndex::new(
            pool.clone(),
            embedder,
            config.embedding.batch_size,
        ));
        let budgeter = TokenBudgeter::new(load_encoding(&config.context), config.context.max_tokens);

        Ok(Self {
            settings: IndexerSettings::from_config(config),
            index,
            budgeter,
            cache: open_cache(config, pool).await,
            search_timeout: config.embedding.request_budget(),
            embedding_model: config.embedding.model.clone(),
            default_extensions: config.indexing.extensions.clone(),
        })
    }
}

/// The query cache, or `None` when disabled or unreachable.
async fn open_cache(config: &Config, pool: SqlitePool) -> Option<QueryCache> {
    if !config.cache.enabled {
        tracing::debug!("query cache disabled");
        return None;
    }

    let store = SqliteKvStore::new(pool, config.indexing.service_timeout());
    if let Err(e) = store.ping().await {
        tracing::warn!(error = %e, "query cache unavailable, continuing without it");
        return None;
    }
    match store.purge_expired().await {
        Ok(0) => {}
        Ok(n) => tracing::debug!(purged = n, "dropped expired cache entries"),
        Err(e) => tracing::warn!(error = %e, "failed to purge expired cache entries"),
    }

    tracing::info!(ttl_secs = config.cache.ttl_secs, "query cache enabled");
    Some(QueryCache::new(Arc::new(store), config.cache.ttl_secs))
}
