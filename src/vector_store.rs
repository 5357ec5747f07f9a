//! SQLite-backed [`VectorIndex`].
//!
//! Each stored chunk keeps its text, JSON metadata, and embedding BLOB in
//! the `vectors` table. Queries embed the query text and rank every row of
//! the collection by cosine similarity (a linear scan), returning
//! `distance = 1 - similarity`.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use code_context_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use code_context_core::index::VectorIndex;
use code_context_core::models::{ChunkMetadata, IndexDocument, MetadataFilter, SearchHit};

pub struct SqliteVectorIndex {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool, embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            pool,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let out = self.embedder.embed(batch).await?;
            if out.len() != batch.len() {
                bail!(
                    "embedder returned {} vectors for {} texts",
                    out.len(),
                    batch.len()
                );
            }
            vectors.extend(out);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, collection: &str, docs: &[IndexDocument]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();
        let vectors = self.embed_all(&texts).await?;
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;
        for (doc, vector) in docs.iter().zip(vectors.iter()) {
            let metadata_json = serde_json::to_string(&doc.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO vectors (collection, id, file_path, file_extension, text,
                                     metadata_json, embedding, model, dims, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    file_path = excluded.file_path,
                    file_extension = excluded.file_extension,
                    text = excluded.text,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    model = excluded.model,
                    dims = excluded.dims,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(collection)
            .bind(&doc.id)
            .bind(&doc.metadata.file_path)
            .bind(&doc.metadata.file_extension)
            .bind(&doc.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(vector))
            .bind(self.embedder.model_name())
            .bind(vector.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        text: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .context("embedder returned no vector for query")?;

        let file_path = filter.and_then(|f| f.file_path.as_deref());
        let file_extension = filter.and_then(|f| f.file_extension.as_deref());

        let rows = sqlx::query(
            r#"
            SELECT id, text, metadata_json, embedding
            FROM vectors
            WHERE collection = ?
              AND (? IS NULL OR file_path = ?)
              AND (? IS NULL OR file_extension = ?)
            "#,
        )
        .bind(collection)
        .bind(file_path)
        .bind(file_path)
        .bind(file_extension)
        .bind(file_extension)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(f32, String, SearchHit)> = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let metadata_json: String = row.get("metadata_json");
            let metadata: ChunkMetadata = match serde_json::from_str(&metadata_json) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "skipping row with unreadable metadata");
                    continue;
                }
            };
            let blob: Vec<u8> = row.get("embedding");
            let similarity = cosine_similarity(&query_vec, &blob_to_vec(&blob));
            scored.push((
                similarity,
                id,
                SearchHit {
                    text: row.get("text"),
                    metadata,
                    distance: 1.0 - similarity,
                },
            ));
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        scored.truncate(k);
        Ok(scored.into_iter().map(|(_, _, hit)| hit).collect())
    }

    async fn delete_by_metadata(&self, collection: &str, filter: &MetadataFilter) -> Result<usize> {
        let result = sqlx::query(
            r#"
            DELETE FROM vectors
            WHERE collection = ?
              AND (? IS NULL OR file_path = ?)
              AND (? IS NULL OR file_extension = ?)
            "#,
        )
        .bind(collection)
        .bind(filter.file_path.as_deref())
        .bind(filter.file_path.as_deref())
        .bind(filter.file_extension.as_deref())
        .bind(filter.file_extension.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM vectors WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.get("n");
        Ok(n as usize)
    }
}
