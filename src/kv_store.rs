//! SQLite-backed [`KvStore`] for the query cache.
//!
//! Entries carry an absolute expiry in unix milliseconds. Reads ignore
//! expired rows; [`SqliteKvStore::purge_expired`] removes them. Every call
//! is bounded by the configured service timeout.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use code_context_core::cache::KvStore;

pub struct SqliteKvStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteKvStore {
    pub fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn bounded<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .with_context(|| format!("kv {what} timed out after {:?}", self.timeout))?
    }

    /// Delete expired rows. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<usize> {
        self.bounded("purge", async {
            let result = sqlx::query("DELETE FROM kv_cache WHERE expires_at <= ?")
                .bind(now_millis())
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() as usize)
        })
        .await
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `LIKE` pattern matching keys that start with `prefix`.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.bounded("get", async {
            let row = sqlx::query("SELECT value FROM kv_cache WHERE key = ? AND expires_at > ?")
                .bind(key)
                .bind(now_millis())
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(|r| r.get::<String, _>("value")))
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let ttl_millis = i64::try_from(ttl_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        let expires_at = now_millis().saturating_add(ttl_millis);
        self.bounded("set", async {
            sqlx::query(
                r#"
                INSERT INTO kv_cache (key, value, expires_at) VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.bounded("delete", async {
            let result = sqlx::query("DELETE FROM kv_cache WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn scan_and_delete(&self, prefix: &str) -> Result<usize> {
        let pattern = like_prefix(prefix);
        self.bounded("scan_and_delete", async {
            let result = sqlx::query("DELETE FROM kv_cache WHERE key LIKE ? ESCAPE '\\'")
                .bind(&pattern)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() as usize)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.bounded("ping", async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }
}
