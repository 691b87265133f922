//! Shared cache stored in the unlogged `cache_entries` table.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use feedplan_db::queries::cache as cache_db;

use super::{CacheBackend, CacheError};

/// Cache shared by every process connected to the database.
#[derive(Debug, Clone)]
pub struct PgCache {
    pool: PgPool,
}

impl PgCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Remove expired rows. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        cache_db::purge_expired(&self.pool).await.map_err(unavailable)
    }
}

fn unavailable(err: anyhow::Error) -> CacheError {
    CacheError::Unavailable(format!("{err:#}"))
}

#[async_trait]
impl CacheBackend for PgCache {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        cache_db::get_entry(&self.pool, key).await.map_err(unavailable)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        cache_db::set_entry(&self.pool, key, &value, ttl_ms)
            .await
            .map_err(unavailable)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        cache_db::delete_entry(&self.pool, key).await.map_err(unavailable)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        cache_db::delete_prefix(&self.pool, prefix)
            .await
            .map_err(unavailable)
    }
}
