//! Database query functions for the `cache_entries` table.
//!
//! Expiry is checked on read; [`purge_expired`] reclaims the rows.

use anyhow::{Context, Result};
use sqlx::PgPool;

/// Fetch a live value.
pub async fn get_entry(pool: &PgPool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar(
        "SELECT value FROM cache_entries WHERE key = $1 AND expires_at > now()",
    )
    .bind(key)
    .fetch_optional(pool)
    .await
    .context("failed to read cache entry")?;

    Ok(value)
}

/// Store a value that expires `ttl_ms` milliseconds from now.
pub async fn set_entry(pool: &PgPool, key: &str, value: &str, ttl_ms: i64) -> Result<()> {
    sqlx::query(
        "INSERT INTO cache_entries (key, value, expires_at) \
         VALUES ($1, $2, now() + make_interval(secs => $3::double precision / 1000)) \
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at",
    )
    .bind(key)
    .bind(value)
    .bind(ttl_ms)
    .execute(pool)
    .await
    .context("failed to write cache entry")?;

    Ok(())
}

/// Delete one key. Returns whether it existed.
pub async fn delete_entry(pool: &PgPool, key: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM cache_entries WHERE key = $1")
        .bind(key)
        .execute(pool)
        .await
        .context("failed to delete cache entry")?;

    Ok(result.rows_affected() > 0)
}

/// Delete every key starting with `prefix`. Returns the number removed.
pub async fn delete_prefix(pool: &PgPool, prefix: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM cache_entries WHERE starts_with(key, $1)")
        .bind(prefix)
        .execute(pool)
        .await
        .context("failed to delete cache entries by prefix")?;

    Ok(result.rows_affected())
}

/// Remove expired rows. Returns the number removed.
pub async fn purge_expired(pool: &PgPool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= now()")
        .execute(pool)
        .await
        .context("failed to purge expired cache entries")?;

    Ok(result.rows_affected())
}

/// Remove every row.
pub async fn clear(pool: &PgPool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM cache_entries")
        .execute(pool)
        .await
        .context("failed to clear cache")?;

    Ok(result.rows_affected())
}
