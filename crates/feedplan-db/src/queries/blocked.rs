//! Database query functions for the `blocked_creators` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::BlockedCreator;

/// Block `creator_id` for `user_id`.
///
/// Returns `false` when the creator was already blocked; the original
/// reason is kept.
pub async fn block_creator(
    pool: &PgPool,
    user_id: Uuid,
    creator_id: &str,
    reason: Option<&str>,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO blocked_creators (user_id, creator_id, reason) VALUES ($1, $2, $3) \
         ON CONFLICT (user_id, creator_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(creator_id)
    .bind(reason)
    .execute(pool)
    .await
    .with_context(|| format!("failed to block creator {creator_id}"))?;

    Ok(result.rows_affected() == 1)
}

/// Returns `false` when the creator was not blocked.
pub async fn unblock_creator(pool: &PgPool, user_id: Uuid, creator_id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM blocked_creators WHERE user_id = $1 AND creator_id = $2")
        .bind(user_id)
        .bind(creator_id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to unblock creator {creator_id}"))?;

    Ok(result.rows_affected() > 0)
}

/// Blocked creators of a user, oldest block first.
pub async fn list_blocked(pool: &PgPool, user_id: Uuid) -> Result<Vec<BlockedCreator>> {
    let rows = sqlx::query_as::<_, BlockedCreator>(
        "SELECT * FROM blocked_creators WHERE user_id = $1 ORDER BY blocked_at, creator_id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("failed to list blocked creators")?;

    Ok(rows)
}
