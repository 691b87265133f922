//! Database query functions for the `engagement_stats` table.

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::EngagementRow;

/// Fetch a user's stats row, if one exists.
pub async fn get_stats(pool: &PgPool, user_id: Uuid) -> Result<Option<EngagementRow>> {
    let row = sqlx::query_as::<_, EngagementRow>(
        "SELECT * FROM engagement_stats WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch engagement stats")?;

    Ok(row)
}

/// Create the user's stats row if missing, then lock it for the rest of
/// the transaction.
pub async fn lock_stats(conn: &mut PgConnection, user_id: Uuid) -> Result<EngagementRow> {
    sqlx::query("INSERT INTO engagement_stats (user_id) VALUES ($1) ON CONFLICT DO NOTHING")
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .context("failed to create engagement stats")?;

    let row = sqlx::query_as::<_, EngagementRow>(
        "SELECT * FROM engagement_stats WHERE user_id = $1 FOR UPDATE",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await
    .context("failed to lock engagement stats")?;

    Ok(row)
}

/// Overwrite a stats row with new values. Returns the stored row.
pub async fn update_stats(conn: &mut PgConnection, stats: &EngagementRow) -> Result<EngagementRow> {
    let row = sqlx::query_as::<_, EngagementRow>(
        "UPDATE engagement_stats SET \
             streak_current = $2, \
             streak_best = $3, \
             last_active_date = $4, \
             xp_total = $5, \
             level = $6, \
             achievements = $7, \
             total_actions_completed = $8, \
             total_days_active = $9, \
             difficulty = $10, \
             updated_at = now() \
         WHERE user_id = $1 \
         RETURNING *",
    )
    .bind(stats.user_id)
    .bind(stats.streak_current)
    .bind(stats.streak_best)
    .bind(stats.last_active_date)
    .bind(stats.xp_total)
    .bind(stats.level)
    .bind(&stats.achievements)
    .bind(stats.total_actions_completed)
    .bind(stats.total_days_active)
    .bind(stats.difficulty)
    .fetch_optional(conn)
    .await
    .context("failed to update engagement stats")?;

    match row {
        Some(r) => Ok(r),
        None => anyhow::bail!("engagement stats for user {} not found", stats.user_id),
    }
}
