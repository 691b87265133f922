//! Database query functions for the `action_completions` table.

use anyhow::{Context, Result};
use sqlx::PgConnection;
use uuid::Uuid;

/// Record that `user_id` completed `action_id`.
///
/// Returns `false` when the completion was already recorded.
pub async fn record_completion(
    conn: &mut PgConnection,
    user_id: Uuid,
    action_id: Uuid,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO action_completions (user_id, action_id) VALUES ($1, $2) \
         ON CONFLICT (user_id, action_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(action_id)
    .execute(conn)
    .await
    .context("failed to record completion")?;

    Ok(result.rows_affected() == 1)
}

/// `(completed, total)` action counts of a plan for one user.
///
/// Anonymous viewers (`None`) have no completions.
pub async fn plan_progress(
    conn: &mut PgConnection,
    user_id: Option<Uuid>,
    plan_id: Uuid,
) -> Result<(i64, i64)> {
    let row: (i64, i64) = sqlx::query_as(
        "SELECT COUNT(c.id), COUNT(a.id) \
         FROM plan_actions a \
         LEFT JOIN action_completions c ON c.action_id = a.id AND c.user_id = $1 \
         WHERE a.plan_id = $2",
    )
    .bind(user_id)
    .bind(plan_id)
    .fetch_one(conn)
    .await
    .context("failed to compute plan progress")?;

    Ok(row)
}

/// Ids of the actions of a plan the user has completed.
pub async fn completed_action_ids(
    conn: &mut PgConnection,
    user_id: Uuid,
    plan_id: Uuid,
) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT c.action_id FROM action_completions c \
         JOIN plan_actions a ON a.id = c.action_id \
         WHERE c.user_id = $1 AND a.plan_id = $2",
    )
    .bind(user_id)
    .bind(plan_id)
    .fetch_all(conn)
    .await
    .context("failed to list completed actions")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
