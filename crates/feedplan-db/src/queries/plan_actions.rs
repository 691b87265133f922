//! Database query functions for the `plan_actions` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{NewPlanAction, PlanAction};

/// Insert one action of a plan.
pub async fn insert_action(
    conn: &mut PgConnection,
    plan_id: Uuid,
    action: &NewPlanAction,
) -> Result<PlanAction> {
    let row = sqlx::query_as::<_, PlanAction>(
        "INSERT INTO plan_actions \
             (plan_id, position, action_type, creator_id, description, reason, source_ref) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING *",
    )
    .bind(plan_id)
    .bind(action.position)
    .bind(action.action_type)
    .bind(&action.creator_id)
    .bind(&action.description)
    .bind(&action.reason)
    .bind(&action.source_ref)
    .fetch_one(conn)
    .await
    .with_context(|| format!("failed to insert action {} of plan {plan_id}", action.position))?;

    Ok(row)
}

/// List the actions of a plan in position order.
pub async fn list_actions(conn: &mut PgConnection, plan_id: Uuid) -> Result<Vec<PlanAction>> {
    let rows = sqlx::query_as::<_, PlanAction>(
        "SELECT * FROM plan_actions WHERE plan_id = $1 ORDER BY position",
    )
    .bind(plan_id)
    .fetch_all(conn)
    .await
    .context("failed to list plan actions")?;

    Ok(rows)
}

/// Fetch an action together with the user that owns its plan.
///
/// The owner is `None` for actions of anonymous plans.
pub async fn get_action_with_owner(
    conn: &mut PgConnection,
    action_id: Uuid,
) -> Result<Option<(PlanAction, Option<Uuid>)>> {
    let action = sqlx::query_as::<_, PlanAction>("SELECT * FROM plan_actions WHERE id = $1")
        .bind(action_id)
        .fetch_optional(&mut *conn)
        .await
        .context("failed to fetch plan action")?;

    let Some(action) = action else {
        return Ok(None);
    };

    let owner: Option<Uuid> = sqlx::query_scalar("SELECT user_id FROM plans WHERE id = $1")
        .bind(action.plan_id)
        .fetch_one(&mut *conn)
        .await
        .context("failed to fetch plan owner")?;

    Ok(Some((action, owner)))
}

/// Exposure log for a user: one row per non-avoid action with a creator
/// that appeared in one of the user's plans, and whether it was completed.
pub async fn exposure_history(pool: &PgPool, user_id: Uuid) -> Result<Vec<(String, bool)>> {
    let rows: Vec<(String, bool)> = sqlx::query_as(
        "SELECT a.creator_id, (c.id IS NOT NULL) AS completed \
         FROM plan_actions a \
         JOIN plans p ON p.id = a.plan_id \
         LEFT JOIN action_completions c ON c.action_id = a.id AND c.user_id = p.user_id \
         WHERE p.user_id = $1 \
           AND a.action_type <> 'avoid' \
           AND a.creator_id IS NOT NULL \
         ORDER BY p.plan_date, a.position",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("failed to load exposure history")?;

    Ok(rows)
}

/// Catalog source ids already placed in the user's plans for `date`.
pub async fn sources_shown_on(pool: &PgPool, user_id: Uuid, date: NaiveDate) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT a.source_ref \
         FROM plan_actions a \
         JOIN plans p ON p.id = a.plan_id \
         WHERE p.user_id = $1 AND p.plan_date = $2 AND a.source_ref IS NOT NULL \
         ORDER BY a.source_ref",
    )
    .bind(user_id)
    .bind(date)
    .fetch_all(pool)
    .await
    .context("failed to load sources shown today")?;

    Ok(rows.into_iter().map(|(s,)| s).collect())
}
