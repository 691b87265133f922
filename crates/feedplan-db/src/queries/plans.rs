//! Database query functions for the `plans` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{NewPlan, Plan};

/// Insert a plan row.
///
/// Returns `None` when a plan for the same (user, category, date) already
/// exists; the caller decides whether to load the existing one.
pub async fn insert_plan(conn: &mut PgConnection, new: &NewPlan) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>(
        "INSERT INTO plans \
             (user_id, category, plan_date, language, source, backend, motivation, generation_ms) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT ON CONSTRAINT plans_one_per_day DO NOTHING \
         RETURNING *",
    )
    .bind(new.user_id)
    .bind(&new.category)
    .bind(new.plan_date)
    .bind(&new.language)
    .bind(new.source)
    .bind(&new.backend)
    .bind(&new.motivation)
    .bind(new.generation_ms)
    .fetch_optional(conn)
    .await
    .context("failed to insert plan")?;

    Ok(plan)
}

/// Fetch a plan by its ID.
pub async fn get_plan(pool: &PgPool, id: Uuid) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch plan")?;

    Ok(plan)
}

/// Find the plan for (user, category, date). Anonymous plans match on a
/// null `user_id`.
pub async fn find_plan(
    conn: &mut PgConnection,
    user_id: Option<Uuid>,
    category: &str,
    plan_date: NaiveDate,
) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>(
        "SELECT * FROM plans \
         WHERE user_id IS NOT DISTINCT FROM $1 AND category = $2 AND plan_date = $3",
    )
    .bind(user_id)
    .bind(category)
    .bind(plan_date)
    .fetch_optional(conn)
    .await
    .context("failed to find plan")?;

    Ok(plan)
}

/// List a user's plans, newest first.
pub async fn list_plans_for_user(pool: &PgPool, user_id: Uuid, limit: i64) -> Result<Vec<Plan>> {
    let plans = sqlx::query_as::<_, Plan>(
        "SELECT * FROM plans WHERE user_id = $1 \
         ORDER BY plan_date DESC, created_at DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list plans")?;

    Ok(plans)
}
