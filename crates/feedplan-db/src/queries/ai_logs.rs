//! Database query functions for the `ai_request_logs` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::AiRequestLog;

/// Fields needed to insert a log row.
#[derive(Debug, Clone)]
pub struct NewAiRequestLog {
    pub backend: String,
    pub model: String,
    pub latency_ms: i64,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub cost_usd: Option<f64>,
    pub error: Option<String>,
    pub fallback: bool,
}

/// Insert one backend invocation record.
pub async fn insert_log(pool: &PgPool, log: &NewAiRequestLog) -> Result<()> {
    sqlx::query(
        "INSERT INTO ai_request_logs \
             (backend, model, latency_ms, prompt_tokens, completion_tokens, cost_usd, error, fallback) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(&log.backend)
    .bind(&log.model)
    .bind(log.latency_ms)
    .bind(log.prompt_tokens)
    .bind(log.completion_tokens)
    .bind(log.cost_usd)
    .bind(&log.error)
    .bind(log.fallback)
    .execute(pool)
    .await
    .context("failed to insert ai request log")?;

    Ok(())
}

/// Most recent log rows, newest first.
pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<AiRequestLog>> {
    let rows = sqlx::query_as::<_, AiRequestLog>(
        "SELECT * FROM ai_request_logs ORDER BY created_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list ai request logs")?;

    Ok(rows)
}
