//! Database query functions for the `message_templates` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::MessageTemplate;

/// Fields needed to insert a template.
#[derive(Debug, Clone)]
pub struct NewMessageTemplate<'a> {
    pub template_key: &'a str,
    pub category: &'a str,
    pub message_en: &'a str,
    pub message_ru: Option<&'a str>,
    pub message_es: Option<&'a str>,
    pub conditions: serde_json::Value,
    pub emoji: Option<&'a str>,
    pub priority: i32,
}

/// Insert a template, replacing any template with the same key.
pub async fn upsert_template(pool: &PgPool, t: &NewMessageTemplate<'_>) -> Result<MessageTemplate> {
    let row = sqlx::query_as::<_, MessageTemplate>(
        "INSERT INTO message_templates \
             (template_key, category, message_en, message_ru, message_es, conditions, emoji, priority) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (template_key) DO UPDATE SET \
             category = EXCLUDED.category, \
             message_en = EXCLUDED.message_en, \
             message_ru = EXCLUDED.message_ru, \
             message_es = EXCLUDED.message_es, \
             conditions = EXCLUDED.conditions, \
             emoji = EXCLUDED.emoji, \
             priority = EXCLUDED.priority, \
             is_active = true \
         RETURNING *",
    )
    .bind(t.template_key)
    .bind(t.category)
    .bind(t.message_en)
    .bind(t.message_ru)
    .bind(t.message_es)
    .bind(&t.conditions)
    .bind(t.emoji)
    .bind(t.priority)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to upsert template {}", t.template_key))?;

    Ok(row)
}

/// Active templates of a category, highest priority first.
pub async fn list_active(pool: &PgPool, category: &str) -> Result<Vec<MessageTemplate>> {
    let rows = sqlx::query_as::<_, MessageTemplate>(
        "SELECT * FROM message_templates \
         WHERE category = $1 AND is_active \
         ORDER BY priority DESC, template_key",
    )
    .bind(category)
    .fetch_all(pool)
    .await
    .context("failed to list message templates")?;

    Ok(rows)
}
