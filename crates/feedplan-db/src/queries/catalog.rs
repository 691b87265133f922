//! Database query functions for the `catalog_items` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::CatalogItem;

/// Insert or replace a catalog item, keyed by `source_id`.
pub async fn upsert_item(pool: &PgPool, item: &CatalogItem) -> Result<()> {
    sqlx::query(
        "INSERT INTO catalog_items \
             (source_id, category, creator_id, description, quality_score, engagement_rate, \
              freshness_days, thumbnail_ref, source_url, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (source_id) DO UPDATE SET \
             category = EXCLUDED.category, \
             creator_id = EXCLUDED.creator_id, \
             description = EXCLUDED.description, \
             quality_score = EXCLUDED.quality_score, \
             engagement_rate = EXCLUDED.engagement_rate, \
             freshness_days = EXCLUDED.freshness_days, \
             thumbnail_ref = EXCLUDED.thumbnail_ref, \
             source_url = EXCLUDED.source_url, \
             expires_at = EXCLUDED.expires_at",
    )
    .bind(&item.source_id)
    .bind(&item.category)
    .bind(&item.creator_id)
    .bind(&item.description)
    .bind(item.quality_score)
    .bind(item.engagement_rate)
    .bind(item.freshness_days)
    .bind(&item.thumbnail_ref)
    .bind(&item.source_url)
    .bind(item.expires_at)
    .execute(pool)
    .await
    .with_context(|| format!("failed to upsert catalog item {}", item.source_id))?;

    Ok(())
}

/// All catalog items of a category, best quality first.
///
/// Filtering on quality and expiry is left to the caller.
pub async fn list_by_category(pool: &PgPool, category: &str) -> Result<Vec<CatalogItem>> {
    let rows = sqlx::query_as::<_, CatalogItem>(
        "SELECT source_id, category, creator_id, description, quality_score, engagement_rate, \
                freshness_days, thumbnail_ref, source_url, expires_at \
         FROM catalog_items WHERE category = $1 \
         ORDER BY quality_score DESC, source_id",
    )
    .bind(category)
    .fetch_all(pool)
    .await
    .context("failed to list catalog items")?;

    Ok(rows)
}

/// Delete items whose `expires_at` has passed. Returns the number removed.
pub async fn delete_expired(pool: &PgPool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM catalog_items WHERE expires_at IS NOT NULL AND expires_at <= now()")
        .execute(pool)
        .await
        .context("failed to delete expired catalog items")?;

    Ok(result.rows_affected())
}
