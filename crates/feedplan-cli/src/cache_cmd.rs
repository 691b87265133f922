//! `feedplan cache purge`: shared cache maintenance.

use anyhow::Result;
use sqlx::PgPool;

use feedplan_db::queries::cache as cache_db;

use crate::CacheCommands;

pub async fn run_cache_command(command: CacheCommands, pool: &PgPool) -> Result<()> {
    match command {
        CacheCommands::Purge { all } => {
            let removed = if all {
                cache_db::clear(pool).await?
            } else {
                cache_db::purge_expired(pool).await?
            };
            let what = if all { "cache entries" } else { "expired cache entries" };
            println!("Removed {removed} {what}.");
        }
    }
    Ok(())
}
