//! `feedplan creators`: per-user creator blocking.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::CreatorCommands;
use crate::config::FeedplanConfig;
use crate::plan_cmds::pg_planner;

pub async fn run_creator_command(
    command: CreatorCommands,
    pool: &PgPool,
    config: &FeedplanConfig,
) -> Result<()> {
    let planner = pg_planner(pool, config)?;

    match command {
        CreatorCommands::Block {
            user,
            creator,
            reason,
        } => {
            if planner.block_creator(user, &creator, reason.as_deref()).await? {
                println!("Blocked {creator} for {user}; applies from the next plan.");
            } else {
                println!("{creator} is already blocked for {user}.");
            }
        }
        CreatorCommands::Unblock { user, creator } => {
            if planner.unblock_creator(user, &creator).await? {
                println!("Unblocked {creator} for {user}.");
            } else {
                println!("{creator} was not blocked for {user}.");
            }
        }
        CreatorCommands::List { user, json } => {
            let blocked = planner.blocked_creators(user).await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&blocked)
                        .context("failed to serialize blocked creators")?
                );
            } else if blocked.is_empty() {
                println!("No blocked creators for {user}.");
            } else {
                for b in &blocked {
                    let reason = b.reason.as_deref().unwrap_or("-");
                    println!("{}  {}  {reason}", b.blocked_at.format("%Y-%m-%d"), b.creator_id);
                }
            }
        }
    }

    Ok(())
}
