//! `feedplan stats <user>`: show a user's engagement counters.

use anyhow::{Context, Result};
use chrono::Local;
use sqlx::PgPool;
use uuid::Uuid;

use feedplan_core::engagement::{EngagementStats, LevelTable, StreakStatus};
use feedplan_db::queries::engagement as engagement_db;

/// Run the stats command. A user without activity shows the defaults.
pub async fn run_stats(pool: &PgPool, user: Uuid, json: bool) -> Result<()> {
    let stats = engagement_db::get_stats(pool, user)
        .await?
        .map(EngagementStats::from)
        .unwrap_or_default();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("failed to serialize stats")?
        );
        return Ok(());
    }

    let today = Local::now().date_naive();
    let status = match stats.streak_status(today) {
        StreakStatus::NotStarted => "not started",
        StreakStatus::CompletedToday => "done for today",
        StreakStatus::AtRisk => "at risk, finish a plan today",
        StreakStatus::Broken => "broken",
    };

    println!("User: {user}");
    println!("Streak: {} days ({status}), best {}", stats.streak_current, stats.streak_best);
    if let Some(next) = stats.next_milestone() {
        println!("  Next milestone: {next} days");
    }
    if let Some(last) = stats.last_active_date {
        println!("  Last active: {last}");
    }
    println!("XP: {}  Level: {}", stats.xp_total, stats.level);
    if let Some((threshold, level)) = LevelTable::standard().next_level(stats.xp_total) {
        println!("  {} XP to {level}", threshold - stats.xp_total);
    }
    println!(
        "Actions completed: {}  Days active: {}  Difficulty: {}",
        stats.total_actions_completed, stats.total_days_active, stats.difficulty
    );
    if !stats.achievements.is_empty() {
        println!("Achievements: {}", stats.achievements.join(", "));
    }

    Ok(())
}
