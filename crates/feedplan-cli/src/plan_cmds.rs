//! `feedplan plan` and `feedplan complete`: the two pipeline entry points.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use feedplan_core::cache::{Cache, PgCache};
use feedplan_core::orchestrator::{PlanEnvelope, PlanRequest, Planner};
use feedplan_core::provider::{Gateway, ObservabilitySink};
use feedplan_core::store::{CompletionOutcome, MemoryStore, PgStore};
use feedplan_db::models::ActionType;

use crate::catalog_cmd::read_catalog_file;
use crate::config::FeedplanConfig;

pub fn request(
    user: Option<Uuid>,
    category: Option<String>,
    language: Option<String>,
    count: Option<usize>,
) -> PlanRequest {
    PlanRequest {
        user_id: user,
        category,
        language,
        count,
    }
}

/// Planner over PostgreSQL: store, catalog, templates, invocation log and
/// shared cache all live in the same database.
pub(crate) fn pg_planner(pool: &PgPool, config: &FeedplanConfig) -> Result<Planner> {
    let store = Arc::new(PgStore::new(pool.clone()));
    let sink: Arc<dyn ObservabilitySink> = store.clone();
    let gateway = Gateway::from_config(&config.provider)
        .context("failed to set up generative backend")?
        .with_sink(sink);

    Ok(Planner::new(store.clone(), store.clone(), store, gateway)
        .with_cache(Cache::with_shared(PgCache::new(pool.clone())))
        .with_config(config.planner.clone()))
}

/// Generate (or fetch) today's plan and print it.
pub async fn run_plan(
    pool: &PgPool,
    config: &FeedplanConfig,
    request: &PlanRequest,
    json: bool,
) -> Result<()> {
    let planner = pg_planner(pool, config)?;
    let envelope = planner.generate_plan(request).await?;
    print_envelope(&envelope, json)
}

/// Generate a plan against a throwaway in-memory store.
pub async fn run_plan_in_memory(
    config: &FeedplanConfig,
    request: &PlanRequest,
    catalog: Option<&Path>,
    json: bool,
) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    if let Some(path) = catalog {
        for item in read_catalog_file(path)? {
            store.add_catalog_item(item);
        }
    }
    let sink: Arc<dyn ObservabilitySink> = store.clone();
    let gateway = Gateway::from_config(&config.provider)
        .context("failed to set up generative backend")?
        .with_sink(sink);
    let planner = Planner::new(store.clone(), store.clone(), store, gateway)
        .with_config(config.planner.clone());

    let envelope = planner.generate_plan(request).await?;
    print_envelope(&envelope, json)
}

/// Mark an action done and print the engagement outcome.
pub async fn run_complete(
    pool: &PgPool,
    config: &FeedplanConfig,
    user: Uuid,
    action_id: Uuid,
    json: bool,
) -> Result<()> {
    let planner = pg_planner(pool, config)?;
    let outcome = planner.complete_action(user, action_id).await?;
    print_outcome(&outcome, json)
}

fn print_envelope(envelope: &PlanEnvelope, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(envelope).context("failed to serialize plan")?
        );
        return Ok(());
    }

    println!("Plan {} ({}, {})", envelope.plan_id, envelope.category, envelope.date);
    println!(
        "  Source: {} via {} in {} ms",
        envelope.metadata.source, envelope.metadata.backend, envelope.metadata.generation_ms
    );
    println!(
        "  Progress: {}/{}",
        envelope.progress.completed, envelope.progress.total
    );
    println!();
    for action in &envelope.actions {
        let verb = match action.action_type {
            ActionType::Follow => "FOLLOW",
            ActionType::Like => "LIKE  ",
            ActionType::Save => "SAVE  ",
            ActionType::Avoid => "AVOID ",
        };
        let creator = action.creator_id.as_deref().unwrap_or("-");
        println!("  {}. [{verb}] {creator}: {}", action.position + 1, action.description);
        if !action.reason.is_empty() {
            println!("       {}", action.reason);
        }
        println!("       id: {}", action.id);
    }
    println!();
    println!("{}", envelope.motivation);

    Ok(())
}

fn print_outcome(outcome: &CompletionOutcome, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(outcome).context("failed to serialize outcome")?
        );
        return Ok(());
    }

    if !outcome.newly_completed {
        println!("Action {} was already completed.", outcome.action_id);
        return Ok(());
    }

    println!("Action {} completed: +{} XP", outcome.action_id, outcome.xp_earned);
    if outcome.plan_completed {
        println!("Plan {} finished!", outcome.plan_id);
    }
    if let Some(milestone) = outcome.milestone {
        println!("Streak milestone reached: {milestone} days");
    }
    println!(
        "Streak: {} (best {})  XP: {}  Level: {}",
        outcome.stats.streak_current,
        outcome.stats.streak_best,
        outcome.stats.xp_total,
        outcome.stats.level
    );

    Ok(())
}
