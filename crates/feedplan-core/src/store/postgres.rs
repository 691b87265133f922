//! PostgreSQL-backed store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use feedplan_db::models::{BlockedCreator, NewPlan, NewPlanAction};
use feedplan_db::queries::{
    ai_logs, blocked as blocked_db, catalog as catalog_db, completions as completions_db,
    engagement as engagement_db, plan_actions as actions_db, plans as plans_db,
    templates as templates_db,
};

use super::{
    CompletionOutcome, ContentCatalog, MessageTemplates, Persisted, PlanDraft, PlanStore,
    Progress, StoredPlan,
};
use crate::engagement::{EngagementError, EngagementEvent, EngagementStats, Tracker};
use crate::motivation::{TemplateContext, best_match};
use crate::provider::observability::{InvocationRecord, ObservabilitySink};
use crate::toxic::Exposure;
use crate::types::Candidate;

/// Store over a connection pool. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PlanStore for PgStore {
    async fn engagement_stats(&self, user_id: Uuid) -> Result<Option<EngagementStats>> {
        let row = engagement_db::get_stats(&self.pool, user_id).await?;
        Ok(row.map(EngagementStats::from))
    }

    async fn exposure_history(&self, user_id: Uuid) -> Result<Vec<Exposure>> {
        let rows = actions_db::exposure_history(&self.pool, user_id).await?;
        Ok(rows
            .into_iter()
            .map(|(creator, completed)| Exposure::new(creator, completed))
            .collect())
    }

    async fn sources_shown_on(&self, user_id: Uuid, date: NaiveDate) -> Result<Vec<String>> {
        actions_db::sources_shown_on(&self.pool, user_id, date).await
    }

    async fn find_plan(
        &self,
        user_id: Option<Uuid>,
        category: &str,
        date: NaiveDate,
    ) -> Result<Option<StoredPlan>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("failed to acquire connection")?;
        let Some(plan) = plans_db::find_plan(&mut *conn, user_id, category, date).await? else {
            return Ok(None);
        };
        let actions = actions_db::list_actions(&mut *conn, plan.id).await?;
        Ok(Some(StoredPlan { plan, actions }))
    }

    async fn persist_plan(&self, draft: PlanDraft) -> Result<Persisted> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let new_plan = NewPlan {
            user_id: draft.user_id,
            category: draft.category,
            plan_date: draft.date,
            language: draft.language,
            source: draft.source,
            backend: draft.backend,
            motivation: draft.motivation,
            generation_ms: draft.generation_ms,
        };

        let Some(plan) = plans_db::insert_plan(&mut *tx, &new_plan).await? else {
            // A concurrent request won the unique constraint; hand back its plan.
            let plan = plans_db::find_plan(
                &mut tx,
                new_plan.user_id,
                &new_plan.category,
                new_plan.plan_date,
            )
            .await?
            .context("plan conflicted but could not be found")?;
            let actions = actions_db::list_actions(&mut *tx, plan.id).await?;
            debug!(plan_id = %plan.id, "plan already existed for this day");
            return Ok(Persisted::Existing(StoredPlan { plan, actions }));
        };

        let mut actions = Vec::with_capacity(draft.actions.len());
        for (position, action) in draft.actions.into_iter().enumerate() {
            let new_action = NewPlanAction {
                position: i32::try_from(position).context("too many plan actions")?,
                action_type: action.action_type,
                creator_id: action.creator_id,
                description: action.description,
                reason: action.reason,
                source_ref: action.source_ref,
            };
            actions.push(actions_db::insert_action(&mut *tx, plan.id, &new_action).await?);
        }

        tx.commit().await.context("failed to commit transaction")?;

        Ok(Persisted::Created(StoredPlan { plan, actions }))
    }

    async fn complete_action(
        &self,
        user_id: Uuid,
        action_id: Uuid,
        today: NaiveDate,
        tracker: &Tracker,
    ) -> Result<CompletionOutcome, EngagementError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let (action, owner) = actions_db::get_action_with_owner(&mut *tx, action_id)
            .await?
            .ok_or(EngagementError::ActionNotFound(action_id))?;
        if owner != Some(user_id) {
            // Transaction rolls back on drop (no commit).
            return Err(EngagementError::ActionNotFound(action_id));
        }

        // Serializes concurrent completions for the same user.
        let mut row = engagement_db::lock_stats(&mut *tx, user_id).await?;
        let mut stats = EngagementStats::from(row.clone());

        let newly_completed = completions_db::record_completion(&mut *tx, user_id, action_id).await?;
        if !newly_completed {
            return Ok(CompletionOutcome {
                action_id,
                plan_id: action.plan_id,
                newly_completed: false,
                plan_completed: false,
                xp_earned: 0,
                milestone: None,
                stats,
            });
        }

        let mut xp_earned = tracker
            .apply(&mut stats, EngagementEvent::ActionCompleted(action.action_type))
            .xp_earned;

        let (completed, total) =
            completions_db::plan_progress(&mut *tx, Some(user_id), action.plan_id).await?;
        let plan_completed = Progress { completed, total }.is_complete();
        let mut milestone = None;
        if plan_completed {
            let transition = tracker.apply(&mut stats, EngagementEvent::PlanCompleted(today));
            xp_earned += transition.xp_earned;
            milestone = transition.milestone;
        }

        stats.write_to(&mut row);
        let row = engagement_db::update_stats(&mut *tx, &row).await?;

        tx.commit().await.context("failed to commit transaction")?;

        Ok(CompletionOutcome {
            action_id,
            plan_id: action.plan_id,
            newly_completed: true,
            plan_completed,
            xp_earned,
            milestone,
            stats: EngagementStats::from(row),
        })
    }

    async fn plan_progress(&self, user_id: Option<Uuid>, plan_id: Uuid) -> Result<Progress> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("failed to acquire connection")?;
        let (completed, total) = completions_db::plan_progress(&mut *conn, user_id, plan_id).await?;
        Ok(Progress { completed, total })
    }

    async fn blocked_creators(&self, user_id: Uuid) -> Result<Vec<BlockedCreator>> {
        blocked_db::list_blocked(&self.pool, user_id).await
    }

    async fn block_creator(&self, user_id: Uuid, creator_id: &str, reason: Option<&str>) -> Result<bool> {
        blocked_db::block_creator(&self.pool, user_id, creator_id, reason).await
    }

    async fn unblock_creator(&self, user_id: Uuid, creator_id: &str) -> Result<bool> {
        blocked_db::unblock_creator(&self.pool, user_id, creator_id).await
    }
}

#[async_trait]
impl ContentCatalog for PgStore {
    async fn candidates(&self, category: &str) -> Result<Vec<Candidate>> {
        let items = catalog_db::list_by_category(&self.pool, category).await?;
        Ok(items.into_iter().map(Candidate::from).collect())
    }
}

#[async_trait]
impl MessageTemplates for PgStore {
    async fn find_best_match(
        &self,
        category: &str,
        ctx: &TemplateContext,
        language: &str,
    ) -> Result<Option<String>> {
        let templates = templates_db::list_active(&self.pool, category).await?;
        Ok(best_match(&templates, ctx, language))
    }
}

impl ObservabilitySink for PgStore {
    fn record(&self, record: InvocationRecord) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(backend = %record.backend, "no runtime; dropping invocation record");
            return;
        };
        let pool = self.pool.clone();
        let log = ai_logs::NewAiRequestLog {
            backend: record.backend,
            model: record.model,
            latency_ms: i64::try_from(record.latency_ms).unwrap_or(i64::MAX),
            prompt_tokens: record.prompt_tokens.and_then(|t| i32::try_from(t).ok()),
            completion_tokens: record.completion_tokens.and_then(|t| i32::try_from(t).ok()),
            cost_usd: record.cost_usd,
            error: record.error,
            fallback: record.fallback,
        };
        handle.spawn(async move {
            if let Err(e) = ai_logs::insert_log(&pool, &log).await {
                warn!(error = %e, backend = %log.backend, "failed to write invocation record");
            }
        });
    }
}
