//! Plan orchestrator: turns a (user, category) request into a persisted,
//! cached plan, and records completions against it.

pub mod repair;

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use feedplan_db::models::{ActionType, BlockedCreator, PlanSource};

use crate::cache::{Cache, plan_key, user_plan_prefix};
use crate::config::PlannerConfig;
use crate::context::{RequestContext, TimeBucket, clamp_difficulty};
use crate::curator::{Curator, Exclusions};
use crate::engagement::{EngagementError, EngagementStats, Tracker};
use crate::motivation::{self, progress_pct};
use crate::provider::Gateway;
use crate::store::{
    CompletionOutcome, ContentCatalog, MessageTemplates, Persisted, PlanDraft, PlanStore,
    Progress, StoredPlan,
};
use crate::toxic;
use crate::types::normalize_creator;

use repair::repair;

/// Errors from [`Planner::generate_plan`].
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// The plan could not be read or written. Nothing was cached.
    #[error("plan generation failed")]
    GenerationFailed(#[source] anyhow::Error),
}

/// A request for today's plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    /// `None` plans for an anonymous user: no history, no stats.
    pub user_id: Option<Uuid>,
    pub category: Option<String>,
    pub language: Option<String>,
    /// Number of actions; defaults to the user's difficulty.
    pub count: Option<usize>,
}

impl PlanRequest {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

/// One action as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeAction {
    pub id: Uuid,
    pub position: i32,
    pub action_type: ActionType,
    pub creator_id: Option<String>,
    pub description: String,
    pub reason: String,
    pub source_ref: Option<String>,
}

/// How a plan was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub source: PlanSource,
    pub generation_ms: i64,
    pub backend: String,
    pub generated_at: DateTime<Utc>,
}

/// Response for a plan request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEnvelope {
    pub plan_id: Uuid,
    pub date: NaiveDate,
    pub category: String,
    pub language: String,
    pub actions: Vec<EnvelopeAction>,
    pub progress: Progress,
    pub motivation: String,
    pub metadata: PlanMetadata,
}

/// Coordinates cache, curator, detector, gateway and store.
pub struct Planner {
    store: Arc<dyn PlanStore>,
    catalog: Arc<dyn ContentCatalog>,
    templates: Arc<dyn MessageTemplates>,
    gateway: Gateway,
    cache: Cache,
    tracker: Tracker,
    config: PlannerConfig,
}

impl Planner {
    /// Planner with a process-local cache and default tuning.
    pub fn new(
        store: Arc<dyn PlanStore>,
        catalog: Arc<dyn ContentCatalog>,
        templates: Arc<dyn MessageTemplates>,
        gateway: Gateway,
    ) -> Self {
        Self {
            store,
            catalog,
            templates,
            gateway,
            cache: Cache::local(),
            tracker: Tracker::default(),
            config: PlannerConfig::default(),
        }
    }

    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_tracker(mut self, tracker: Tracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Today's plan for the request, at the local wall clock.
    pub async fn generate_plan(&self, request: &PlanRequest) -> Result<PlanEnvelope, PlanError> {
        self.generate_plan_at(request, Local::now().naive_local()).await
    }

    /// Today's plan for the request, where "today" and the time bucket come
    /// from `local`.
    pub async fn generate_plan_at(
        &self,
        request: &PlanRequest,
        local: NaiveDateTime,
    ) -> Result<PlanEnvelope, PlanError> {
        let started = Instant::now();
        let category = non_blank(request.category.as_deref())
            .unwrap_or(self.config.default_category.as_str())
            .to_owned();
        let language = non_blank(request.language.as_deref())
            .unwrap_or(self.config.default_language.as_str())
            .to_owned();
        let date = local.date();
        let bucket = TimeBucket::from_time(&local.time());
        let user_id = request.user_id;
        let key = plan_key(user_id, &category, date);

        if let Some(mut envelope) = self.cache.get_json::<PlanEnvelope>(&key).await {
            debug!(%key, plan_id = %envelope.plan_id, "plan served from cache");
            envelope.metadata.source = PlanSource::Cache;
            return Ok(envelope);
        }

        let existing = self
            .store
            .find_plan(user_id, &category, date)
            .await
            .map_err(|e| generation_failed(e, "failed to look up today's plan"))?;
        if let Some(stored) = existing {
            debug!(%key, plan_id = %stored.plan.id, "plan already stored for today");
            let envelope = self.stored_envelope(stored, bucket).await;
            self.cache
                .set_json(&key, &envelope, self.config.plan_ttl())
                .await;
            return Ok(envelope);
        }

        let stats = self.load_stats(user_id).await;
        let (history, shown_sources) = self.load_history(user_id, date).await;

        let signals = toxic::detect(
            &history,
            self.config.toxic_min_sample,
            self.config.toxic_threshold,
            self.config.toxic_limit,
        );
        let toxic_creators: Vec<String> = signals.iter().map(|s| s.creator_id.clone()).collect();
        if !toxic_creators.is_empty() {
            info!(user_id = ?user_id, creators = ?toxic_creators, "excluding low-completion creators");
        }
        let mut excluded = self.load_blocked(user_id).await;
        for creator in &toxic_creators {
            if !excluded.contains(creator) {
                excluded.push(creator.clone());
            }
        }

        let preferred: Vec<String> = toxic::preferred(
            &history,
            self.config.toxic_min_sample,
            toxic::PREFERRED_RATE,
            self.config.toxic_limit,
        )
        .into_iter()
        .filter(|c| !excluded.contains(c))
        .collect();

        let ctx = RequestContext::new(category.clone(), language.clone(), bucket)
            .with_streak(stats.streak_current)
            .with_difficulty(stats.difficulty)
            .with_preferred(preferred)
            .with_excluded(excluded);
        let count = request
            .count
            .map(|c| clamp_difficulty(i32::try_from(c).unwrap_or(i32::MAX)))
            .unwrap_or(ctx.difficulty) as usize;

        let candidates = Curator::new(self.catalog.as_ref())
            .with_min_quality(self.config.min_quality)
            .select(
                &category,
                Exclusions {
                    creators: &ctx.excluded_creators,
                    shown_sources: &shown_sources,
                },
                count * self.config.candidate_multiplier.max(1),
                Utc::now(),
            )
            .await;

        let generation = self.gateway.generate(&ctx, &candidates, count).await;
        let dropped = generation.payload.dropped;
        let repaired = repair(
            generation.payload.actions,
            count,
            &candidates,
            &ctx.excluded_creators,
            &toxic_creators,
        );
        let source = if repaired.repaired || dropped > 0 {
            PlanSource::Seed
        } else if generation.fallback {
            PlanSource::Fallback
        } else {
            PlanSource::Generated
        };

        let generation_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let draft = PlanDraft {
            user_id,
            category,
            date,
            language,
            source,
            backend: generation.backend,
            motivation: generation.payload.motivation,
            generation_ms,
            actions: repaired.actions,
        };

        let persisted = self
            .store
            .persist_plan(draft)
            .await
            .map_err(|e| generation_failed(e, "failed to persist plan"))?;

        let envelope = match persisted {
            Persisted::Created(stored) => {
                info!(
                    user_id = ?user_id,
                    plan_id = %stored.plan.id,
                    source = %stored.plan.source,
                    backend = %stored.plan.backend,
                    actions = stored.actions.len(),
                    generation_ms,
                    "plan generated"
                );
                let progress = Progress {
                    completed: 0,
                    total: stored.actions.len() as i64,
                };
                self.envelope(stored, progress, bucket).await
            }
            Persisted::Existing(stored) => {
                debug!(plan_id = %stored.plan.id, "lost the race for today's plan");
                self.stored_envelope(stored, bucket).await
            }
        };

        self.cache
            .set_json(&key, &envelope, self.config.plan_ttl())
            .await;
        Ok(envelope)
    }

    /// Mark an action done for `user_id`, at the local wall clock.
    pub async fn complete_action(
        &self,
        user_id: Uuid,
        action_id: Uuid,
    ) -> Result<CompletionOutcome, EngagementError> {
        self.complete_action_on(user_id, action_id, Local::now().date_naive())
            .await
    }

    /// Mark an action done for `user_id`, with `today` as the user's day.
    ///
    /// Cached plans of the user are dropped so the next request sees the
    /// new progress.
    pub async fn complete_action_on(
        &self,
        user_id: Uuid,
        action_id: Uuid,
        today: NaiveDate,
    ) -> Result<CompletionOutcome, EngagementError> {
        let outcome = self
            .store
            .complete_action(user_id, action_id, today, &self.tracker)
            .await?;

        if outcome.newly_completed {
            let evicted = self.cache.delete_prefix(&user_plan_prefix(user_id)).await;
            info!(
                %user_id,
                %action_id,
                xp_earned = outcome.xp_earned,
                plan_completed = outcome.plan_completed,
                streak = outcome.stats.streak_current,
                evicted,
                "action completed"
            );
            if let Some(milestone) = outcome.milestone {
                info!(%user_id, milestone, "streak milestone reached");
            }
        } else {
            debug!(%user_id, %action_id, "action already completed");
        }
        Ok(outcome)
    }

    /// Engagement stats of a user; a user without stats gets the defaults.
    pub async fn engagement_stats(&self, user_id: Uuid) -> anyhow::Result<EngagementStats> {
        Ok(self
            .store
            .engagement_stats(user_id)
            .await?
            .unwrap_or_default())
    }

    /// Never plan `creator_id` for `user_id` again.
    ///
    /// Takes effect from the next generated plan; a plan already stored for
    /// today is kept. Returns `false` when the creator was already blocked.
    pub async fn block_creator(
        &self,
        user_id: Uuid,
        creator_id: &str,
        reason: Option<&str>,
    ) -> anyhow::Result<bool> {
        let creator_id = normalize_creator(creator_id);
        if creator_id.is_empty() {
            anyhow::bail!("creator id must not be blank");
        }
        let added = self.store.block_creator(user_id, &creator_id, reason).await?;
        info!(%user_id, %creator_id, added, "creator blocked");
        Ok(added)
    }

    /// Returns `false` when the creator was not blocked.
    pub async fn unblock_creator(&self, user_id: Uuid, creator_id: &str) -> anyhow::Result<bool> {
        let creator_id = normalize_creator(creator_id);
        let removed = self.store.unblock_creator(user_id, &creator_id).await?;
        info!(%user_id, %creator_id, removed, "creator unblocked");
        Ok(removed)
    }

    pub async fn blocked_creators(&self, user_id: Uuid) -> anyhow::Result<Vec<BlockedCreator>> {
        self.store.blocked_creators(user_id).await
    }

    async fn load_blocked(&self, user_id: Option<Uuid>) -> Vec<String> {
        let Some(user_id) = user_id else {
            return Vec::new();
        };
        match self.store.blocked_creators(user_id).await {
            Ok(blocked) => blocked
                .into_iter()
                .map(|b| normalize_creator(&b.creator_id))
                .collect(),
            Err(e) => {
                warn!(%user_id, error = %e, "blocked creators unavailable");
                Vec::new()
            }
        }
    }

    async fn load_stats(&self, user_id: Option<Uuid>) -> EngagementStats {
        let Some(user_id) = user_id else {
            return EngagementStats::default();
        };
        match self.store.engagement_stats(user_id).await {
            Ok(stats) => stats.unwrap_or_default(),
            Err(e) => {
                warn!(%user_id, error = %e, "engagement stats unavailable, using defaults");
                EngagementStats::default()
            }
        }
    }

    async fn load_history(
        &self,
        user_id: Option<Uuid>,
        date: NaiveDate,
    ) -> (Vec<toxic::Exposure>, Vec<String>) {
        let Some(user_id) = user_id else {
            return (Vec::new(), Vec::new());
        };
        let history = self
            .store
            .exposure_history(user_id)
            .await
            .unwrap_or_else(|e| {
                warn!(%user_id, error = %e, "exposure history unavailable");
                Vec::new()
            });
        let shown = self
            .store
            .sources_shown_on(user_id, date)
            .await
            .unwrap_or_else(|e| {
                warn!(%user_id, error = %e, "shown sources unavailable");
                Vec::new()
            });
        (history, shown)
    }

    /// Envelope for a plan some earlier request stored.
    async fn stored_envelope(&self, stored: StoredPlan, bucket: TimeBucket) -> PlanEnvelope {
        let total = stored.actions.len() as i64;
        let progress = self
            .store
            .plan_progress(stored.plan.user_id, stored.plan.id)
            .await
            .unwrap_or_else(|e| {
                warn!(plan_id = %stored.plan.id, error = %e, "plan progress unavailable");
                Progress { completed: 0, total }
            });
        let mut envelope = self.envelope(stored, progress, bucket).await;
        envelope.metadata.source = PlanSource::Cache;
        envelope
    }

    async fn envelope(&self, stored: StoredPlan, progress: Progress, bucket: TimeBucket) -> PlanEnvelope {
        let StoredPlan { plan, actions } = stored;
        let pct = progress_pct(progress.completed, progress.total);
        let motivation = motivation::resolve(
            self.templates.as_ref(),
            pct,
            bucket,
            &plan.language,
            plan.motivation.as_deref(),
        )
        .await;

        PlanEnvelope {
            plan_id: plan.id,
            date: plan.plan_date,
            category: plan.category,
            language: plan.language,
            actions: actions
                .into_iter()
                .map(|a| EnvelopeAction {
                    id: a.id,
                    position: a.position,
                    action_type: a.action_type,
                    creator_id: a.creator_id,
                    description: a.description,
                    reason: a.reason,
                    source_ref: a.source_ref,
                })
                .collect(),
            progress,
            motivation,
            metadata: PlanMetadata {
                source: plan.source,
                generation_ms: plan.generation_ms,
                backend: plan.backend,
                generated_at: plan.created_at,
            },
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn generation_failed(err: anyhow::Error, context: &'static str) -> PlanError {
    error!(error = %format!("{err:#}"), "{context}");
    PlanError::GenerationFailed(err.context(context))
}
