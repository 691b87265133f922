//! In-process store for tests and database-less runs.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use feedplan_db::models::{
    ActionType, BlockedCreator, CatalogItem, MessageTemplate, Plan, PlanAction,
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

#[derive(Debug, Default)]
struct State {
    plans: Vec<StoredPlan>,
    completions: HashSet<(Uuid, Uuid)>,
    stats: HashMap<Uuid, EngagementStats>,
    catalog: Vec<CatalogItem>,
    templates: Vec<MessageTemplate>,
    invocations: Vec<InvocationRecord>,
    blocked: Vec<BlockedCreator>,
    read_only: bool,
}

impl State {
    fn plan_of_action(&self, action_id: Uuid) -> Option<(&StoredPlan, &PlanAction)> {
        self.plans.iter().find_map(|p| {
            p.actions
                .iter()
                .find(|a| a.id == action_id)
                .map(|a| (p, a))
        })
    }

    fn progress(&self, user_id: Option<Uuid>, plan_id: Uuid) -> Progress {
        let Some(plan) = self.plans.iter().find(|p| p.plan.id == plan_id) else {
            return Progress::default();
        };
        let completed = match user_id {
            Some(user) => plan
                .actions
                .iter()
                .filter(|a| self.completions.contains(&(user, a.id)))
                .count(),
            None => 0,
        };
        Progress {
            completed: completed as i64,
            total: plan.actions.len() as i64,
        }
    }
}

/// A [`PlanStore`], [`ContentCatalog`], [`MessageTemplates`] and
/// [`ObservabilitySink`] backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_catalog_item(&self, item: CatalogItem) {
        let mut state = self.state();
        state.catalog.retain(|i| i.source_id != item.source_id);
        state.catalog.push(item);
    }

    pub fn add_template(&self, template: MessageTemplate) {
        let mut state = self.state();
        state
            .templates
            .retain(|t| t.template_key != template.template_key);
        state.templates.push(template);
    }

    pub fn set_stats(&self, user_id: Uuid, stats: EngagementStats) {
        self.state().stats.insert(user_id, stats);
    }

    /// Make every write fail, to exercise persistence errors.
    pub fn set_read_only(&self, read_only: bool) {
        self.state().read_only = read_only;
    }

    pub fn plan_count(&self) -> usize {
        self.state().plans.len()
    }

    pub fn invocations(&self) -> Vec<InvocationRecord> {
        self.state().invocations.clone()
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn engagement_stats(&self, user_id: Uuid) -> Result<Option<EngagementStats>> {
        Ok(self.state().stats.get(&user_id).cloned())
    }

    async fn exposure_history(&self, user_id: Uuid) -> Result<Vec<Exposure>> {
        let state = self.state();
        let mut plans: Vec<&StoredPlan> = state
            .plans
            .iter()
            .filter(|p| p.plan.user_id == Some(user_id))
            .collect();
        plans.sort_by_key(|p| p.plan.plan_date);

        let history = plans
            .into_iter()
            .flat_map(|p| p.actions.iter())
            .filter(|a| a.action_type != ActionType::Avoid)
            .filter_map(|a| {
                let creator = a.creator_id.as_deref()?;
                let completed = state.completions.contains(&(user_id, a.id));
                Some(Exposure::new(creator, completed))
            })
            .collect();
        Ok(history)
    }

    async fn sources_shown_on(&self, user_id: Uuid, date: NaiveDate) -> Result<Vec<String>> {
        let state = self.state();
        let mut sources: Vec<String> = state
            .plans
            .iter()
            .filter(|p| p.plan.user_id == Some(user_id) && p.plan.plan_date == date)
            .flat_map(|p| p.actions.iter())
            .filter_map(|a| a.source_ref.clone())
            .collect();
        sources.sort();
        sources.dedup();
        Ok(sources)
    }

    async fn find_plan(
        &self,
        user_id: Option<Uuid>,
        category: &str,
        date: NaiveDate,
    ) -> Result<Option<StoredPlan>> {
        let state = self.state();
        Ok(state
            .plans
            .iter()
            .find(|p| {
                p.plan.user_id == user_id && p.plan.category == category && p.plan.plan_date == date
            })
            .cloned())
    }

    async fn persist_plan(&self, draft: PlanDraft) -> Result<Persisted> {
        let mut state = self.state();
        if state.read_only {
            bail!("store is read-only");
        }

        if let Some(existing) = state.plans.iter().find(|p| {
            p.plan.user_id == draft.user_id
                && p.plan.category == draft.category
                && p.plan.plan_date == draft.date
        }) {
            return Ok(Persisted::Existing(existing.clone()));
        }

        let plan_id = Uuid::new_v4();
        let actions = draft
            .actions
            .into_iter()
            .enumerate()
            .map(|(position, a)| PlanAction {
                id: Uuid::new_v4(),
                plan_id,
                position: position as i32,
                action_type: a.action_type,
                creator_id: a.creator_id,
                description: a.description,
                reason: a.reason,
                source_ref: a.source_ref,
            })
            .collect();
        let stored = StoredPlan {
            plan: Plan {
                id: plan_id,
                user_id: draft.user_id,
                category: draft.category,
                plan_date: draft.date,
                language: draft.language,
                source: draft.source,
                backend: draft.backend,
                motivation: draft.motivation,
                generation_ms: draft.generation_ms,
                created_at: Utc::now(),
            },
            actions,
        };
        state.plans.push(stored.clone());
        Ok(Persisted::Created(stored))
    }

    async fn complete_action(
        &self,
        user_id: Uuid,
        action_id: Uuid,
        today: NaiveDate,
        tracker: &Tracker,
    ) -> Result<CompletionOutcome, EngagementError> {
        let mut state = self.state();

        let (plan_id, action_type) = match state.plan_of_action(action_id) {
            Some((plan, action)) if plan.plan.user_id == Some(user_id) => {
                (plan.plan.id, action.action_type)
            }
            _ => return Err(EngagementError::ActionNotFound(action_id)),
        };

        let mut stats = state.stats.get(&user_id).cloned().unwrap_or_default();
        if state.completions.contains(&(user_id, action_id)) {
            return Ok(CompletionOutcome {
                action_id,
                plan_id,
                newly_completed: false,
                plan_completed: false,
                xp_earned: 0,
                milestone: None,
                stats,
            });
        }
        if state.read_only {
            return Err(anyhow::anyhow!("store is read-only").into());
        }

        state.completions.insert((user_id, action_id));
        let mut xp_earned = tracker
            .apply(&mut stats, EngagementEvent::ActionCompleted(action_type))
            .xp_earned;

        let plan_completed = state.progress(Some(user_id), plan_id).is_complete();
        let mut milestone = None;
        if plan_completed {
            let transition = tracker.apply(&mut stats, EngagementEvent::PlanCompleted(today));
            xp_earned += transition.xp_earned;
            milestone = transition.milestone;
        }
        state.stats.insert(user_id, stats.clone());

        Ok(CompletionOutcome {
            action_id,
            plan_id,
            newly_completed: true,
            plan_completed,
            xp_earned,
            milestone,
            stats,
        })
    }

    async fn plan_progress(&self, user_id: Option<Uuid>, plan_id: Uuid) -> Result<Progress> {
        Ok(self.state().progress(user_id, plan_id))
    }

    async fn blocked_creators(&self, user_id: Uuid) -> Result<Vec<BlockedCreator>> {
        Ok(self
            .state()
            .blocked
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn block_creator(&self, user_id: Uuid, creator_id: &str, reason: Option<&str>) -> Result<bool> {
        let mut state = self.state();
        if state.read_only {
            bail!("store is read-only");
        }
        if state
            .blocked
            .iter()
            .any(|b| b.user_id == user_id && b.creator_id == creator_id)
        {
            return Ok(false);
        }
        state.blocked.push(BlockedCreator {
            user_id,
            creator_id: creator_id.to_owned(),
            reason: reason.map(str::to_owned),
            blocked_at: Utc::now(),
        });
        Ok(true)
    }

    async fn unblock_creator(&self, user_id: Uuid, creator_id: &str) -> Result<bool> {
        let mut state = self.state();
        if state.read_only {
            bail!("store is read-only");
        }
        let before = state.blocked.len();
        state
            .blocked
            .retain(|b| !(b.user_id == user_id && b.creator_id == creator_id));
        Ok(state.blocked.len() < before)
    }
}

#[async_trait]
impl ContentCatalog for MemoryStore {
    async fn candidates(&self, category: &str) -> Result<Vec<Candidate>> {
        let state = self.state();
        Ok(state
            .catalog
            .iter()
            .filter(|i| i.category == category)
            .cloned()
            .map(Candidate::from)
            .collect())
    }
}

#[async_trait]
impl MessageTemplates for MemoryStore {
    async fn find_best_match(
        &self,
        category: &str,
        ctx: &TemplateContext,
        language: &str,
    ) -> Result<Option<String>> {
        let state = self.state();
        let templates: Vec<MessageTemplate> = state
            .templates
            .iter()
            .filter(|t| t.category == category)
            .cloned()
            .collect();
        Ok(best_match(&templates, ctx, language))
    }
}

impl ObservabilitySink for MemoryStore {
    fn record(&self, record: InvocationRecord) {
        self.state().invocations.push(record);
    }
}
