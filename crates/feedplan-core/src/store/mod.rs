//! Collaborator interfaces the pipeline consumes, with an in-memory and a
//! PostgreSQL implementation.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use feedplan_db::models::{BlockedCreator, Plan, PlanAction, PlanSource};

use crate::engagement::{EngagementError, EngagementStats, Tracker};
use crate::motivation::TemplateContext;
use crate::toxic::Exposure;
use crate::types::{Candidate, SelectedAction};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A plan ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanDraft {
    pub user_id: Option<Uuid>,
    pub category: String,
    pub date: NaiveDate,
    pub language: String,
    pub source: PlanSource,
    pub backend: String,
    pub motivation: Option<String>,
    pub generation_ms: i64,
    /// In display order; position is the index.
    pub actions: Vec<SelectedAction>,
}

/// A persisted plan with its actions in position order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPlan {
    pub plan: Plan,
    pub actions: Vec<PlanAction>,
}

/// Result of [`PlanStore::persist_plan`].
#[derive(Debug, Clone, PartialEq)]
pub enum Persisted {
    Created(StoredPlan),
    /// Another request stored a plan for the same user, category and day
    /// first; this is that plan.
    Existing(StoredPlan),
}

impl Persisted {
    pub fn into_plan(self) -> StoredPlan {
        match self {
            Self::Created(p) | Self::Existing(p) => p,
        }
    }
}

/// Completed and total action counts of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub completed: i64,
    pub total: i64,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }
}

/// Result of [`PlanStore::complete_action`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub action_id: Uuid,
    pub plan_id: Uuid,
    /// `false` when the action was already completed; nothing changed.
    pub newly_completed: bool,
    /// `true` when this completion finished the plan.
    pub plan_completed: bool,
    pub xp_earned: i64,
    pub milestone: Option<i32>,
    pub stats: EngagementStats,
}

/// Plan, completion and engagement persistence.
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn engagement_stats(&self, user_id: Uuid) -> Result<Option<EngagementStats>>;

    /// Every non-avoid action with a creator shown to the user, and whether
    /// it was completed.
    async fn exposure_history(&self, user_id: Uuid) -> Result<Vec<Exposure>>;

    /// Catalog source ids already placed in the user's plans on `date`.
    async fn sources_shown_on(&self, user_id: Uuid, date: NaiveDate) -> Result<Vec<String>>;

    async fn find_plan(
        &self,
        user_id: Option<Uuid>,
        category: &str,
        date: NaiveDate,
    ) -> Result<Option<StoredPlan>>;

    /// Write the plan and its actions atomically.
    async fn persist_plan(&self, draft: PlanDraft) -> Result<Persisted>;

    /// Record a completion and apply the resulting engagement events in one
    /// atomic step. A repeated completion is a no-op.
    async fn complete_action(
        &self,
        user_id: Uuid,
        action_id: Uuid,
        today: NaiveDate,
        tracker: &Tracker,
    ) -> Result<CompletionOutcome, EngagementError>;

    async fn plan_progress(&self, user_id: Option<Uuid>, plan_id: Uuid) -> Result<Progress>;

    /// Creators the user blocked, oldest block first.
    async fn blocked_creators(&self, user_id: Uuid) -> Result<Vec<BlockedCreator>>;

    /// Returns `false` when the creator was already blocked.
    async fn block_creator(&self, user_id: Uuid, creator_id: &str, reason: Option<&str>) -> Result<bool>;

    /// Returns `false` when the creator was not blocked.
    async fn unblock_creator(&self, user_id: Uuid, creator_id: &str) -> Result<bool>;
}

/// Source of catalog candidates.
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    /// All items of a category; filtering is the curator's job.
    async fn candidates(&self, category: &str) -> Result<Vec<Candidate>>;
}

/// Localized message templates.
#[async_trait]
pub trait MessageTemplates: Send + Sync {
    async fn find_best_match(
        &self,
        category: &str,
        ctx: &TemplateContext,
        language: &str,
    ) -> Result<Option<String>>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn PlanStore, _: &dyn ContentCatalog, _: &dyn MessageTemplates) {}
};
