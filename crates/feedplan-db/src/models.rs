use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of interaction a plan action asks the user to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Follow,
    Like,
    Save,
    /// Mark the creator as "not interested".
    #[serde(alias = "not_interested")]
    Avoid,
}

impl ActionType {
    pub const ALL: [ActionType; 4] = [Self::Follow, Self::Like, Self::Save, Self::Avoid];
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Follow => "follow",
            Self::Like => "like",
            Self::Save => "save",
            Self::Avoid => "avoid",
        };
        f.write_str(s)
    }
}

impl FromStr for ActionType {
    type Err = ActionTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "follow" => Ok(Self::Follow),
            "like" => Ok(Self::Like),
            "save" => Ok(Self::Save),
            "avoid" | "not_interested" => Ok(Self::Avoid),
            other => Err(ActionTypeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ActionType`] string.
#[derive(Debug, Clone)]
pub struct ActionTypeParseError(pub String);

impl fmt::Display for ActionTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid action type: {:?}", self.0)
    }
}

impl std::error::Error for ActionTypeParseError {}

// ---------------------------------------------------------------------------

/// Where a plan's actions came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    /// Primary backend output, used as is.
    Generated,
    /// Served from the cache or an already persisted plan.
    Cache,
    /// Deterministic fallback planner.
    Fallback,
    /// Backend or fallback output that had to be repaired.
    Seed,
}

impl fmt::Display for PlanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Generated => "generated",
            Self::Cache => "cache",
            Self::Fallback => "fallback",
            Self::Seed => "seed",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanSource {
    type Err = PlanSourceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generated" => Ok(Self::Generated),
            "cache" => Ok(Self::Cache),
            "fallback" => Ok(Self::Fallback),
            "seed" => Ok(Self::Seed),
            other => Err(PlanSourceParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PlanSource`] string.
#[derive(Debug, Clone)]
pub struct PlanSourceParseError(pub String);

impl fmt::Display for PlanSourceParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan source: {:?}", self.0)
    }
}

impl std::error::Error for PlanSourceParseError {}

// ---------------------------------------------------------------------------

/// Named experience level, derived from accumulated XP.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Beginner,
    Explorer,
    Apprentice,
    Curator,
    Expert,
    Master,
    Legend,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Beginner => "beginner",
            Self::Explorer => "explorer",
            Self::Apprentice => "apprentice",
            Self::Curator => "curator",
            Self::Expert => "expert",
            Self::Master => "master",
            Self::Legend => "legend",
        };
        f.write_str(s)
    }
}

impl FromStr for Level {
    type Err = LevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "explorer" => Ok(Self::Explorer),
            "apprentice" => Ok(Self::Apprentice),
            "curator" => Ok(Self::Curator),
            "expert" => Ok(Self::Expert),
            "master" => Ok(Self::Master),
            "legend" => Ok(Self::Legend),
            other => Err(LevelParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Level`] string.
#[derive(Debug, Clone)]
pub struct LevelParseError(pub String);

impl fmt::Display for LevelParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid level: {:?}", self.0)
    }
}

impl std::error::Error for LevelParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A row in the `plans` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    /// `None` for anonymous plans.
    pub user_id: Option<Uuid>,
    pub category: String,
    pub plan_date: NaiveDate,
    pub language: String,
    pub source: PlanSource,
    pub backend: String,
    pub motivation: Option<String>,
    pub generation_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to insert a plan; the rest are server defaults.
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub user_id: Option<Uuid>,
    pub category: String,
    pub plan_date: NaiveDate,
    pub language: String,
    pub source: PlanSource,
    pub backend: String,
    pub motivation: Option<String>,
    pub generation_ms: i64,
}

/// A row in the `plan_actions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PlanAction {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub position: i32,
    pub action_type: ActionType,
    pub creator_id: Option<String>,
    pub description: String,
    pub reason: String,
    pub source_ref: Option<String>,
}

/// Fields needed to insert a plan action.
#[derive(Debug, Clone)]
pub struct NewPlanAction {
    pub position: i32,
    pub action_type: ActionType,
    pub creator_id: Option<String>,
    pub description: String,
    pub reason: String,
    pub source_ref: Option<String>,
}

/// A row in the `engagement_stats` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EngagementRow {
    pub user_id: Uuid,
    pub streak_current: i32,
    pub streak_best: i32,
    pub last_active_date: Option<NaiveDate>,
    pub xp_total: i64,
    pub level: Level,
    pub achievements: Vec<String>,
    pub total_actions_completed: i32,
    pub total_days_active: i32,
    pub difficulty: i32,
    pub updated_at: DateTime<Utc>,
}

/// A row in the `catalog_items` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CatalogItem {
    pub source_id: String,
    pub category: String,
    pub creator_id: String,
    pub description: String,
    pub quality_score: f64,
    pub engagement_rate: f64,
    pub freshness_days: i32,
    pub thumbnail_ref: Option<String>,
    pub source_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A row in the `message_templates` table.
/// A creator the user blocked; never planned for that user again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BlockedCreator {
    pub user_id: Uuid,
    pub creator_id: String,
    pub reason: Option<String>,
    pub blocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MessageTemplate {
    pub id: Uuid,
    pub template_key: String,
    pub category: String,
    pub message_en: String,
    pub message_ru: Option<String>,
    pub message_es: Option<String>,
    /// Integer conditions, e.g. `{"progress_pct_min": 50}`.
    pub conditions: serde_json::Value,
    pub emoji: Option<String>,
    pub priority: i32,
    pub is_active: bool,
}

impl MessageTemplate {
    /// Message text in `language`, falling back to English.
    pub fn message_for(&self, language: &str) -> &str {
        let localized = match language {
            "ru" => self.message_ru.as_deref(),
            "es" => self.message_es.as_deref(),
            _ => None,
        };
        localized
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.message_en)
    }
}

/// A row in the `ai_request_logs` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AiRequestLog {
    pub id: Uuid,
    pub backend: String,
    pub model: String,
    pub latency_ms: i64,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub cost_usd: Option<f64>,
    pub error: Option<String>,
    pub fallback: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
