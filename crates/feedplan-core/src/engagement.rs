//! Streak, XP and level bookkeeping.
//!
//! [`Tracker::apply`] is a pure state transition over [`EngagementStats`];
//! persisting the result atomically is the store's job.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use feedplan_db::models::{ActionType, EngagementRow, Level};

use crate::context::DEFAULT_DIFFICULTY;

/// XP for completing one action of the given type.
pub fn action_xp(action_type: ActionType) -> i64 {
    match action_type {
        ActionType::Follow => 10,
        ActionType::Like => 5,
        ActionType::Save => 8,
        ActionType::Avoid => 7,
    }
}

/// XP for finishing every action of a plan.
pub const PLAN_COMPLETE_XP: i64 = 25;
/// Bonus XP for reaching a streak milestone.
pub const STREAK_MILESTONE_XP: i64 = 50;
/// Streak lengths (days) that earn a bonus and an achievement.
pub const STREAK_MILESTONES: [i32; 9] = [3, 7, 14, 21, 30, 60, 90, 180, 365];

/// Errors building a [`LevelTable`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LevelTableError {
    #[error("level table is empty")]
    Empty,
    #[error("first level must start at 0 XP, got {0}")]
    FirstNotZero(i64),
    #[error("level thresholds must be strictly ascending ({previous} then {next})")]
    NotAscending { previous: i64, next: i64 },
}

/// XP thresholds, ascending, each unlocking a level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelTable {
    thresholds: Vec<(i64, Level)>,
}

impl LevelTable {
    pub fn new(thresholds: Vec<(i64, Level)>) -> Result<Self, LevelTableError> {
        let first = thresholds.first().ok_or(LevelTableError::Empty)?;
        if first.0 != 0 {
            return Err(LevelTableError::FirstNotZero(first.0));
        }
        for pair in thresholds.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err(LevelTableError::NotAscending {
                    previous: pair[0].0,
                    next: pair[1].0,
                });
            }
        }
        Ok(Self { thresholds })
    }

    /// Beginner 0, Explorer 100, Apprentice 300, Curator 600, Expert 1000,
    /// Master 2000, Legend 5000.
    pub fn standard() -> Self {
        Self {
            thresholds: vec![
                (0, Level::Beginner),
                (100, Level::Explorer),
                (300, Level::Apprentice),
                (600, Level::Curator),
                (1000, Level::Expert),
                (2000, Level::Master),
                (5000, Level::Legend),
            ],
        }
    }

    /// Highest level whose threshold is at or below `xp`.
    pub fn level_for(&self, xp: i64) -> Level {
        self.thresholds
            .iter()
            .take_while(|(threshold, _)| *threshold <= xp)
            .last()
            .map(|(_, level)| *level)
            .unwrap_or(self.thresholds[0].1)
    }

    /// The next level and the XP it needs, if any.
    pub fn next_level(&self, xp: i64) -> Option<(i64, Level)> {
        self.thresholds.iter().find(|(threshold, _)| *threshold > xp).copied()
    }
}

impl Default for LevelTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Where a user's streak stands relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakStatus {
    NotStarted,
    CompletedToday,
    /// Last activity was yesterday; completing a plan today extends it.
    AtRisk,
    Broken,
}

/// Per-user engagement counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementStats {
    pub streak_current: i32,
    pub streak_best: i32,
    pub last_active_date: Option<NaiveDate>,
    pub xp_total: i64,
    pub level: Level,
    pub achievements: Vec<String>,
    pub total_actions_completed: i32,
    pub total_days_active: i32,
    pub difficulty: i32,
}

impl Default for EngagementStats {
    fn default() -> Self {
        Self {
            streak_current: 0,
            streak_best: 0,
            last_active_date: None,
            xp_total: 0,
            level: Level::Beginner,
            achievements: Vec::new(),
            total_actions_completed: 0,
            total_days_active: 0,
            difficulty: DEFAULT_DIFFICULTY,
        }
    }
}

impl EngagementStats {
    pub fn streak_status(&self, today: NaiveDate) -> StreakStatus {
        match self.last_active_date {
            None => StreakStatus::NotStarted,
            Some(last) => match (today - last).num_days() {
                i64::MIN..=0 => StreakStatus::CompletedToday,
                1 => StreakStatus::AtRisk,
                _ => StreakStatus::Broken,
            },
        }
    }

    /// Smallest milestone above the current streak.
    pub fn next_milestone(&self) -> Option<i32> {
        STREAK_MILESTONES
            .iter()
            .copied()
            .find(|m| *m > self.streak_current)
    }
}

impl From<EngagementRow> for EngagementStats {
    fn from(row: EngagementRow) -> Self {
        Self {
            streak_current: row.streak_current,
            streak_best: row.streak_best,
            last_active_date: row.last_active_date,
            xp_total: row.xp_total,
            level: row.level,
            achievements: row.achievements,
            total_actions_completed: row.total_actions_completed,
            total_days_active: row.total_days_active,
            difficulty: row.difficulty,
        }
    }
}

impl EngagementStats {
    /// Copy these counters onto a stored row, keeping its identity.
    pub fn write_to(&self, row: &mut EngagementRow) {
        row.streak_current = self.streak_current;
        row.streak_best = self.streak_best;
        row.last_active_date = self.last_active_date;
        row.xp_total = self.xp_total;
        row.level = self.level;
        row.achievements = self.achievements.clone();
        row.total_actions_completed = self.total_actions_completed;
        row.total_days_active = self.total_days_active;
        row.difficulty = self.difficulty;
    }
}

/// Errors recording a completion.
#[derive(Debug, thiserror::Error)]
pub enum EngagementError {
    /// The action does not exist or belongs to another user's plan.
    #[error("action {0} not found")]
    ActionNotFound(Uuid),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Something the user did that moves their stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementEvent {
    ActionCompleted(ActionType),
    /// Every action of a plan is done; the date is the user's local day.
    PlanCompleted(NaiveDate),
}

/// Summary of one applied event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub xp_earned: i64,
    pub level_before: Level,
    pub level_after: Level,
    pub streak_before: i32,
    pub streak_after: i32,
    /// Milestone reached by this event.
    pub milestone: Option<i32>,
}

impl Transition {
    pub fn leveled_up(&self) -> bool {
        self.level_after > self.level_before
    }
}

/// Applies engagement events to stats.
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    levels: LevelTable,
}

impl Tracker {
    pub fn new(levels: LevelTable) -> Self {
        Self { levels }
    }

    pub fn levels(&self) -> &LevelTable {
        &self.levels
    }

    pub fn apply(&self, stats: &mut EngagementStats, event: EngagementEvent) -> Transition {
        let level_before = stats.level;
        let streak_before = stats.streak_current;
        let mut xp_earned = 0;
        let mut milestone = None;

        match event {
            EngagementEvent::ActionCompleted(action_type) => {
                xp_earned += action_xp(action_type);
                stats.total_actions_completed += 1;
            }
            EngagementEvent::PlanCompleted(date) => {
                advance_streak(stats, date);
                xp_earned += PLAN_COMPLETE_XP;

                if stats.streak_current != streak_before
                    && STREAK_MILESTONES.contains(&stats.streak_current)
                {
                    let reached = stats.streak_current;
                    xp_earned += STREAK_MILESTONE_XP;
                    let achievement = format!("streak_{reached}");
                    if !stats.achievements.contains(&achievement) {
                        stats.achievements.push(achievement);
                    }
                    milestone = Some(reached);
                }
            }
        }

        stats.xp_total += xp_earned;
        stats.level = self.levels.level_for(stats.xp_total);

        Transition {
            xp_earned,
            level_before,
            level_after: stats.level,
            streak_before,
            streak_after: stats.streak_current,
            milestone,
        }
    }
}

/// Streak rules for a plan completed on `date`.
fn advance_streak(stats: &mut EngagementStats, date: NaiveDate) {
    let gap = stats.last_active_date.map(|last| (date - last).num_days());
    match gap {
        None => {
            stats.streak_current = 1;
            stats.total_days_active += 1;
            stats.last_active_date = Some(date);
        }
        // Same day, or a clock that moved backwards: nothing changes.
        Some(days) if days <= 0 => {}
        Some(1) => {
            stats.streak_current += 1;
            stats.total_days_active += 1;
            stats.last_active_date = Some(date);
        }
        Some(_) => {
            stats.streak_current = 1;
            stats.total_days_active += 1;
            stats.last_active_date = Some(date);
        }
    }
    stats.streak_best = stats.streak_best.max(stats.streak_current);
}
