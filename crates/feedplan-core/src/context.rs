//! Per-request planning context.

use std::fmt;

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::types::normalize_creator;

/// Lowest allowed daily action count.
pub const MIN_DIFFICULTY: i32 = 3;
/// Highest allowed daily action count.
pub const MAX_DIFFICULTY: i32 = 8;
/// Action count for users without stats.
pub const DEFAULT_DIFFICULTY: i32 = 5;

/// Clamp a difficulty into `MIN_DIFFICULTY..=MAX_DIFFICULTY`.
pub fn clamp_difficulty(difficulty: i32) -> i32 {
    difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

/// Coarse time of day, used to flavour prompts and fallback messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    Morning,
    Afternoon,
    Evening,
}

impl TimeBucket {
    /// 6..12 is morning, 12..18 afternoon, everything else evening.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => Self::Morning,
            12..=17 => Self::Afternoon,
            _ => Self::Evening,
        }
    }

    pub fn from_time<T: Timelike>(time: &T) -> Self {
        Self::from_hour(time.hour())
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
        };
        f.write_str(s)
    }
}

/// Everything the selection stages and the backend prompt know about the
/// request. Built once per request and shared by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub category: String,
    pub language: String,
    pub time_bucket: TimeBucket,
    pub streak_days: i32,
    /// Number of actions to plan, always within the difficulty bounds.
    pub difficulty: i32,
    pub preferred_creators: Vec<String>,
    pub preferred_topics: Vec<String>,
    pub excluded_creators: Vec<String>,
}

impl RequestContext {
    pub fn new(category: impl Into<String>, language: impl Into<String>, time_bucket: TimeBucket) -> Self {
        Self {
            category: category.into(),
            language: language.into(),
            time_bucket,
            streak_days: 0,
            difficulty: DEFAULT_DIFFICULTY,
            preferred_creators: Vec::new(),
            preferred_topics: Vec::new(),
            excluded_creators: Vec::new(),
        }
    }

    pub fn with_streak(mut self, streak_days: i32) -> Self {
        self.streak_days = streak_days.max(0);
        self
    }

    pub fn with_difficulty(mut self, difficulty: i32) -> Self {
        self.difficulty = clamp_difficulty(difficulty);
        self
    }

    pub fn with_preferred(mut self, creators: Vec<String>) -> Self {
        self.preferred_creators = creators;
        self
    }

    pub fn with_excluded(mut self, creators: Vec<String>) -> Self {
        self.excluded_creators = creators;
        self
    }

    pub fn is_excluded(&self, creator_id: &str) -> bool {
        let creator_id = normalize_creator(creator_id);
        self.excluded_creators
            .iter()
            .any(|c| normalize_creator(c) == creator_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_boundaries() {
        assert_eq!(TimeBucket::from_hour(5), TimeBucket::Evening);
        assert_eq!(TimeBucket::from_hour(6), TimeBucket::Morning);
        assert_eq!(TimeBucket::from_hour(11), TimeBucket::Morning);
        assert_eq!(TimeBucket::from_hour(12), TimeBucket::Afternoon);
        assert_eq!(TimeBucket::from_hour(17), TimeBucket::Afternoon);
        assert_eq!(TimeBucket::from_hour(18), TimeBucket::Evening);
        assert_eq!(TimeBucket::from_hour(0), TimeBucket::Evening);
    }

    #[test]
    fn difficulty_is_clamped() {
        let ctx = RequestContext::new("fitness", "en", TimeBucket::Morning).with_difficulty(12);
        assert_eq!(ctx.difficulty, MAX_DIFFICULTY);
        let ctx = ctx.with_difficulty(0);
        assert_eq!(ctx.difficulty, MIN_DIFFICULTY);
    }

    #[test]
    fn excluded_lookup() {
        let ctx = RequestContext::new("fitness", "en", TimeBucket::Evening)
            .with_excluded(vec!["@spam".into()]);
        assert!(ctx.is_excluded("@spam"));
        assert!(!ctx.is_excluded("@coach"));
        assert!(ctx.is_excluded(" @Spam"));
    }
}
