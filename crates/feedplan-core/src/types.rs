//! Values passed between the selection stages, the gateway and the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use feedplan_db::models::{ActionType, CatalogItem};

/// Canonical form of a creator id: trimmed, and lowercased when it is an
/// `@handle` (platform handles are case-insensitive).
pub fn normalize_creator(creator_id: &str) -> String {
    let trimmed = creator_id.trim();
    if trimmed.starts_with('@') {
        trimmed.to_lowercase()
    } else {
        trimmed.to_owned()
    }
}

/// A catalog item eligible for today's plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub source_id: String,
    pub creator_id: String,
    pub description: String,
    pub quality_score: f64,
    pub engagement_rate: f64,
    pub freshness_days: i32,
    pub thumbnail_ref: Option<String>,
    pub source_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<CatalogItem> for Candidate {
    fn from(item: CatalogItem) -> Self {
        Self {
            source_id: item.source_id,
            creator_id: normalize_creator(&item.creator_id),
            description: item.description,
            quality_score: item.quality_score,
            engagement_rate: item.engagement_rate,
            freshness_days: item.freshness_days,
            thumbnail_ref: item.thumbnail_ref,
            source_url: item.source_url,
            expires_at: item.expires_at,
        }
    }
}

/// One action of a plan before it is persisted.
///
/// Deserialization accepts the field names backends are prompted with
/// (`type`, `creator_username`, `video_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedAction {
    #[serde(alias = "type")]
    pub action_type: ActionType,
    #[serde(default, alias = "creator_username")]
    pub creator_id: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, alias = "video_id")]
    pub source_ref: Option<String>,
}

impl SelectedAction {
    /// Creator id, treating blank strings as absent.
    pub fn creator(&self) -> Option<&str> {
        self.creator_id.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_trimmed_and_lowercased() {
        assert_eq!(normalize_creator("  @Coach "), "@coach");
        assert_eq!(normalize_creator("@coach"), "@coach");
        // Opaque ids keep their case.
        assert_eq!(normalize_creator(" UCx9AbC "), "UCx9AbC");
        assert_eq!(normalize_creator("   "), "");
    }

    #[test]
    fn blank_creator_reads_as_absent() {
        let action = SelectedAction {
            action_type: ActionType::Like,
            creator_id: Some("  ".to_owned()),
            description: String::new(),
            reason: String::new(),
            source_ref: None,
        };
        assert_eq!(action.creator(), None);
    }
}
