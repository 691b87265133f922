//! Candidate selection from the content catalog.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::store::ContentCatalog;
use crate::types::{Candidate, normalize_creator};

/// Default minimum quality score for a catalog item to be eligible.
pub const MIN_QUALITY: f64 = 0.7;

/// What the curator must leave out.
#[derive(Debug, Clone, Copy)]
pub struct Exclusions<'a> {
    /// Creators never to pick (toxic signals, user preferences).
    pub creators: &'a [String],
    /// Source ids already shown to this user today.
    pub shown_sources: &'a [String],
}

/// Picks high-quality, one-per-creator candidates from a catalog.
pub struct Curator<'a> {
    catalog: &'a dyn ContentCatalog,
    min_quality: f64,
}

impl<'a> Curator<'a> {
    pub fn new(catalog: &'a dyn ContentCatalog) -> Self {
        Self {
            catalog,
            min_quality: MIN_QUALITY,
        }
    }

    pub fn with_min_quality(mut self, min_quality: f64) -> Self {
        self.min_quality = min_quality;
        self
    }

    /// Up to `count` candidates, best first, at most one per creator.
    ///
    /// A failing catalog is treated as empty.
    pub async fn select(
        &self,
        category: &str,
        exclusions: Exclusions<'_>,
        count: usize,
        now: DateTime<Utc>,
    ) -> Vec<Candidate> {
        let items = match self.catalog.candidates(category).await {
            Ok(items) => items,
            Err(e) => {
                warn!(category, error = %e, "content catalog unavailable, selecting nothing");
                Vec::new()
            }
        };
        let available = items.len();
        let selected = select_from(items, exclusions, count, self.min_quality, now);
        debug!(category, available, selected = selected.len(), count, "curated candidates");
        selected
    }
}

/// Pure selection over an already loaded catalog.
pub fn select_from(
    items: Vec<Candidate>,
    exclusions: Exclusions<'_>,
    count: usize,
    min_quality: f64,
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    let excluded: HashSet<String> = exclusions.creators.iter().map(|c| normalize_creator(c)).collect();
    let shown: HashSet<&str> = exclusions.shown_sources.iter().map(String::as_str).collect();

    let mut eligible: Vec<Candidate> = items
        .into_iter()
        .map(|mut c| {
            c.creator_id = normalize_creator(&c.creator_id);
            c
        })
        .filter(|c| c.quality_score >= min_quality)
        .filter(|c| c.expires_at.is_none_or(|at| at > now))
        .filter(|c| !c.creator_id.is_empty() && !excluded.contains(&c.creator_id))
        .filter(|c| !shown.contains(c.source_id.as_str()))
        .collect();

    eligible.sort_by(rank);

    let mut seen_creators: HashSet<String> = HashSet::new();
    let mut selected = Vec::with_capacity(count.min(eligible.len()));
    for candidate in eligible {
        if selected.len() >= count {
            break;
        }
        if seen_creators.insert(candidate.creator_id.clone()) {
            selected.push(candidate);
        }
    }
    selected
}

/// Quality descending, then engagement descending, then source id.
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.quality_score
        .total_cmp(&a.quality_score)
        .then_with(|| b.engagement_rate.total_cmp(&a.engagement_rate))
        .then_with(|| a.source_id.cmp(&b.source_id))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn item(id: &str, creator: &str, quality: f64) -> Candidate {
        Candidate {
            source_id: id.into(),
            creator_id: creator.into(),
            description: String::new(),
            quality_score: quality,
            engagement_rate: 0.05,
            freshness_days: 1,
            thumbnail_ref: None,
            source_url: None,
            expires_at: None,
        }
    }

    const NONE: Exclusions<'static> = Exclusions {
        creators: &[],
        shown_sources: &[],
    };

    fn ids(selected: &[Candidate]) -> Vec<&str> {
        selected.iter().map(|c| c.source_id.as_str()).collect()
    }

    #[test]
    fn one_per_creator_under_fills() {
        // 10 qualifying items over 3 creators, asked for 5.
        let items: Vec<_> = (0..10)
            .map(|i| item(&format!("v{i}"), &format!("@c{}", i % 3), 0.9 - i as f64 * 0.01))
            .collect();
        let selected = select_from(items, NONE, 5, MIN_QUALITY, Utc::now());
        assert_eq!(selected.len(), 3);
        assert_eq!(ids(&selected), vec!["v0", "v1", "v2"]);
    }

    #[test]
    fn best_item_per_creator_wins() {
        let items = vec![item("low", "@a", 0.75), item("high", "@a", 0.95), item("b", "@b", 0.8)];
        let selected = select_from(items, NONE, 5, MIN_QUALITY, Utc::now());
        assert_eq!(ids(&selected), vec!["high", "b"]);
    }

    #[test]
    fn filters_quality_expiry_exclusions_and_shown() {
        let now = Utc::now();
        let mut expired = item("expired", "@e", 0.99);
        expired.expires_at = Some(now - Duration::minutes(1));
        let mut fresh = item("fresh", "@f", 0.98);
        fresh.expires_at = Some(now + Duration::days(1));

        let items = vec![
            item("low", "@l", 0.69),
            expired,
            fresh,
            item("toxic", "@t", 0.97),
            item("seen", "@s", 0.96),
            item("ok", "@o", 0.7),
            item("anon", "", 0.99),
        ];
        let creators = vec!["@t".to_string()];
        let shown = vec!["seen".to_string()];
        let exclusions = Exclusions {
            creators: &creators,
            shown_sources: &shown,
        };
        let selected = select_from(items, exclusions, 10, MIN_QUALITY, now);
        assert_eq!(ids(&selected), vec!["fresh", "ok"]);
    }

    #[test]
    fn ties_break_on_engagement_then_id() {
        let mut a = item("a", "@1", 0.8);
        let mut b = item("b", "@2", 0.8);
        let c = item("c", "@3", 0.8);
        a.engagement_rate = 0.01;
        b.engagement_rate = 0.09;
        let selected = select_from(vec![c, a, b], NONE, 3, MIN_QUALITY, Utc::now());
        assert_eq!(ids(&selected), vec!["b", "c", "a"]);
    }

    #[test]
    fn zero_count_selects_nothing() {
        let selected = select_from(vec![item("a", "@a", 0.9)], NONE, 0, MIN_QUALITY, Utc::now());
        assert!(selected.is_empty());
    }

    #[test]
    fn creator_ids_compare_case_insensitively() {
        let items = vec![item("a", "@Coach", 0.95), item("b", " @coach", 0.9), item("c", "@Spam", 0.85)];
        let creators = vec!["@SPAM ".to_string()];
        let exclusions = Exclusions {
            creators: &creators,
            shown_sources: &[],
        };
        let selected = select_from(items, exclusions, 5, MIN_QUALITY, Utc::now());
        assert_eq!(ids(&selected), vec!["a"]);
        assert_eq!(selected[0].creator_id, "@coach");
    }
}
