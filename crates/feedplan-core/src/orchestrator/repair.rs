//! Bringing backend output into plan shape.
//!
//! A plan has exactly `count` actions and never names the same creator in
//! two non-avoid actions. Whatever the backend returned is trimmed and
//! padded deterministically until that holds.

use std::collections::HashSet;

use tracing::warn;

use feedplan_db::models::ActionType;

use crate::provider::fallback::{action_from_candidate, avoid_creator, cycle_type, generic_avoid};
use crate::types::{Candidate, SelectedAction, normalize_creator};

/// Repaired actions and whether anything had to change.
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    pub actions: Vec<SelectedAction>,
    pub repaired: bool,
}

/// Shape `actions` into `count` actions.
///
/// Creator ids are normalized with [`normalize_creator`] before comparison
/// and stored that way. Non-avoid actions without a creator, naming an
/// excluded creator, or repeating an earlier creator are dropped. The result is truncated, then
/// padded from unused `candidates`, then with `avoid` actions for
/// `avoid_creators`, then with generic `avoid` actions.
pub fn repair(
    actions: Vec<SelectedAction>,
    count: usize,
    candidates: &[Candidate],
    excluded: &[String],
    avoid_creators: &[String],
) -> Repaired {
    let excluded: HashSet<String> = excluded.iter().map(|c| normalize_creator(c)).collect();
    let mut used: HashSet<String> = HashSet::new();
    let mut avoided: HashSet<String> = HashSet::new();
    let mut kept: Vec<SelectedAction> = Vec::with_capacity(count);
    let mut dropped = 0usize;

    for mut action in actions {
        let creator = action.creator().map(normalize_creator);
        if action.action_type == ActionType::Avoid {
            if let Some(creator) = &creator {
                avoided.insert(creator.clone());
            }
            action.creator_id = creator;
            kept.push(action);
            continue;
        }
        let Some(creator) = creator else {
            dropped += 1;
            continue;
        };
        if excluded.contains(&creator) || !used.insert(creator.clone()) {
            dropped += 1;
            continue;
        }
        action.creator_id = Some(creator);
        kept.push(action);
    }

    let truncated = kept.len().saturating_sub(count);
    kept.truncate(count);
    let short = count - kept.len();

    // Creators dropped by truncation are free again.
    used = kept
        .iter()
        .filter(|a| a.action_type != ActionType::Avoid)
        .filter_map(|a| a.creator().map(str::to_owned))
        .collect();

    for candidate in candidates {
        if kept.len() >= count {
            break;
        }
        let creator = normalize_creator(&candidate.creator_id);
        if creator.is_empty() || excluded.contains(&creator) || !used.insert(creator.clone()) {
            continue;
        }
        let mut action = action_from_candidate(candidate, cycle_type(kept.len()));
        action.creator_id = Some(creator);
        kept.push(action);
    }

    for creator in avoid_creators {
        if kept.len() >= count {
            break;
        }
        let creator = normalize_creator(creator);
        if avoided.insert(creator.clone()) {
            kept.push(avoid_creator(&creator));
        }
    }

    while kept.len() < count {
        kept.push(generic_avoid());
    }

    let repaired = dropped > 0 || truncated > 0 || short > 0;
    if repaired {
        warn!(dropped, truncated, short, count, "repaired backend plan");
    }

    Repaired {
        actions: kept,
        repaired,
    }
}
