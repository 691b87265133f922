//! Flags creators the user keeps skipping, and the ones they keep
//! finishing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::normalize_creator;

/// Exposures required before a creator can be flagged.
pub const MIN_SAMPLE: u32 = 5;
/// Completion rate below which a creator is flagged.
pub const THRESHOLD: f64 = 0.5;
/// Completion rate at or above which a creator counts as preferred.
pub const PREFERRED_RATE: f64 = 0.8;

/// One time a creator's content was put in front of the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exposure {
    pub creator_id: String,
    pub completed: bool,
}

impl Exposure {
    pub fn new(creator_id: impl Into<String>, completed: bool) -> Self {
        Self {
            creator_id: creator_id.into(),
            completed,
        }
    }
}

/// A creator whose content the user rarely finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToxicSignal {
    pub creator_id: String,
    pub view_count: u32,
    pub completion_count: u32,
    pub completion_rate: f64,
}

/// Aggregate an exposure log into toxic signals.
///
/// A creator is reported when it has at least `min_sample` exposures and a
/// completion rate strictly below `threshold`. Results are ordered by
/// exposure count (descending, ties by creator id) and truncated to
/// `limit`. Creator ids are normalized first; exposures with an empty
/// creator id are ignored.
pub fn detect(history: &[Exposure], min_sample: u32, threshold: f64, limit: usize) -> Vec<ToxicSignal> {
    let counts = tally(history);

    let mut signals: Vec<ToxicSignal> = counts
        .into_iter()
        .filter(|(_, (views, _))| *views >= min_sample.max(1))
        .map(|(creator, (views, completions))| ToxicSignal {
            creator_id: creator,
            view_count: views,
            completion_count: completions,
            completion_rate: f64::from(completions) / f64::from(views),
        })
        .filter(|s| s.completion_rate < threshold)
        .collect();

    signals.sort_by(|a, b| {
        b.view_count
            .cmp(&a.view_count)
            .then_with(|| a.creator_id.cmp(&b.creator_id))
    });
    signals.truncate(limit);
    signals
}

/// Creators the user reliably finishes: at least `min_sample` exposures and
/// a completion rate of at least `min_rate`. Most completions first, then
/// by creator id, truncated to `limit`.
pub fn preferred(history: &[Exposure], min_sample: u32, min_rate: f64, limit: usize) -> Vec<String> {
    let mut liked: Vec<(String, u32)> = tally(history)
        .into_iter()
        .filter(|(_, (views, completions))| {
            *views >= min_sample.max(1) && f64::from(*completions) / f64::from(*views) >= min_rate
        })
        .map(|(creator, (_, completions))| (creator, completions))
        .collect();

    liked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    liked.truncate(limit);
    liked.into_iter().map(|(creator, _)| creator).collect()
}

/// `(exposures, completions)` per normalized creator id.
fn tally(history: &[Exposure]) -> HashMap<String, (u32, u32)> {
    let mut counts: HashMap<String, (u32, u32)> = HashMap::new();
    for exposure in history {
        let creator = normalize_creator(&exposure.creator_id);
        if creator.is_empty() {
            continue;
        }
        let entry = counts.entry(creator).or_default();
        entry.0 += 1;
        if exposure.completed {
            entry.1 += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(creator: &str, views: u32, completions: u32) -> Vec<Exposure> {
        (0..views).map(|i| Exposure::new(creator, i < completions)).collect()
    }

    #[test]
    fn six_views_two_completions_is_flagged() {
        let signals = detect(&log("@x", 6, 2), MIN_SAMPLE, THRESHOLD, 5);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].view_count, 6);
        assert_eq!(signals[0].completion_count, 2);
        assert!((signals[0].completion_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn below_sample_size_is_never_flagged() {
        assert!(detect(&log("@x", 4, 0), MIN_SAMPLE, THRESHOLD, 5).is_empty());
    }

    #[test]
    fn threshold_is_strict() {
        // Exactly 50% is not below the threshold.
        assert!(detect(&log("@x", 6, 3), MIN_SAMPLE, THRESHOLD, 5).is_empty());
    }

    #[test]
    fn ordered_by_views_then_id_and_truncated() {
        let mut history = log("@b", 6, 0);
        history.extend(log("@a", 6, 1));
        history.extend(log("@c", 9, 2));
        history.extend(log("@d", 5, 0));
        history.extend(log("", 20, 0));

        let signals = detect(&history, MIN_SAMPLE, THRESHOLD, 3);
        let creators: Vec<_> = signals.iter().map(|s| s.creator_id.as_str()).collect();
        assert_eq!(creators, vec!["@c", "@a", "@b"]);
    }

    #[test]
    fn empty_history() {
        assert!(detect(&[], MIN_SAMPLE, THRESHOLD, 5).is_empty());
    }

    #[test]
    fn handle_spellings_are_counted_together() {
        let mut history = log("@Skip", 3, 0);
        history.extend(log(" @skip", 3, 1));
        let signals = detect(&history, MIN_SAMPLE, THRESHOLD, 5);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].creator_id, "@skip");
        assert_eq!(signals[0].view_count, 6);
    }

    #[test]
    fn preferred_creators_are_the_reliably_finished_ones() {
        let mut history = log("@fan", 5, 5);
        history.extend(log("@solid", 6, 5));
        history.extend(log("@meh", 6, 3));
        history.extend(log("@new", 2, 2));
        assert_eq!(preferred(&history, MIN_SAMPLE, PREFERRED_RATE, 5), vec!["@fan", "@solid"]);
        assert_eq!(preferred(&history, MIN_SAMPLE, PREFERRED_RATE, 1), vec!["@fan"]);
    }
}
