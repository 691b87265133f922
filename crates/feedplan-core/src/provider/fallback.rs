//! Deterministic planner used when the primary backend is unavailable.

use std::collections::HashSet;

use feedplan_db::models::ActionType;

use super::Payload;
use crate::context::RequestContext;
use crate::types::{Candidate, SelectedAction};

/// Type assigned to the *n*-th filled slot.
pub const ACTION_CYCLE: [ActionType; 4] = [
    ActionType::Follow,
    ActionType::Like,
    ActionType::Like,
    ActionType::Save,
];

pub fn cycle_type(slot: usize) -> ActionType {
    ACTION_CYCLE[slot % ACTION_CYCLE.len()]
}

/// A creator known to be worth following in a category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeedCreator {
    pub creator_id: &'static str,
    pub description: &'static str,
}

const fn seed(creator_id: &'static str, description: &'static str) -> SeedCreator {
    SeedCreator {
        creator_id,
        description,
    }
}

const FITNESS: &[SeedCreator] = &[
    seed("@fitnesscoach", "Home workouts"),
    seed("@yogawithadriene", "Yoga and stretching"),
    seed("@nutritionist", "Healthy eating guides"),
    seed("@runningcoach", "Running technique"),
    seed("@mobilitydaily", "Mobility routines"),
];

const PERSONAL_GROWTH: &[SeedCreator] = &[
    seed("@atomichabits", "Building better habits"),
    seed("@mel_robbins", "Confidence and productivity"),
    seed("@simonsinek", "Leadership and inspiration"),
    seed("@jayshetty", "Motivation and purpose"),
];

const WELLNESS: &[SeedCreator] = &[
    seed("@headspace", "Mindfulness and meditation"),
    seed("@drjulie", "Mental health tips"),
    seed("@yogawithadriene", "Yoga and meditation"),
];

const LEARNING: &[SeedCreator] = &[
    seed("@crashcourse", "Educational content"),
    seed("@mathwithmark", "Math explained simply"),
];

const CREATIVE: &[SeedCreator] = &[
    seed("@drawwithjazza", "Art tutorials and challenges"),
    seed("@diyideas", "Weekend DIY projects"),
];

/// Seed creators for a category; unknown categories use the fitness list.
pub fn seed_creators(category: &str) -> &'static [SeedCreator] {
    match category {
        "personal_growth" => PERSONAL_GROWTH,
        "wellness" => WELLNESS,
        "learning" => LEARNING,
        "creative" => CREATIVE,
        _ => FITNESS,
    }
}

pub(crate) fn action_from_candidate(candidate: &Candidate, action_type: ActionType) -> SelectedAction {
    let reason = match action_type {
        ActionType::Follow => format!("{} posts consistently strong content", candidate.creator_id),
        ActionType::Save => "Saving tells the algorithm you want more like this".to_owned(),
        _ => format!(
            "High quality pick ({:.0}% engagement)",
            candidate.engagement_rate * 100.0
        ),
    };
    SelectedAction {
        action_type,
        creator_id: Some(candidate.creator_id.clone()),
        description: candidate.description.clone(),
        reason,
        source_ref: Some(candidate.source_id.clone()),
    }
}

pub(crate) fn avoid_creator(creator_id: &str) -> SelectedAction {
    SelectedAction {
        action_type: ActionType::Avoid,
        creator_id: Some(creator_id.to_owned()),
        description: format!("Content from {creator_id}"),
        reason: "You rarely finish these; mark \"Not interested\"".to_owned(),
        source_ref: None,
    }
}

pub(crate) fn generic_avoid() -> SelectedAction {
    SelectedAction {
        action_type: ActionType::Avoid,
        creator_id: None,
        description: "A video you don't want more of".to_owned(),
        reason: "Mark \"Not interested\" to retrain your feed".to_owned(),
        source_ref: None,
    }
}

/// Builds a plan without any backend.
///
/// Fills slots from the candidates, then the category's seed creators,
/// then the excluded creators as `avoid` actions, then generic `avoid`
/// actions. A creator is never used twice.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticPlanner;

impl StaticPlanner {
    pub const NAME: &'static str = "static";

    pub fn plan(&self, ctx: &RequestContext, candidates: &[Candidate], count: usize) -> Payload {
        let mut actions: Vec<SelectedAction> = Vec::with_capacity(count);
        let mut used: HashSet<String> = ctx.excluded_creators.iter().cloned().collect();

        for candidate in candidates {
            if actions.len() >= count {
                break;
            }
            if candidate.creator_id.is_empty() || !used.insert(candidate.creator_id.clone()) {
                continue;
            }
            actions.push(action_from_candidate(candidate, cycle_type(actions.len())));
        }

        for seed in seed_creators(&ctx.category) {
            if actions.len() >= count {
                break;
            }
            if !used.insert(seed.creator_id.to_owned()) {
                continue;
            }
            let action_type = match cycle_type(actions.len()) {
                // Seeds have no video to like or save.
                ActionType::Like | ActionType::Save => ActionType::Follow,
                other => other,
            };
            actions.push(SelectedAction {
                action_type,
                creator_id: Some(seed.creator_id.to_owned()),
                description: seed.description.to_owned(),
                reason: format!("A trusted {} creator", ctx.category),
                source_ref: None,
            });
        }

        for creator in &ctx.excluded_creators {
            if actions.len() >= count {
                break;
            }
            actions.push(avoid_creator(creator));
        }

        while actions.len() < count {
            actions.push(generic_avoid());
        }

        Payload {
            actions,
            motivation: None,
            dropped: 0,
        }
    }
}
