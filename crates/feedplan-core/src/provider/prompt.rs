//! Prompt text for action selection.

use serde::Serialize;

use super::backend::CompletionRequest;
use crate::context::{RequestContext, TimeBucket};
use crate::types::Candidate;

pub const SYSTEM_PROMPT: &str = "You are a content curator. You pick the best actions for a \
user's daily feed-training plan from a list of candidate videos.\n\
Rules:\n\
1. At most one action per creator, except \"avoid\" actions.\n\
2. Mix action types: mostly follow and like, some save, at most one avoid.\n\
3. Prefer high engagement rate and recent content.\n\
4. Never pick an excluded creator except as an \"avoid\" action.\n\
5. Give each action a short, specific, motivating reason.\n\
Respond with JSON only. No markdown, no explanations.";

/// Candidate fields the backend needs to choose.
#[derive(Serialize)]
struct CandidateView<'a> {
    source_id: &'a str,
    creator_id: &'a str,
    description: &'a str,
    quality_score: f64,
    engagement_rate: f64,
    freshness_days: i32,
}

fn time_guidance(ctx: &RequestContext) -> &'static str {
    match ctx.time_bucket {
        TimeBucket::Morning => "energizing, motivational, morning-routine content",
        TimeBucket::Afternoon => "educational, productivity, skill-building content",
        TimeBucket::Evening => "calming, reflective, mindful content",
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_owned()
    } else {
        items.join(", ")
    }
}

/// User prompt listing the context and the candidates as JSON.
pub fn user_prompt(ctx: &RequestContext, candidates: &[Candidate], count: usize) -> String {
    let views: Vec<CandidateView<'_>> = candidates
        .iter()
        .map(|c| CandidateView {
            source_id: &c.source_id,
            creator_id: &c.creator_id,
            description: &c.description,
            quality_score: c.quality_score,
            engagement_rate: c.engagement_rate,
            freshness_days: c.freshness_days,
        })
        .collect();
    let candidates_json = serde_json::to_string_pretty(&views).unwrap_or_else(|_| "[]".to_owned());

    format!(
        "USER CONTEXT:\n\
         - Category: {category}\n\
         - Time of day: {bucket} (favour {guidance})\n\
         - Current streak: {streak} days\n\
         - Preferred creators: {preferred}\n\
         - Preferred topics: {topics}\n\
         - Excluded creators: {excluded}\n\
         - Language for reasons: {language}\n\n\
         CANDIDATES ({n}):\n{candidates_json}\n\n\
         Select exactly {count} actions.\n\
         Action types: \"follow\" (a creator), \"like\" and \"save\" (a video, set video_id \
         to its source_id), \"avoid\" (mark content as not interested).\n\n\
         Respond with a JSON object:\n\
         {{\"actions\": [{{\"type\": \"follow\", \"creator_username\": \"@name\", \
         \"video_id\": null, \"description\": \"...\", \"reason\": \"...\"}}], \
         \"motivation\": \"one short encouraging sentence\"}}",
        category = ctx.category,
        bucket = ctx.time_bucket,
        guidance = time_guidance(ctx),
        streak = ctx.streak_days,
        preferred = list_or_none(&ctx.preferred_creators),
        topics = list_or_none(&ctx.preferred_topics),
        excluded = list_or_none(&ctx.excluded_creators),
        language = ctx.language,
        n = candidates.len(),
    )
}

/// Full request for the selection stage.
pub fn selection_request(
    ctx: &RequestContext,
    candidates: &[Candidate],
    count: usize,
    max_tokens: u32,
) -> CompletionRequest {
    CompletionRequest {
        prompt: user_prompt(ctx, candidates, count),
        system: Some(SYSTEM_PROMPT.to_owned()),
        max_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, creator: &str) -> Candidate {
        Candidate {
            source_id: id.into(),
            creator_id: creator.into(),
            description: "Stretching basics".into(),
            quality_score: 0.9,
            engagement_rate: 0.07,
            freshness_days: 3,
            thumbnail_ref: None,
            source_url: Some("https://example.com/v".into()),
            expires_at: None,
        }
    }

    #[test]
    fn prompt_mentions_context_and_candidates() {
        let ctx = RequestContext::new("fitness", "en", TimeBucket::Morning)
            .with_streak(4)
            .with_preferred(vec!["@coach".into(), "@chef".into()])
            .with_excluded(vec!["@spam".into()]);
        let req = selection_request(&ctx, &[candidate("v1", "@coach")], 5, 1024);

        assert!(req.prompt.contains("Category: fitness"));
        assert!(req.prompt.contains("Current streak: 4 days"));
        assert!(req.prompt.contains("Excluded creators: @spam"));
        assert!(req.prompt.contains("Preferred creators: @coach, @chef"));
        assert!(req.prompt.contains("Preferred topics: none"));
        assert!(req.prompt.contains("\"source_id\": \"v1\""));
        assert!(req.prompt.contains("Select exactly 5 actions"));
        assert!(!req.prompt.contains("example.com"), "urls are not sent");
        assert_eq!(req.max_tokens, 1024);
        assert!(req.system.is_some());
    }
}
