//! Motivation line shown with a plan.
//!
//! Lookup order: a `progress` message template matching the completion
//! percentage, then the backend's own motivation, then a built-in message.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use feedplan_db::models::MessageTemplate;

use crate::context::TimeBucket;
use crate::store::MessageTemplates;

/// Integer facts templates can be conditioned on (e.g. `progress_pct`).
pub type TemplateContext = BTreeMap<String, i64>;

/// Template category used for plan progress messages.
pub const PROGRESS_CATEGORY: &str = "progress";

/// Completion percentage, rounded down. An empty plan is 0%.
pub fn progress_pct(completed: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    (completed.clamp(0, total) * 100) / total
}

/// Whether a template's conditions hold for `ctx`.
///
/// Keys ending in `_min` / `_max` bound the value of the key without the
/// suffix (or the suffixed key itself when the context carries it); any
/// other key must match exactly. Missing keys and non-integer conditions
/// fail the match. No conditions always match.
pub fn matches_conditions(conditions: &Value, ctx: &TemplateContext) -> bool {
    let Some(map) = conditions.as_object() else {
        return conditions.is_null();
    };

    map.iter().all(|(key, expected)| {
        let Some(expected) = expected.as_i64() else {
            return false;
        };
        let bound = key
            .strip_suffix("_min")
            .map(|base| (base, true))
            .or_else(|| key.strip_suffix("_max").map(|base| (base, false)));

        match bound {
            Some((base, is_min)) => {
                let Some(actual) = ctx.get(base).or_else(|| ctx.get(key.as_str())) else {
                    return false;
                };
                if is_min { *actual >= expected } else { *actual <= expected }
            }
            None => ctx.get(key.as_str()) == Some(&expected),
        }
    })
}

/// Message text in `language` with the template's emoji prefix.
pub fn format_template(template: &MessageTemplate, language: &str) -> String {
    let message = template.message_for(language);
    match template.emoji.as_deref().filter(|e| !e.is_empty()) {
        Some(emoji) => format!("{emoji} {message}"),
        None => message.to_owned(),
    }
}

/// Highest-priority active template whose conditions hold.
pub fn best_match(templates: &[MessageTemplate], ctx: &TemplateContext, language: &str) -> Option<String> {
    let mut ordered: Vec<&MessageTemplate> = templates.iter().filter(|t| t.is_active).collect();
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.template_key.cmp(&b.template_key)));
    ordered
        .into_iter()
        .find(|t| matches_conditions(&t.conditions, ctx))
        .map(|t| format_template(t, language))
}

/// Built-in message when no template and no backend motivation exist.
pub fn fallback_message(pct: i64, bucket: TimeBucket) -> String {
    let message = match pct {
        0 => match bucket {
            TimeBucket::Morning => "🚀 Good morning! Your daily plan is ready!",
            TimeBucket::Afternoon => "🚀 Your daily plan is ready. A few minutes is all it takes!",
            TimeBucket::Evening => "🚀 Your daily plan is ready. Wind down with a few good picks!",
        },
        100.. => "🎉 Amazing! Plan completed!",
        80.. => "🏁 Almost there! Just a little more!",
        60.. => "🔥 More than halfway! Keep going!",
        40.. => "💪 Good progress! You've got this!",
        20.. => "✨ Great start! Keep the momentum!",
        _ => "👣 First step done! Keep it rolling!",
    };
    message.to_owned()
}

/// Pick the motivation line for a plan.
pub async fn resolve(
    templates: &dyn MessageTemplates,
    pct: i64,
    bucket: TimeBucket,
    language: &str,
    backend_motivation: Option<&str>,
) -> String {
    let mut ctx = TemplateContext::new();
    ctx.insert("progress_pct".to_owned(), pct);

    match templates.find_best_match(PROGRESS_CATEGORY, &ctx, language).await {
        Ok(Some(message)) => return message,
        Ok(None) => {}
        Err(e) => warn!(error = %e, "message template lookup failed"),
    }

    if let Some(message) = backend_motivation.map(str::trim).filter(|m| !m.is_empty()) {
        return message.to_owned();
    }

    fallback_message(pct, bucket)
}
