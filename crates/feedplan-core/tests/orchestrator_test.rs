//! Pipeline tests for the planner over the in-memory store.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use feedplan_db::models::{ActionType, CatalogItem, MessageTemplate, PlanSource};

use feedplan_core::cache::plan_key;
use feedplan_core::config::ProviderConfig;
use feedplan_core::engagement::EngagementError;
use feedplan_core::orchestrator::{PlanEnvelope, PlanError, PlanRequest, Planner};
use feedplan_core::provider::{
    Backend, Completion, CompletionRequest, Gateway, ObservabilitySink, ProviderError,
};
use feedplan_core::store::{MemoryStore, PlanDraft, PlanStore};
use feedplan_core::types::SelectedAction;

// ===========================================================================
// Fixtures
// ===========================================================================

struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
}

impl ScriptedBackend {
    fn new(script: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ProviderError::Timeout));
        next.map(|text| Completion {
            text,
            prompt_tokens: Some(100),
            completion_tokens: Some(50),
        })
    }

    async fn is_available(&self) -> bool {
        true
    }
}

fn item(source_id: &str, creator: &str, quality: f64) -> CatalogItem {
    CatalogItem {
        source_id: source_id.to_owned(),
        category: "fitness".to_owned(),
        creator_id: creator.to_owned(),
        description: format!("{creator} workout {source_id}"),
        quality_score: quality,
        engagement_rate: 0.08,
        freshness_days: 2,
        thumbnail_ref: None,
        source_url: Some(format!("https://example.com/v/{source_id}")),
        expires_at: None,
    }
}

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for (i, creator) in ["@alpha", "@bravo", "@charlie", "@delta", "@echo", "@foxtrot"]
        .iter()
        .enumerate()
    {
        store.add_catalog_item(item(&format!("v{i}"), creator, 0.95 - i as f64 * 0.01));
    }
    store
}

fn planner(store: &Arc<MemoryStore>, gateway: Gateway) -> Planner {
    Planner::new(store.clone(), store.clone(), store.clone(), gateway)
}

fn static_gateway() -> Gateway {
    Gateway::new(None, ProviderConfig::default())
}

fn scripted_gateway(store: &Arc<MemoryStore>, script: Vec<Result<String, ProviderError>>) -> Gateway {
    let sink: Arc<dyn ObservabilitySink> = store.clone();
    Gateway::new(Some(Box::new(ScriptedBackend::new(script))), ProviderConfig::default())
        .with_sink(sink)
}

fn morning(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 4, day)
        .unwrap()
        .and_hms_opt(8, 30, 0)
        .unwrap()
}

fn assert_diverse(envelope: &PlanEnvelope) {
    let creators: Vec<&str> = envelope
        .actions
        .iter()
        .filter(|a| a.action_type != ActionType::Avoid)
        .map(|a| a.creator_id.as_deref().expect("non-avoid action without creator"))
        .collect();
    let distinct: HashSet<&str> = creators.iter().copied().collect();
    assert_eq!(distinct.len(), creators.len(), "duplicate creator in {creators:?}");
}

// ===========================================================================
// Generation
// ===========================================================================

#[tokio::test]
async fn anonymous_plan_without_backend_uses_fallback() {
    let store = seeded_store();
    let planner = planner(&store, static_gateway());

    let envelope = planner
        .generate_plan_at(&PlanRequest::anonymous(), morning(1))
        .await
        .unwrap();

    assert_eq!(envelope.category, "fitness");
    assert_eq!(envelope.language, "en");
    assert_eq!(envelope.actions.len(), 5);
    assert_eq!(envelope.metadata.source, PlanSource::Fallback);
    assert_eq!(envelope.metadata.backend, "static");
    assert_eq!(envelope.progress.completed, 0);
    assert_eq!(envelope.progress.total, 5);
    assert!(!envelope.motivation.is_empty());
    assert_diverse(&envelope);
    let positions: Vec<i32> = envelope.actions.iter().map(|a| a.position).collect();
    assert_eq!(positions, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn second_request_is_served_from_cache() {
    let store = seeded_store();
    let planner = planner(&store, static_gateway());
    let user = Uuid::new_v4();
    let request = PlanRequest::for_user(user);

    let first = planner.generate_plan_at(&request, morning(1)).await.unwrap();
    let second = planner.generate_plan_at(&request, morning(1)).await.unwrap();

    assert_eq!(second.metadata.source, PlanSource::Cache);
    assert_eq!(second.plan_id, first.plan_id);
    assert_eq!(second.actions, first.actions);
    assert_eq!(store.plan_count(), 1);
}

#[tokio::test]
async fn stored_plan_is_reused_when_cache_is_cold() {
    let store = seeded_store();
    let user = Uuid::new_v4();
    let request = PlanRequest::for_user(user);

    let first = planner(&store, static_gateway())
        .generate_plan_at(&request, morning(1))
        .await
        .unwrap();
    // A fresh planner has an empty local cache.
    let again = planner(&store, static_gateway())
        .generate_plan_at(&request, morning(1))
        .await
        .unwrap();

    assert_eq!(again.plan_id, first.plan_id);
    assert_eq!(again.metadata.source, PlanSource::Cache);
    assert_eq!(store.plan_count(), 1);

    let next_day = planner(&store, static_gateway())
        .generate_plan_at(&request, morning(2))
        .await
        .unwrap();
    assert_ne!(next_day.plan_id, first.plan_id);
    assert_eq!(store.plan_count(), 2);
}

#[tokio::test]
async fn clean_backend_output_is_tagged_generated() {
    let store = seeded_store();
    let output = r#"Here you go:
```json
{"actions": [
  {"type": "follow", "creator_username": "@alpha", "description": "Mobility", "reason": "Top pick", "video_id": "v0"},
  {"type": "like", "creator_username": "@bravo", "description": "Core", "reason": "Strong", "video_id": "v1"},
  {"type": "save", "creator_username": "@charlie", "description": "HIIT", "reason": "Save it", "video_id": "v2"}
], "motivation": "Small steps every day"}
```"#;
    let planner = planner(&store, scripted_gateway(&store, vec![Ok(output.to_owned())]));

    let envelope = planner
        .generate_plan_at(&PlanRequest::for_user(Uuid::new_v4()).with_count(3), morning(1))
        .await
        .unwrap();

    assert_eq!(envelope.metadata.source, PlanSource::Generated);
    assert_eq!(envelope.metadata.backend, "scripted");
    assert_eq!(envelope.motivation, "Small steps every day");
    assert_eq!(envelope.actions[1].source_ref.as_deref(), Some("v1"));

    let records = store.invocations();
    assert_eq!(records.len(), 1);
    assert!(!records[0].fallback);
    assert_eq!(records[0].backend, "scripted");
    assert_eq!(records[0].prompt_tokens, Some(100));
}

#[tokio::test]
async fn payload_behind_bracketed_prose_is_used_first_time() {
    let store = seeded_store();
    let output = r#"Here are [3] picks for {your} morning:
{"actions": [
  {"type": "follow", "creator_username": "@alpha", "video_id": "v0"},
  {"type": "like", "creator_username": "@bravo", "video_id": "v1"},
  {"type": "save", "creator_username": "@charlie", "video_id": "v2"}
], "motivation": "Keep going"}
Let me know [if] you want changes."#;
    let planner = planner(&store, scripted_gateway(&store, vec![Ok(output.to_owned())]));

    let envelope = planner
        .generate_plan_at(&PlanRequest::anonymous().with_count(3), morning(1))
        .await
        .unwrap();

    assert_eq!(envelope.metadata.source, PlanSource::Generated);
    assert_eq!(envelope.motivation, "Keep going");
    let records = store.invocations();
    assert_eq!(records.len(), 1);
    assert!(records[0].error.is_none());
}

#[tokio::test(start_paused = true)]
async fn blocked_creator_is_never_planned() {
    let store = seeded_store();
    let user = Uuid::new_v4();
    let output = r#"{"actions": [
        {"type": "follow", "creator_id": "@bravo"},
        {"type": "like", "creator_id": "@BRAVO", "video_id": "v1"},
        {"type": "save", "creator_id": "@charlie", "video_id": "v2"}
    ]}"#;
    let planner = planner(&store, scripted_gateway(&store, vec![Ok(output.to_owned())]));

    assert!(planner.block_creator(user, " @Bravo ", Some("not for me")).await.unwrap());
    assert!(!planner.block_creator(user, "@bravo", None).await.unwrap());
    let blocked = planner.blocked_creators(user).await.unwrap();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].creator_id, "@bravo");

    let generated = planner
        .generate_plan_at(&PlanRequest::for_user(user).with_count(4), morning(1))
        .await
        .unwrap();
    let fallback = planner
        .generate_plan_at(&PlanRequest::for_user(user).with_category("wellness"), morning(1))
        .await
        .unwrap();

    assert_eq!(generated.metadata.source, PlanSource::Seed);
    for envelope in [&generated, &fallback] {
        assert!(
            envelope
                .actions
                .iter()
                .filter(|a| a.action_type != ActionType::Avoid)
                .all(|a| a.creator_id.as_deref() != Some("@bravo")),
            "{:?}",
            envelope.actions
        );
        assert_diverse(envelope);
    }

    // Unblocking lets the creator back into later plans.
    assert!(planner.unblock_creator(user, "@BRAVO").await.unwrap());
    let later = planner
        .generate_plan_at(&PlanRequest::for_user(user).with_count(8), morning(2))
        .await
        .unwrap();
    assert!(later.actions.iter().any(|a| a.creator_id.as_deref() == Some("@bravo")));
}

#[tokio::test]
async fn blank_creator_cannot_be_blocked() {
    let store = seeded_store();
    let planner = planner(&store, static_gateway());
    assert!(planner.block_creator(Uuid::new_v4(), "  ", None).await.is_err());
}

#[tokio::test]
async fn duplicate_creators_are_repaired_and_tagged_seed() {
    let store = seeded_store();
    let output = r#"{"actions": [
        {"type": "follow", "creator_id": "@alpha"},
        {"type": "like", "creator_id": "@alpha"},
        {"type": "save", "creator_id": "@alpha"}
    ]}"#;
    let planner = planner(&store, scripted_gateway(&store, vec![Ok(output.to_owned())]));

    let envelope = planner
        .generate_plan_at(&PlanRequest::anonymous().with_count(4), morning(1))
        .await
        .unwrap();

    assert_eq!(envelope.metadata.source, PlanSource::Seed);
    assert_eq!(envelope.actions.len(), 4);
    assert_eq!(envelope.actions[0].creator_id.as_deref(), Some("@alpha"));
    assert_diverse(&envelope);
}

#[tokio::test]
async fn count_is_clamped_to_difficulty_bounds() {
    let store = seeded_store();
    let planner = planner(&store, static_gateway());

    let small = planner
        .generate_plan_at(&PlanRequest::anonymous().with_count(1), morning(1))
        .await
        .unwrap();
    let large = planner
        .generate_plan_at(
            &PlanRequest::anonymous().with_category("wellness").with_count(40),
            morning(1),
        )
        .await
        .unwrap();

    assert_eq!(small.actions.len(), 3);
    assert_eq!(large.actions.len(), 8);
    assert_diverse(&large);
}

#[tokio::test(start_paused = true)]
async fn always_failing_backend_falls_back_within_budget() {
    let store = seeded_store();
    let planner = planner(&store, scripted_gateway(&store, Vec::new()));

    let started = tokio::time::Instant::now();
    let envelope = planner
        .generate_plan_at(&PlanRequest::anonymous(), morning(1))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(14));
    assert_eq!(envelope.metadata.source, PlanSource::Fallback);
    assert_eq!(envelope.actions.len(), 5);
    assert_diverse(&envelope);

    let records = store.invocations();
    assert_eq!(records.len(), 4);
    assert!(records[3].fallback);
}

#[tokio::test]
async fn low_completion_creator_is_excluded() {
    let store = seeded_store();
    let user = Uuid::new_v4();
    let tracker = Default::default();

    // Six exposures to @alpha, two completed.
    for day in 1..=6 {
        let stored = store
            .persist_plan(PlanDraft {
                user_id: Some(user),
                category: "history".to_owned(),
                date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
                language: "en".to_owned(),
                source: PlanSource::Generated,
                backend: "static".to_owned(),
                motivation: None,
                generation_ms: 1,
                actions: vec![SelectedAction {
                    action_type: ActionType::Follow,
                    creator_id: Some("@alpha".to_owned()),
                    description: "old".to_owned(),
                    reason: "old".to_owned(),
                    source_ref: None,
                }],
            })
            .await
            .unwrap()
            .into_plan();
        if day <= 2 {
            store
                .complete_action(user, stored.actions[0].id, stored.plan.plan_date, &tracker)
                .await
                .unwrap();
        }
    }

    let envelope = planner(&store, static_gateway())
        .generate_plan_at(&PlanRequest::for_user(user), morning(1))
        .await
        .unwrap();

    assert!(
        envelope
            .actions
            .iter()
            .filter(|a| a.action_type != ActionType::Avoid)
            .all(|a| a.creator_id.as_deref() != Some("@alpha")),
        "{:?}",
        envelope.actions
    );
}

#[tokio::test]
async fn template_motivation_wins_over_backend() {
    let store = seeded_store();
    store.add_template(MessageTemplate {
        id: Uuid::new_v4(),
        template_key: "fresh_start".to_owned(),
        category: "progress".to_owned(),
        message_en: "Fresh start".to_owned(),
        message_ru: None,
        message_es: Some("Nuevo comienzo".to_owned()),
        conditions: serde_json::json!({"progress_pct_max": 0}),
        emoji: None,
        priority: 10,
        is_active: true,
    });
    let output = r#"{"actions": [], "motivation": "from backend"}"#;
    let planner = planner(&store, scripted_gateway(&store, vec![Ok(output.to_owned())]));

    let envelope = planner
        .generate_plan_at(&PlanRequest::anonymous().with_language("es"), morning(1))
        .await
        .unwrap();

    assert_eq!(envelope.motivation, "Nuevo comienzo");
    assert_eq!(envelope.metadata.source, PlanSource::Seed);
}

#[tokio::test]
async fn persistence_failure_is_fatal_and_not_cached() {
    let store = seeded_store();
    store.set_read_only(true);
    let planner = planner(&store, static_gateway());
    let date = morning(1);

    let err = planner
        .generate_plan_at(&PlanRequest::anonymous(), date)
        .await
        .unwrap_err();

    assert!(matches!(err, PlanError::GenerationFailed(_)));
    let key = plan_key(None, "fitness", date.date());
    assert!(planner.cache().get(&key).await.is_none());
}

// ===========================================================================
// Completion
// ===========================================================================

#[tokio::test]
async fn completion_invalidates_cached_plan() {
    let store = seeded_store();
    let planner = planner(&store, static_gateway());
    let user = Uuid::new_v4();
    let request = PlanRequest::for_user(user).with_count(3);
    let day = morning(5);

    let envelope = planner.generate_plan_at(&request, day).await.unwrap();
    let key = plan_key(Some(user), "fitness", day.date());
    assert!(planner.cache().get(&key).await.is_some());

    let outcome = planner
        .complete_action_on(user, envelope.actions[0].id, day.date())
        .await
        .unwrap();
    assert!(outcome.newly_completed);
    assert!(!outcome.plan_completed);
    assert!(planner.cache().get(&key).await.is_none());

    let refreshed = planner.generate_plan_at(&request, day).await.unwrap();
    assert_eq!(refreshed.plan_id, envelope.plan_id);
    assert_eq!(refreshed.progress.completed, 1);
    assert_eq!(refreshed.progress.total, 3);
}

#[tokio::test]
async fn finishing_the_plan_starts_a_streak() {
    let store = seeded_store();
    let planner = planner(&store, static_gateway());
    let user = Uuid::new_v4();
    let day = morning(5);

    let envelope = planner
        .generate_plan_at(&PlanRequest::for_user(user).with_count(3), day)
        .await
        .unwrap();

    let mut last = None;
    for action in &envelope.actions {
        last = Some(
            planner
                .complete_action_on(user, action.id, day.date())
                .await
                .unwrap(),
        );
    }
    let last = last.unwrap();
    assert!(last.plan_completed);
    assert_eq!(last.stats.streak_current, 1);
    assert_eq!(last.stats.total_days_active, 1);

    let stats = planner.engagement_stats(user).await.unwrap();
    assert_eq!(stats, last.stats);
    assert!(stats.xp_total >= 25);

    let repeat = planner
        .complete_action_on(user, envelope.actions[0].id, day.date())
        .await
        .unwrap();
    assert!(!repeat.newly_completed);
    assert_eq!(repeat.stats.xp_total, stats.xp_total);
}

#[tokio::test]
async fn unknown_action_is_rejected() {
    let store = seeded_store();
    let planner = planner(&store, static_gateway());

    let err = planner
        .complete_action_on(Uuid::new_v4(), Uuid::new_v4(), morning(1).date())
        .await
        .unwrap_err();
    assert!(matches!(err, EngagementError::ActionNotFound(_)));
}
