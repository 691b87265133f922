//! PgStore and PgCache against a real PostgreSQL.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use feedplan_db::models::{ActionType, CatalogItem, PlanSource};
use feedplan_db::queries::{ai_logs, catalog, templates};
use feedplan_test_utils::{create_test_db, drop_test_db};

use feedplan_core::cache::{Cache, CacheBackend, PgCache};
use feedplan_core::config::ProviderConfig;
use feedplan_core::engagement::{EngagementError, Tracker};
use feedplan_core::motivation::TemplateContext;
use feedplan_core::orchestrator::{PlanRequest, Planner};
use feedplan_core::provider::{Gateway, InvocationRecord, ObservabilitySink};
use feedplan_core::store::{ContentCatalog, MessageTemplates, Persisted, PgStore, PlanDraft, PlanStore};
use feedplan_core::types::SelectedAction;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
}

fn follow(creator: &str, source: &str) -> SelectedAction {
    SelectedAction {
        action_type: ActionType::Follow,
        creator_id: Some(creator.to_owned()),
        description: format!("{creator} clip"),
        reason: "test".to_owned(),
        source_ref: Some(source.to_owned()),
    }
}

fn draft(user_id: Option<Uuid>, date: NaiveDate, actions: Vec<SelectedAction>) -> PlanDraft {
    PlanDraft {
        user_id,
        category: "fitness".to_owned(),
        date,
        language: "en".to_owned(),
        source: PlanSource::Generated,
        backend: "anthropic".to_owned(),
        motivation: Some("Keep going".to_owned()),
        generation_ms: 42,
        actions,
    }
}

#[tokio::test]
async fn persist_plan_writes_actions_in_order() {
    let (pool, db_name) = create_test_db().await;
    let store = PgStore::new(pool.clone());
    let user = Uuid::new_v4();

    let created = store
        .persist_plan(draft(
            Some(user),
            day(1),
            vec![follow("@a", "v1"), follow("@b", "v2"), follow("@c", "v3")],
        ))
        .await
        .unwrap();
    let Persisted::Created(plan) = created else {
        panic!("expected a new plan");
    };
    let positions: Vec<i32> = plan.actions.iter().map(|a| a.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);

    let again = store
        .persist_plan(draft(Some(user), day(1), vec![follow("@z", "v9")]))
        .await
        .unwrap();
    let Persisted::Existing(existing) = again else {
        panic!("expected the existing plan");
    };
    assert_eq!(existing.plan.id, plan.plan.id);
    assert_eq!(existing.actions.len(), 3);

    let found = store.find_plan(Some(user), "fitness", day(1)).await.unwrap().unwrap();
    assert_eq!(found, plan);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn complete_action_updates_stats_once() {
    let (pool, db_name) = create_test_db().await;
    let store = PgStore::new(pool.clone());
    let tracker = Tracker::default();
    let user = Uuid::new_v4();

    let plan = store
        .persist_plan(draft(Some(user), day(1), vec![follow("@a", "v1"), follow("@b", "v2")]))
        .await
        .unwrap()
        .into_plan();

    let first = store
        .complete_action(user, plan.actions[0].id, day(1), &tracker)
        .await
        .unwrap();
    assert!(first.newly_completed);
    assert_eq!(first.xp_earned, 10);
    assert!(!first.plan_completed);

    let repeat = store
        .complete_action(user, plan.actions[0].id, day(1), &tracker)
        .await
        .unwrap();
    assert!(!repeat.newly_completed);
    assert_eq!(repeat.stats.xp_total, 10);

    let last = store
        .complete_action(user, plan.actions[1].id, day(1), &tracker)
        .await
        .unwrap();
    assert!(last.plan_completed);
    assert_eq!(last.xp_earned, 10 + 25);
    assert_eq!(last.stats.streak_current, 1);
    assert_eq!(last.stats.last_active_date, Some(day(1)));

    let stored = store.engagement_stats(user).await.unwrap().unwrap();
    assert_eq!(stored, last.stats);
    assert_eq!(stored.total_actions_completed, 2);

    let progress = store.plan_progress(Some(user), plan.plan.id).await.unwrap();
    assert!(progress.is_complete());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn concurrent_completions_are_serialized() {
    let (pool, db_name) = create_test_db().await;
    let store = Arc::new(PgStore::new(pool.clone()));
    let user = Uuid::new_v4();

    let plan = store
        .persist_plan(draft(
            Some(user),
            day(1),
            vec![follow("@a", "v1"), follow("@b", "v2"), follow("@c", "v3")],
        ))
        .await
        .unwrap()
        .into_plan();

    let mut handles = Vec::new();
    for action in plan.actions.iter().chain(plan.actions.iter()) {
        let store = Arc::clone(&store);
        let action_id = action.id;
        handles.push(tokio::spawn(async move {
            store
                .complete_action(user, action_id, day(1), &Tracker::default())
                .await
                .unwrap()
        }));
    }
    let mut newly = 0;
    let mut finished = 0;
    for handle in handles {
        let outcome = handle.await.unwrap();
        newly += usize::from(outcome.newly_completed);
        finished += usize::from(outcome.plan_completed);
    }
    assert_eq!(newly, 3);
    assert_eq!(finished, 1);

    let stats = store.engagement_stats(user).await.unwrap().unwrap();
    assert_eq!(stats.total_actions_completed, 3);
    assert_eq!(stats.xp_total, 3 * 10 + 25);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn foreign_and_anonymous_actions_are_not_found() {
    let (pool, db_name) = create_test_db().await;
    let store = PgStore::new(pool.clone());
    let tracker = Tracker::default();

    let owned = store
        .persist_plan(draft(Some(Uuid::new_v4()), day(1), vec![follow("@a", "v1")]))
        .await
        .unwrap()
        .into_plan();
    let anon = store
        .persist_plan(draft(None, day(1), vec![follow("@a", "v1")]))
        .await
        .unwrap()
        .into_plan();

    for action_id in [owned.actions[0].id, anon.actions[0].id, Uuid::new_v4()] {
        let err = store
            .complete_action(Uuid::new_v4(), action_id, day(1), &tracker)
            .await
            .unwrap_err();
        assert!(matches!(err, EngagementError::ActionNotFound(id) if id == action_id));
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn catalog_and_templates_are_read_through() {
    let (pool, db_name) = create_test_db().await;
    let store = PgStore::new(pool.clone());

    catalog::upsert_item(
        &pool,
        &CatalogItem {
            source_id: "v1".into(),
            category: "fitness".into(),
            creator_id: "@a".into(),
            description: "Mobility".into(),
            quality_score: 0.9,
            engagement_rate: 0.1,
            freshness_days: 1,
            thumbnail_ref: None,
            source_url: None,
            expires_at: None,
        },
    )
    .await
    .unwrap();
    templates::upsert_template(
        &pool,
        &templates::NewMessageTemplate {
            template_key: "halfway",
            category: "progress",
            message_en: "Halfway there",
            message_ru: None,
            message_es: None,
            conditions: serde_json::json!({"progress_pct_min": 50}),
            emoji: Some("💪"),
            priority: 5,
        },
    )
    .await
    .unwrap();

    let candidates = store.candidates("fitness").await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].creator_id, "@a");

    let mut ctx = TemplateContext::new();
    ctx.insert("progress_pct".into(), 60);
    let message = store.find_best_match("progress", &ctx, "en").await.unwrap();
    assert_eq!(message.as_deref(), Some("💪 Halfway there"));

    ctx.insert("progress_pct".into(), 10);
    assert!(store.find_best_match("progress", &ctx, "en").await.unwrap().is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn invocation_records_are_written_in_background() {
    let (pool, db_name) = create_test_db().await;
    let store = PgStore::new(pool.clone());

    store.record(InvocationRecord {
        backend: "anthropic".into(),
        model: "claude-3-5-haiku-20241022".into(),
        attempt: 1,
        latency_ms: 812,
        prompt_tokens: Some(900),
        completion_tokens: Some(300),
        cost_usd: Some(0.0024),
        error: None,
        fallback: false,
    });

    let mut logs = Vec::new();
    for _ in 0..50 {
        logs = ai_logs::list_recent(&pool, 10).await.unwrap();
        if !logs.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].latency_ms, 812);
    assert!(!logs[0].fallback);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn pg_cache_round_trip() {
    let (pool, db_name) = create_test_db().await;
    let backend = PgCache::new(pool.clone());

    backend
        .set("plan:u1:fitness:2025-05-01", "{}".into(), Duration::from_secs(60))
        .await
        .unwrap();
    backend
        .set("plan:u1:wellness:2025-05-01", "{}".into(), Duration::from_secs(60))
        .await
        .unwrap();
    backend
        .set("plan:u2:fitness:2025-05-01", "{}".into(), Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(
        backend.get("plan:u1:fitness:2025-05-01").await.unwrap().as_deref(),
        Some("{}")
    );
    assert_eq!(backend.delete_prefix("plan:u1:").await.unwrap(), 2);
    assert!(backend.get("plan:u1:fitness:2025-05-01").await.unwrap().is_none());
    assert!(backend.delete("plan:u2:fitness:2025-05-01").await.unwrap());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn planner_end_to_end_on_postgres() {
    let (pool, db_name) = create_test_db().await;
    let store = Arc::new(PgStore::new(pool.clone()));
    let planner = Planner::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Gateway::new(None, ProviderConfig::default()),
    )
    .with_cache(Cache::with_shared(PgCache::new(pool.clone())));
    let user = Uuid::new_v4();
    let now = day(3).and_time(NaiveTime::from_hms_opt(19, 0, 0).unwrap());

    let envelope = planner
        .generate_plan_at(&PlanRequest::for_user(user).with_count(3), now)
        .await
        .unwrap();
    assert_eq!(envelope.actions.len(), 3);

    let cached = planner
        .generate_plan_at(&PlanRequest::for_user(user).with_count(3), now)
        .await
        .unwrap();
    assert_eq!(cached.plan_id, envelope.plan_id);
    assert_eq!(cached.metadata.source, PlanSource::Cache);

    let outcome = planner
        .complete_action_on(user, envelope.actions[0].id, now.date())
        .await
        .unwrap();
    assert!(outcome.newly_completed);

    let refreshed = planner
        .generate_plan_at(&PlanRequest::for_user(user), now)
        .await
        .unwrap();
    assert_eq!(refreshed.plan_id, envelope.plan_id);
    assert_eq!(refreshed.progress.completed, 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn blocked_creators_are_excluded_on_postgres() {
    let (pool, db_name) = create_test_db().await;
    for (i, creator) in ["@alpha", "@bravo", "@charlie", "@delta"].iter().enumerate() {
        let item = CatalogItem {
            source_id: format!("b{i}"),
            category: "fitness".to_owned(),
            creator_id: (*creator).to_owned(),
            description: format!("{creator} routine"),
            quality_score: 0.95 - i as f64 * 0.01,
            engagement_rate: 0.1,
            freshness_days: 1,
            thumbnail_ref: None,
            source_url: None,
            expires_at: None,
        };
        catalog::upsert_item(&pool, &item).await.unwrap();
    }
    let store = Arc::new(PgStore::new(pool.clone()));
    let planner = Planner::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Gateway::new(None, ProviderConfig::default()),
    );
    let user = Uuid::new_v4();

    assert!(planner.block_creator(user, "@Alpha", None).await.unwrap());
    assert_eq!(store.blocked_creators(user).await.unwrap()[0].creator_id, "@alpha");

    let now = day(4).and_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap());
    let envelope = planner
        .generate_plan_at(&PlanRequest::for_user(user).with_count(3), now)
        .await
        .unwrap();
    let creators: Vec<Option<&str>> = envelope.actions.iter().map(|a| a.creator_id.as_deref()).collect();
    assert_eq!(creators, vec![Some("@bravo"), Some("@charlie"), Some("@delta")]);

    assert!(planner.unblock_creator(user, "@alpha").await.unwrap());
    assert!(store.blocked_creators(user).await.unwrap().is_empty());

    pool.close().await;
    drop_test_db(&db_name).await;
}
