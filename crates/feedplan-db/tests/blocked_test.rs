//! Integration tests for the `blocked_creators` queries.

use uuid::Uuid;

use feedplan_db::queries::blocked;
use feedplan_test_utils::{create_test_db, drop_test_db};

#[tokio::test]
async fn block_is_idempotent_and_per_user() {
    let (pool, db_name) = create_test_db().await;
    let user = Uuid::new_v4();
    let other = Uuid::new_v4();

    assert!(blocked::block_creator(&pool, user, "@spam", Some("too loud")).await.unwrap());
    assert!(!blocked::block_creator(&pool, user, "@spam", None).await.unwrap());
    assert!(blocked::block_creator(&pool, user, "@noise", None).await.unwrap());

    let rows = blocked::list_blocked(&pool, user).await.unwrap();
    assert_eq!(rows.len(), 2);
    let spam = rows.iter().find(|r| r.creator_id == "@spam").unwrap();
    assert_eq!(spam.reason.as_deref(), Some("too loud"));
    assert!(blocked::list_blocked(&pool, other).await.unwrap().is_empty());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn unblock_reports_whether_anything_was_removed() {
    let (pool, db_name) = create_test_db().await;
    let user = Uuid::new_v4();

    blocked::block_creator(&pool, user, "@spam", None).await.unwrap();
    assert!(blocked::unblock_creator(&pool, user, "@spam").await.unwrap());
    assert!(!blocked::unblock_creator(&pool, user, "@spam").await.unwrap());
    assert!(blocked::list_blocked(&pool, user).await.unwrap().is_empty());

    pool.close().await;
    drop_test_db(&db_name).await;
}
