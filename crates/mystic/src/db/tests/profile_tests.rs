use crate::db::{
    Database, PlanType, TestDb, UsageCommit, UserId, DEFAULT_FREE_READINGS,
};
use chrono::Utc;
use pretty_assertions::assert_eq;
use std::sync::Arc;

async fn drain_readings(db: &Arc<Database>, user_id: &UserId, count: usize) {
    for _ in 0..count {
        assert_eq!(
            db.commit_reading_usage(user_id, Utc::now()).await.unwrap(),
            UsageCommit::Committed
        );
    }
}

#[tokio::test]
async fn test_get_or_create_profile_is_idempotent() {
    let test_db = TestDb::sqlite().await;
    let db = test_db.db();
    let user_id = UserId::new("user-1");

    let created = db
        .get_or_create_profile(&user_id, "user@example.com")
        .await
        .unwrap();
    assert_eq!(created.free_readings_remaining, DEFAULT_FREE_READINGS);
    assert_eq!(created.readings_count, 0);
    assert_eq!(created.plan_type, PlanType::None);
    assert!(!created.is_premium);
    assert!(created.last_reading_date.is_none());

    let fetched = db
        .get_or_create_profile(&user_id, "user@example.com")
        .await
        .unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_commit_decrements_until_exhausted() {
    let test_db = TestDb::sqlite().await;
    let db = test_db.db();
    let user_id = UserId::new("user-1");
    db.get_or_create_profile(&user_id, "user@example.com")
        .await
        .unwrap();

    drain_readings(db, &user_id, DEFAULT_FREE_READINGS as usize).await;

    let profile = db.get_profile(&user_id).await.unwrap().unwrap();
    assert_eq!(profile.free_readings_remaining, 0);
    assert_eq!(profile.readings_count, DEFAULT_FREE_READINGS);
    assert!(profile.last_reading_date.is_some());

    assert_eq!(
        db.commit_reading_usage(&user_id, Utc::now()).await.unwrap(),
        UsageCommit::QuotaExhausted
    );

    // A failed commit leaves the profile untouched.
    let unchanged = db.get_profile(&user_id).await.unwrap().unwrap();
    assert_eq!(unchanged.free_readings_remaining, 0);
    assert_eq!(unchanged.readings_count, DEFAULT_FREE_READINGS);
}

#[tokio::test]
async fn test_profile_with_one_reading_left_allows_exactly_one_commit() {
    let test_db = TestDb::sqlite().await;
    let db = test_db.db();
    let user_id = UserId::new("user-1");
    db.get_or_create_profile(&user_id, "user@example.com")
        .await
        .unwrap();
    drain_readings(db, &user_id, (DEFAULT_FREE_READINGS - 1) as usize).await;

    assert_eq!(
        db.commit_reading_usage(&user_id, Utc::now()).await.unwrap(),
        UsageCommit::Committed
    );
    assert_eq!(
        db.commit_reading_usage(&user_id, Utc::now()).await.unwrap(),
        UsageCommit::QuotaExhausted
    );
}

#[tokio::test]
async fn test_concurrent_commits_never_drive_quota_negative() {
    let test_db = TestDb::sqlite().await;
    let db = test_db.db();
    let user_id = UserId::new("user-1");
    db.get_or_create_profile(&user_id, "user@example.com")
        .await
        .unwrap();

    let attempts = (DEFAULT_FREE_READINGS + 3) as usize;
    let outcomes = futures::future::join_all(
        (0..attempts).map(|_| db.commit_reading_usage(&user_id, Utc::now())),
    )
    .await;

    let committed = outcomes
        .into_iter()
        .filter(|outcome| matches!(outcome, Ok(UsageCommit::Committed)))
        .count();
    assert_eq!(committed, DEFAULT_FREE_READINGS as usize);

    let profile = db.get_profile(&user_id).await.unwrap().unwrap();
    assert_eq!(profile.free_readings_remaining, 0);
    assert_eq!(profile.readings_count, DEFAULT_FREE_READINGS);
}

#[tokio::test]
async fn test_premium_commit_is_bookkeeping_only() {
    let test_db = TestDb::sqlite().await;
    let db = test_db.db();
    let user_id = UserId::new("user-1");
    db.get_or_create_profile(&user_id, "user@example.com")
        .await
        .unwrap();
    db.set_premium(&user_id, PlanType::Premium).await.unwrap();

    for _ in 0..3 {
        assert_eq!(
            db.commit_reading_usage(&user_id, Utc::now()).await.unwrap(),
            UsageCommit::Committed
        );
    }

    let profile = db.get_profile(&user_id).await.unwrap().unwrap();
    assert!(profile.is_premium);
    assert_eq!(profile.plan_type, PlanType::Premium);
    assert_eq!(profile.readings_count, 3);
    assert_eq!(profile.free_readings_remaining, DEFAULT_FREE_READINGS);
    assert!(profile.last_reading_date.is_some());
}

#[tokio::test]
async fn test_premium_never_exhausts_even_at_zero_quota() {
    let test_db = TestDb::sqlite().await;
    let db = test_db.db();
    let user_id = UserId::new("user-1");
    db.get_or_create_profile(&user_id, "user@example.com")
        .await
        .unwrap();
    drain_readings(db, &user_id, DEFAULT_FREE_READINGS as usize).await;
    db.set_premium(&user_id, PlanType::Premium).await.unwrap();

    assert_eq!(
        db.commit_reading_usage(&user_id, Utc::now()).await.unwrap(),
        UsageCommit::Committed
    );

    let profile = db.get_profile(&user_id).await.unwrap().unwrap();
    assert_eq!(profile.free_readings_remaining, 0);
    assert_eq!(profile.readings_count, DEFAULT_FREE_READINGS + 1);
}

#[tokio::test]
async fn test_set_premium_requires_an_existing_profile() {
    let test_db = TestDb::sqlite().await;
    let db = test_db.db();
    let user_id = UserId::new("missing");

    assert!(db.set_premium(&user_id, PlanType::Basic).await.is_err());
    assert!(db.get_profile(&user_id).await.unwrap().is_none());
}
