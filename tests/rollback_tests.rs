use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use object_store_replay::{
    BucketName, InMemoryVersionedStore, ObjectKey, RollbackRequest, RollbackService,
    RollbackTarget,
};
use tokio_util::sync::CancellationToken;

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, d, 0, 0, 0).unwrap()
}

fn request(target: RollbackTarget, timestamp: DateTime<Utc>) -> RollbackRequest {
    RollbackRequest {
        bucket: BucketName::new("backups").unwrap(),
        target,
        timestamp,
        concurrency: 4,
    }
}

fn key_target(key: &str) -> RollbackTarget {
    RollbackTarget::Key(ObjectKey::new(key).unwrap())
}

async fn store_with_bucket() -> InMemoryVersionedStore {
    let store = InMemoryVersionedStore::new();
    store.create_bucket("backups").await;
    store
}

#[tokio::test]
async fn key_untouched_since_target_is_left_alone() {
    let store = store_with_bucket().await;
    store
        .put_version_at("backups", "report.csv", "v1", day(1))
        .await
        .unwrap();

    let service = RollbackService::new(Arc::new(store.clone()));
    let summary = service
        .run(
            request(key_target("report.csv"), day(2)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(store.copy_count(), 0);
    assert_eq!(store.delete_count(), 0);
    assert_eq!(store.record_count("backups", "report.csv").await, 1);
}

#[tokio::test]
async fn key_created_after_target_is_deleted() {
    let store = store_with_bucket().await;
    store
        .put_version_at("backups", "report.csv", "v1", day(2))
        .await
        .unwrap();

    let service = RollbackService::new(Arc::new(store.clone()));
    let summary = service
        .run(
            request(key_target("report.csv"), day(1)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.deleted, 1);
    assert_eq!(store.delete_count(), 1);
    assert_eq!(store.copy_count(), 0);
    let (_, is_marker) = store
        .current_version("backups", "report.csv")
        .await
        .unwrap();
    assert!(is_marker, "current version should be a tombstone");
}

#[tokio::test]
async fn drifted_key_is_restored_to_pre_target_version() {
    let store = store_with_bucket().await;
    store
        .put_version_at("backups", "report.csv", "old content", day(1))
        .await
        .unwrap();
    store
        .put_version_at("backups", "report.csv", "new content", day(3))
        .await
        .unwrap();

    let service = RollbackService::new(Arc::new(store.clone()));
    let summary = service
        .run(
            request(key_target("report.csv"), day(2)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.restored, 1);
    assert_eq!(store.copy_count(), 1);
    assert_eq!(store.delete_count(), 0);
    assert_eq!(
        store.current_data("backups", "report.csv").await,
        Some("old content".into())
    );
}

#[tokio::test]
async fn tombstone_written_after_target_counts_as_drift() {
    let store = store_with_bucket().await;
    store
        .put_version_at("backups", "report.csv", "v1", day(1))
        .await
        .unwrap();
    store
        .put_delete_marker_at("backups", "report.csv", day(3))
        .await
        .unwrap();

    let service = RollbackService::new(Arc::new(store.clone()));
    let summary = service
        .run(
            request(key_target("report.csv"), day(2)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.restored, 1);
    assert_eq!(
        store.current_data("backups", "report.csv").await,
        Some("v1".into()),
        "the tombstone should be shadowed by the restored version"
    );
}

#[tokio::test]
async fn prefix_rollback_touches_only_drifted_keys() {
    let store = store_with_bucket().await;
    store
        .put_version_at("backups", "data/a", "a1", day(1))
        .await
        .unwrap();
    store
        .put_version_at("backups", "data/a", "a2", day(3))
        .await
        .unwrap();
    store
        .put_version_at("backups", "data/b", "b1", day(1))
        .await
        .unwrap();
    store
        .put_version_at("backups", "other/c", "c2", day(3))
        .await
        .unwrap();

    let service = RollbackService::new(Arc::new(store.clone()));
    let summary = service
        .run(
            request(RollbackTarget::Prefix("data/".to_string()), day(2)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.examined, 2);
    assert_eq!(summary.restored, 1);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(store.copy_count(), 1);
    // Out-of-prefix key keeps its drift
    assert_eq!(
        store.current_data("backups", "other/c").await,
        Some("c2".into())
    );
}

#[tokio::test]
async fn scoped_rollback_ignores_keys_sharing_the_prefix() {
    let store = store_with_bucket().await;
    store
        .put_version_at("backups", "file", "f1", day(1))
        .await
        .unwrap();
    store
        .put_version_at("backups", "file", "f2", day(3))
        .await
        .unwrap();
    // Same prefix, different key, also drifted
    store
        .put_version_at("backups", "file.bak", "bak2", day(3))
        .await
        .unwrap();

    let service = RollbackService::new(Arc::new(store.clone()));
    service
        .run(
            request(key_target("file"), day(2)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(store.copy_count(), 1);
    assert_eq!(
        store.current_data("backups", "file.bak").await,
        Some("bak2".into()),
        "file.bak must not be rolled back when targeting 'file'"
    );
}

#[tokio::test]
async fn missing_key_is_reported_and_does_not_abort() {
    let store = store_with_bucket().await;
    let service = RollbackService::new(Arc::new(store.clone()));
    let summary = service
        .run(
            request(key_target("does-not-exist"), day(1)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].0, "does-not-exist");
}

#[tokio::test]
async fn rerunning_a_rollback_converges_on_the_same_state() {
    let store = store_with_bucket().await;
    store
        .put_version_at("backups", "report.csv", "old", day(1))
        .await
        .unwrap();
    store
        .put_version_at("backups", "report.csv", "new", day(3))
        .await
        .unwrap();

    let service = RollbackService::new(Arc::new(store.clone()));
    for _ in 0..2 {
        service
            .run(
                request(key_target("report.csv"), day(2)),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
    }

    assert_eq!(
        store.current_data("backups", "report.csv").await,
        Some("old".into())
    );
}

#[tokio::test]
async fn history_spanning_multiple_pages_is_aggregated() {
    let store = InMemoryVersionedStore::with_page_size(2);
    store.create_bucket("backups").await;
    for d in 1..=6 {
        store
            .put_version_at("backups", "big", format!("v{d}"), day(d))
            .await
            .unwrap();
    }

    let service = RollbackService::new(Arc::new(store.clone()));
    let summary = service
        .run(
            request(key_target("big"), day(4)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.restored, 1);
    // Freshest version strictly before day 4 is day 3's
    assert_eq!(
        store.current_data("backups", "big").await,
        Some("v3".into())
    );
}
