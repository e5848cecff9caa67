use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use object_store_replay::{
    read_change_log, BucketName, ChangeSink, ChangeType, FileChangeLog, InMemoryVersionedStore,
    ReplayListOptions, ReplayListService,
};
use tokio_util::sync::CancellationToken;

fn hour(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 5, 1, h, 0, 0).unwrap()
}

fn options(since: DateTime<Utc>) -> ReplayListOptions {
    ReplayListOptions {
        bucket: BucketName::new("source").unwrap(),
        prefix: String::new(),
        since,
        concurrency: 4,
        batch_size: 1000,
    }
}

async fn seeded_store() -> InMemoryVersionedStore {
    let store = InMemoryVersionedStore::new();
    store.create_bucket("source").await;
    store
}

#[tokio::test]
async fn delete_then_restore_is_classified_as_undelete() {
    let store = seeded_store().await;
    let v1 = store
        .put_version_at("source", "doc", "original", hour(1))
        .await
        .unwrap();
    store
        .put_delete_marker_at("source", "doc", hour(2))
        .await
        .unwrap();
    store
        .put_version_at("source", "doc", "revived", hour(3))
        .await
        .unwrap();

    let service = ReplayListService::new(Arc::new(store));
    let changes = service
        .collect(&options(hour(2)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].change_type, ChangeType::Delete);
    assert!(changes[0].is_delete_marker);
    assert_eq!(changes[0].previous_version_id, None);
    assert_eq!(changes[1].change_type, ChangeType::Undelete);
    assert_eq!(
        changes[1].previous_version_id.as_deref(),
        Some(v1.as_str()),
        "undelete should point at the version preceding the tombstone"
    );
}

#[tokio::test]
async fn key_born_inside_the_window_starts_with_create() {
    let store = seeded_store().await;
    store
        .put_version_at("source", "fresh", "hello", hour(3))
        .await
        .unwrap();
    store
        .put_version_at("source", "fresh", "world", hour(4))
        .await
        .unwrap();

    let service = ReplayListService::new(Arc::new(store));
    let changes = service
        .collect(&options(hour(2)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].change_type, ChangeType::Create);
    assert_eq!(changes[0].previous_version_id, None);
    assert_eq!(changes[1].change_type, ChangeType::Update);
}

#[tokio::test]
async fn unchanged_keys_produce_no_entries() {
    let store = seeded_store().await;
    store
        .put_version_at("source", "static", "same", hour(1))
        .await
        .unwrap();
    store
        .put_version_at("source", "moving", "v2", hour(3))
        .await
        .unwrap();

    let service = ReplayListService::new(Arc::new(store));
    let changes = service
        .collect(&options(hour(2)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].key, "moving");
}

#[tokio::test]
async fn log_is_globally_sorted_across_keys() {
    let store = seeded_store().await;
    // Interleave three keys' events in time
    store.put_version_at("source", "a", "1", hour(1)).await.unwrap();
    store.put_version_at("source", "b", "2", hour(2)).await.unwrap();
    store.put_version_at("source", "a", "3", hour(3)).await.unwrap();
    store.put_version_at("source", "c", "4", hour(4)).await.unwrap();
    store.put_version_at("source", "b", "5", hour(5)).await.unwrap();

    let service = ReplayListService::new(Arc::new(store));
    let changes = service
        .collect(&options(hour(0)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(changes.len(), 5);
    for pair in changes.windows(2) {
        assert!(
            pair[0].timestamp <= pair[1].timestamp,
            "log must be sorted by timestamp"
        );
    }
}

#[tokio::test]
async fn written_log_round_trips_through_the_file_codec() {
    let store = seeded_store().await;
    store
        .put_version_at("source", "doc", "one", hour(1))
        .await
        .unwrap();
    store
        .put_version_at("source", "doc", "two", hour(2))
        .await
        .unwrap();
    store
        .put_delete_marker_at("source", "doc", hour(3))
        .await
        .unwrap();

    let service = ReplayListService::new(Arc::new(store));
    let expected = service
        .collect(&options(hour(0)), &CancellationToken::new())
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("changes.json");
    let sink = FileChangeLog::create(&path).unwrap();
    let mut opts = options(hour(0));
    opts.batch_size = 1; // one write per change
    let written = service
        .run(&opts, &sink, &CancellationToken::new())
        .await
        .unwrap();
    sink.close().unwrap();

    assert_eq!(written, expected.len());
    let decoded = read_change_log(&path).unwrap();
    assert_eq!(decoded, expected);

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.starts_with("[\n  {"));
    assert!(raw.ends_with("\n]\n"));
    assert!(raw.contains(",\n  {"));
}

#[tokio::test]
async fn empty_enumeration_writes_an_empty_array() {
    let store = seeded_store().await;
    store
        .put_version_at("source", "old", "data", hour(1))
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.json");
    let sink = FileChangeLog::create(&path).unwrap();

    let service = ReplayListService::new(Arc::new(store));
    let written = service
        .run(&options(hour(5)), &sink, &CancellationToken::new())
        .await
        .unwrap();
    sink.close().unwrap();

    assert_eq!(written, 0);
    assert_eq!(read_change_log(&path).unwrap(), Vec::new());
}

#[tokio::test]
async fn enumeration_survives_paginated_listings() {
    let store = InMemoryVersionedStore::with_page_size(3);
    store.create_bucket("source").await;
    for h in 1..10 {
        store
            .put_version_at("source", "churn", format!("v{h}"), hour(h))
            .await
            .unwrap();
    }
    store
        .put_version_at("source", "quiet", "x", hour(1))
        .await
        .unwrap();

    let service = ReplayListService::new(Arc::new(store));
    let changes = service
        .collect(&options(hour(4)), &CancellationToken::new())
        .await
        .unwrap();

    // Hours 4..9 of "churn"; "quiet" predates the window
    assert_eq!(changes.len(), 6);
    assert!(changes.iter().all(|c| c.key == "churn"));
    assert_eq!(changes[0].change_type, ChangeType::Update);
    assert!(changes[0].previous_version_id.is_some());
}

#[tokio::test]
async fn unversioned_bucket_is_enumerated_with_a_warning() {
    let store = InMemoryVersionedStore::new();
    store.create_unversioned_bucket("source").await;
    store
        .put_version_at("source", "doc", "data", hour(3))
        .await
        .unwrap();

    let service = ReplayListService::new(Arc::new(store));
    let changes = service
        .collect(&options(hour(1)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].change_type, ChangeType::Create);
}

#[tokio::test]
async fn missing_bucket_aborts_the_enumeration() {
    let store = InMemoryVersionedStore::new();
    let service = ReplayListService::new(Arc::new(store));
    let result = service
        .collect(&options(hour(1)), &CancellationToken::new())
        .await;
    assert!(result.is_err());
}

