use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{
    errors::{StorageError, StorageResult},
    models::{KeyListPage, VersionListPage, VersionRecord},
    value_objects::VersionId,
};
use crate::ports::storage::{CopySource, VersionedObjectStore};

/// Separates key from record offset in pagination markers; object keys
/// never contain NUL.
const MARKER_SEP: char = '\0';

#[derive(Clone)]
struct StoredRecord {
    version_id: VersionId,
    last_modified: DateTime<Utc>,
    data: Option<Bytes>,
    etag: Option<String>,
    is_delete_marker: bool,
}

#[derive(Default)]
struct BucketState {
    versioning_enabled: bool,
    // key -> records in insertion order
    objects: BTreeMap<String, Vec<StoredRecord>>,
}

impl BucketState {
    /// Records of one key in history order: last_modified ascending,
    /// insertion order breaking ties
    fn chronological(&self, key: &str) -> Vec<StoredRecord> {
        let mut records = self.objects.get(key).cloned().unwrap_or_default();
        records.sort_by_key(|r| r.last_modified);
        records
    }

    fn latest(&self, key: &str) -> Option<StoredRecord> {
        self.chronological(key).pop()
    }
}

#[derive(Default)]
struct StoreState {
    buckets: HashMap<String, BucketState>,
}

/// In-memory implementation of the versioned store for tests and
/// development. Histories can be seeded at arbitrary instants, and the
/// page size is adjustable so pagination paths get exercised.
#[derive(Clone)]
pub struct InMemoryVersionedStore {
    state: Arc<RwLock<StoreState>>,
    page_size: usize,
    copies: Arc<AtomicUsize>,
    deletes: Arc<AtomicUsize>,
}

impl Default for InMemoryVersionedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryVersionedStore {
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            page_size: page_size.max(1),
            copies: Arc::new(AtomicUsize::new(0)),
            deletes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn create_bucket(&self, name: &str) {
        let mut state = self.state.write().await;
        state.buckets.entry(name.to_string()).or_insert(BucketState {
            versioning_enabled: true,
            objects: BTreeMap::new(),
        });
    }

    pub async fn create_unversioned_bucket(&self, name: &str) {
        let mut state = self.state.write().await;
        state.buckets.insert(
            name.to_string(),
            BucketState {
                versioning_enabled: false,
                objects: BTreeMap::new(),
            },
        );
    }

    /// Seed a content version at a specific instant
    pub async fn put_version_at(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        at: DateTime<Utc>,
    ) -> StorageResult<VersionId> {
        let data = data.into();
        let etag = format!("{:x}", md5::compute(&data));
        let version_id = VersionId::generate();
        let record = StoredRecord {
            version_id: version_id.clone(),
            last_modified: at,
            data: Some(data),
            etag: Some(etag),
            is_delete_marker: false,
        };
        self.append(bucket, key, record).await?;
        Ok(version_id)
    }

    /// Seed a delete marker at a specific instant
    pub async fn put_delete_marker_at(
        &self,
        bucket: &str,
        key: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<VersionId> {
        let version_id = VersionId::generate();
        let record = StoredRecord {
            version_id: version_id.clone(),
            last_modified: at,
            data: None,
            etag: None,
            is_delete_marker: true,
        };
        self.append(bucket, key, record).await?;
        Ok(version_id)
    }

    async fn append(&self, bucket: &str, key: &str, record: StoredRecord) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let bucket_state =
            state
                .buckets
                .get_mut(bucket)
                .ok_or_else(|| StorageError::BucketNotFound {
                    bucket: bucket.to_string(),
                })?;
        bucket_state
            .objects
            .entry(key.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    /// The current version id of a key and whether it is a tombstone
    pub async fn current_version(&self, bucket: &str, key: &str) -> Option<(VersionId, bool)> {
        let state = self.state.read().await;
        let bucket_state = state.buckets.get(bucket)?;
        bucket_state
            .latest(key)
            .map(|r| (r.version_id, r.is_delete_marker))
    }

    /// Content of a specific version, if it exists and is not a marker
    pub async fn version_data(&self, bucket: &str, key: &str, version_id: &str) -> Option<Bytes> {
        let state = self.state.read().await;
        let records = state.buckets.get(bucket)?.objects.get(key)?;
        records
            .iter()
            .find(|r| r.version_id.as_str() == version_id)
            .and_then(|r| r.data.clone())
    }

    /// Content served for a bare read of `key`, absent when tombstoned
    pub async fn current_data(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let state = self.state.read().await;
        let latest = state.buckets.get(bucket)?.latest(key)?;
        latest.data
    }

    pub async fn record_count(&self, bucket: &str, key: &str) -> usize {
        let state = self.state.read().await;
        state
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .map_or(0, |records| records.len())
    }

    pub fn copy_count(&self) -> usize {
        self.copies.load(Ordering::Relaxed)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::Relaxed)
    }

    fn to_record(key: &str, stored: &StoredRecord, is_latest: bool) -> VersionRecord {
        VersionRecord {
            key: key.to_string(),
            version_id: stored.version_id.clone(),
            last_modified: stored.last_modified,
            size: stored.data.as_ref().map(|d| d.len() as u64),
            etag: stored.etag.clone(),
            is_latest,
            is_delete_marker: stored.is_delete_marker,
        }
    }
}

fn parse_marker(marker: Option<&str>) -> Option<(String, usize)> {
    let marker = marker?;
    let (key, offset) = marker.rsplit_once(MARKER_SEP)?;
    Some((key.to_string(), offset.parse().ok()?))
}

#[async_trait]
impl VersionedObjectStore for InMemoryVersionedStore {
    async fn list_versions(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: Option<&str>,
    ) -> StorageResult<VersionListPage> {
        let state = self.state.read().await;
        let bucket_state =
            state
                .buckets
                .get(bucket)
                .ok_or_else(|| StorageError::BucketNotFound {
                    bucket: bucket.to_string(),
                })?;

        let resume = parse_marker(key_marker);
        let mut page = VersionListPage::default();
        let mut emitted = 0usize;

        'keys: for (key, _) in bucket_state
            .objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
        {
            let skip = match &resume {
                Some((marker_key, _)) if key < marker_key => continue,
                Some((marker_key, offset)) if key == marker_key => *offset,
                _ => 0,
            };

            let records = bucket_state.chronological(key);
            let last_idx = records.len().saturating_sub(1);
            for (idx, stored) in records.iter().enumerate().skip(skip) {
                if emitted == self.page_size {
                    page.truncated = true;
                    page.next_key_marker = Some(format!("{key}{MARKER_SEP}{idx}"));
                    break 'keys;
                }
                let record = Self::to_record(key, stored, idx == last_idx);
                if record.is_delete_marker {
                    page.delete_markers.push(record);
                } else {
                    page.versions.push(record);
                }
                emitted += 1;
            }
        }

        Ok(page)
    }

    async fn list_keys(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> StorageResult<KeyListPage> {
        let state = self.state.read().await;
        let bucket_state =
            state
                .buckets
                .get(bucket)
                .ok_or_else(|| StorageError::BucketNotFound {
                    bucket: bucket.to_string(),
                })?;

        let mut page = KeyListPage::default();
        for (key, _) in bucket_state
            .objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .filter(|(k, _)| {
                // Tombstoned keys are invisible to a current listing
                bucket_state
                    .latest(k)
                    .map_or(false, |latest| !latest.is_delete_marker)
            })
            .skip_while(|(k, _)| token.is_some_and(|t| k.as_str() <= t))
        {
            if page.keys.len() == self.page_size {
                page.truncated = true;
                page.next_token = page.keys.last().cloned();
                break;
            }
            page.keys.push(key.clone());
        }

        Ok(page)
    }

    async fn copy_object(
        &self,
        dst_bucket: &str,
        dst_key: &str,
        source: &CopySource,
    ) -> StorageResult<()> {
        let mut state = self.state.write().await;

        let source_bucket =
            state
                .buckets
                .get(&source.bucket)
                .ok_or_else(|| StorageError::BucketNotFound {
                    bucket: source.bucket.clone(),
                })?;

        let stored = match &source.version_id {
            Some(version_id) => source_bucket
                .objects
                .get(&source.key)
                .and_then(|records| {
                    records
                        .iter()
                        .find(|r| r.version_id.as_str() == version_id.as_str())
                        .cloned()
                })
                .ok_or_else(|| StorageError::ObjectNotFound {
                    key: source.key.clone(),
                })?,
            None => source_bucket
                .latest(&source.key)
                .filter(|latest| !latest.is_delete_marker)
                .ok_or_else(|| StorageError::ObjectNotFound {
                    key: source.key.clone(),
                })?,
        };

        if stored.is_delete_marker {
            return Err(StorageError::MutationRejected {
                key: dst_key.to_string(),
                message: "copy source is a delete marker".to_string(),
            });
        }

        let record = StoredRecord {
            version_id: VersionId::generate(),
            last_modified: Utc::now(),
            data: stored.data,
            etag: stored.etag,
            is_delete_marker: false,
        };

        let dst = state
            .buckets
            .get_mut(dst_bucket)
            .ok_or_else(|| StorageError::BucketNotFound {
                bucket: dst_bucket.to_string(),
            })?;
        dst.objects
            .entry(dst_key.to_string())
            .or_default()
            .push(record);

        self.copies.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let bucket_state =
            state
                .buckets
                .get_mut(bucket)
                .ok_or_else(|| StorageError::BucketNotFound {
                    bucket: bucket.to_string(),
                })?;

        bucket_state
            .objects
            .entry(key.to_string())
            .or_default()
            .push(StoredRecord {
                version_id: VersionId::generate(),
                last_modified: Utc::now(),
                data: None,
                etag: None,
                is_delete_marker: true,
            });

        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn bucket_versioning_enabled(&self, bucket: &str) -> StorageResult<bool> {
        let state = self.state.read().await;
        state
            .buckets
            .get(bucket)
            .map(|b| b.versioning_enabled)
            .ok_or_else(|| StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, 1, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn truncated_listing_spans_one_key_across_pages() {
        let store = InMemoryVersionedStore::with_page_size(2);
        store.create_bucket("b").await;
        for hour in 0..5 {
            store.put_version_at("b", "k", "data", at(hour)).await.unwrap();
        }

        let mut seen = 0;
        let mut marker: Option<String> = None;
        let mut pages = 0;
        loop {
            let page = store.list_versions("b", "k", marker.as_deref()).await.unwrap();
            seen += page.versions.len() + page.delete_markers.len();
            pages += 1;
            if !page.truncated {
                break;
            }
            marker = page.next_key_marker;
        }

        assert_eq!(seen, 5);
        assert_eq!(pages, 3);
    }

    #[tokio::test]
    async fn only_the_newest_record_is_latest() {
        let store = InMemoryVersionedStore::new();
        store.create_bucket("b").await;
        store.put_version_at("b", "k", "one", at(1)).await.unwrap();
        store.put_version_at("b", "k", "two", at(2)).await.unwrap();

        let page = store.list_versions("b", "k", None).await.unwrap();
        let latest: Vec<bool> = page.versions.iter().map(|v| v.is_latest).collect();
        assert_eq!(latest.iter().filter(|l| **l).count(), 1);
        assert!(page.versions.last().unwrap().is_latest);
    }

    #[tokio::test]
    async fn tombstoned_keys_are_hidden_from_key_listing() {
        let store = InMemoryVersionedStore::new();
        store.create_bucket("b").await;
        store.put_version_at("b", "alive", "x", at(1)).await.unwrap();
        store.put_version_at("b", "gone", "y", at(1)).await.unwrap();
        store.put_delete_marker_at("b", "gone", at(2)).await.unwrap();

        let page = store.list_keys("b", "", None).await.unwrap();
        assert_eq!(page.keys, vec!["alive".to_string()]);
    }

    #[tokio::test]
    async fn copy_of_specific_version_creates_new_current() {
        let store = InMemoryVersionedStore::new();
        store.create_bucket("b").await;
        let v1 = store.put_version_at("b", "k", "old", at(1)).await.unwrap();
        store.put_version_at("b", "k", "new", at(2)).await.unwrap();

        let source = CopySource::version("b", "k", v1.as_str());
        store.copy_object("b", "k", &source).await.unwrap();

        assert_eq!(store.record_count("b", "k").await, 3);
        assert_eq!(
            store.current_data("b", "k").await,
            Some(Bytes::from("old"))
        );
    }

    #[tokio::test]
    async fn copy_of_missing_version_is_not_found() {
        let store = InMemoryVersionedStore::new();
        store.create_bucket("b").await;
        store.put_version_at("b", "k", "x", at(1)).await.unwrap();

        let source = CopySource::version("b", "k", "no-such-version");
        let err = store.copy_object("b", "k", &source).await.unwrap_err();
        assert!(matches!(err, StorageError::ObjectNotFound { .. }));
    }
}
