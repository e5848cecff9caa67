use std::sync::Arc;

use tracing::debug;

use crate::domain::{
    errors::StorageResult,
    models::{KeyHistory, VersionRecord},
};
use crate::ports::storage::VersionedObjectStore;

/// Paginated enumeration of bucket histories.
///
/// The scoped form (`key_history`) is a single paginated read per key that
/// serves both change interpretation and the rollback planner's pre-T
/// version lookup.
pub struct HistoryReader {
    store: Arc<dyn VersionedObjectStore>,
}

impl HistoryReader {
    pub fn new(store: Arc<dyn VersionedObjectStore>) -> Self {
        Self { store }
    }

    /// All currently visible keys under `prefix`
    pub async fn list_keys(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self
                .store
                .list_keys(bucket, prefix, token.as_deref())
                .await?;
            keys.extend(page.keys);
            if !page.truncated {
                break;
            }
            token = page.next_token;
            if token.is_none() {
                break;
            }
        }

        debug!(bucket, prefix, count = keys.len(), "listed keys");
        Ok(keys)
    }

    /// Full history of exactly `key`: every version and delete marker,
    /// aggregated across pages and sorted oldest-first.
    ///
    /// The store's prefix filter is an over-approximation; records of other
    /// keys sharing the prefix are discarded here.
    pub async fn key_history(&self, bucket: &str, key: &str) -> StorageResult<KeyHistory> {
        let mut versions: Vec<VersionRecord> = Vec::new();
        let mut markers: Vec<VersionRecord> = Vec::new();
        let mut key_marker: Option<String> = None;

        loop {
            let page = self
                .store
                .list_versions(bucket, key, key_marker.as_deref())
                .await?;

            versions.extend(page.versions.into_iter().filter(|v| v.key == key));
            markers.extend(page.delete_markers.into_iter().filter(|m| m.key == key));

            if !page.truncated {
                break;
            }
            key_marker = page.next_key_marker;
            if key_marker.is_none() {
                break;
            }
        }

        debug!(
            bucket,
            key,
            versions = versions.len(),
            markers = markers.len(),
            "aggregated key history"
        );

        // Versions ahead of markers so that store tie order survives the
        // stable sort, matching how listings interleave the two groups.
        versions.append(&mut markers);
        Ok(KeyHistory::new(key, versions))
    }
}
