use async_trait::async_trait;

use crate::domain::{
    errors::StorageResult,
    models::{KeyListPage, VersionListPage},
};

/// Reference to the source of a server-side copy.
///
/// Rendered as `{bucket}/{key}` or `{bucket}/{key}?versionId={id}` when a
/// specific version is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
}

impl CopySource {
    pub fn latest(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: None,
        }
    }

    pub fn version(
        bucket: impl Into<String>,
        key: impl Into<String>,
        version_id: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: Some(version_id.into()),
        }
    }
}

impl std::fmt::Display for CopySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version_id {
            Some(id) => write!(f, "{}/{}?versionId={}", self.bucket, self.key, id),
            None => write!(f, "{}/{}", self.bucket, self.key),
        }
    }
}

/// Port for a versioned object store.
///
/// This abstracts the actual storage backend; the host supplies an
/// implementation that is safe for concurrent use by all workers.
#[async_trait]
pub trait VersionedObjectStore: Send + Sync + 'static {
    /// One page of versions and delete markers under `prefix`. Pages are
    /// keyed by an opaque `key_marker`; callers read until `truncated` is
    /// false. The prefix is an over-approximation: callers needing an exact
    /// key must filter the returned records themselves.
    async fn list_versions(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: Option<&str>,
    ) -> StorageResult<VersionListPage>;

    /// One page of currently visible keys under `prefix`
    async fn list_keys(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> StorageResult<KeyListPage>;

    /// Server-side copy of `source` onto `(dst_bucket, dst_key)`, creating
    /// a new current version whose content equals the source's
    async fn copy_object(
        &self,
        dst_bucket: &str,
        dst_key: &str,
        source: &CopySource,
    ) -> StorageResult<()>;

    /// Tombstone write: produces a delete marker in a versioned bucket
    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Whether the bucket has versioning enabled
    async fn bucket_versioning_enabled(&self, bucket: &str) -> StorageResult<bool>;
}
