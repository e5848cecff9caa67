use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::{
    errors::{StorageError, StorageResult},
    models::VersionRecord,
    value_objects::VersionId,
};

/// `ListObjectVersions` response body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListVersionsResult {
    pub is_truncated: bool,
    pub next_key_marker: Option<String>,
    #[serde(rename = "Version")]
    pub versions: Vec<VersionEntry>,
    #[serde(rename = "DeleteMarker")]
    pub delete_markers: Vec<DeleteMarkerEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionEntry {
    pub key: String,
    pub version_id: String,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub is_latest: bool,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default, rename = "ETag")]
    pub etag: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteMarkerEntry {
    pub key: String,
    pub version_id: String,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub is_latest: bool,
}

/// `ListObjectsV2` response body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListBucketResult {
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
    #[serde(rename = "Contents")]
    pub contents: Vec<ObjectEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectEntry {
    pub key: String,
}

/// `GetBucketVersioning` response body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VersioningConfiguration {
    pub status: Option<String>,
}

impl VersioningConfiguration {
    pub fn is_enabled(&self) -> bool {
        self.status.as_deref() == Some("Enabled")
    }
}

fn version_id(raw: String) -> StorageResult<VersionId> {
    VersionId::new(raw).map_err(|err| StorageError::InvalidResponse {
        message: format!("bad version id in listing: {err}"),
    })
}

impl VersionEntry {
    pub fn into_record(self) -> StorageResult<VersionRecord> {
        Ok(VersionRecord {
            version_id: version_id(self.version_id)?,
            key: self.key,
            last_modified: self.last_modified,
            size: self.size,
            etag: self.etag,
            is_latest: self.is_latest,
            is_delete_marker: false,
        })
    }
}

impl DeleteMarkerEntry {
    pub fn into_record(self) -> StorageResult<VersionRecord> {
        Ok(VersionRecord {
            version_id: version_id(self.version_id)?,
            key: self.key,
            last_modified: self.last_modified,
            size: None,
            etag: None,
            is_latest: self.is_latest,
            is_delete_marker: true,
        })
    }
}
