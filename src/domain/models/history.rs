use chrono::{DateTime, Utc};

use crate::domain::value_objects::VersionId;

/// One entry in a key's version history: a content version or a delete
/// marker (tombstone). Within a bucket, `(key, version_id)` is unique.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRecord {
    pub key: String,
    pub version_id: VersionId,
    pub last_modified: DateTime<Utc>,
    pub size: Option<u64>,
    pub etag: Option<String>,
    pub is_latest: bool,
    pub is_delete_marker: bool,
}

impl VersionRecord {
    pub fn version(
        key: impl Into<String>,
        version_id: VersionId,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            version_id,
            last_modified,
            size: None,
            etag: None,
            is_latest: false,
            is_delete_marker: false,
        }
    }

    pub fn delete_marker(
        key: impl Into<String>,
        version_id: VersionId,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            version_id,
            last_modified,
            size: None,
            etag: None,
            is_latest: false,
            is_delete_marker: true,
        }
    }
}

/// Everything the store holds for one key, sorted by `last_modified`
/// ascending. Store-supplied order is preserved for equal instants.
/// Owned by the worker processing the key; never shared.
#[derive(Debug, Clone, Default)]
pub struct KeyHistory {
    pub key: String,
    pub records: Vec<VersionRecord>,
}

impl KeyHistory {
    /// Build a history from records in store order. The sort is stable, so
    /// records sharing a `last_modified` keep their relative order.
    pub fn new(key: impl Into<String>, mut records: Vec<VersionRecord>) -> Self {
        records.sort_by_key(|r| r.last_modified);
        Self {
            key: key.into(),
            records,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The oldest event of any kind, markers included
    pub fn oldest(&self) -> Option<&VersionRecord> {
        self.records.first()
    }

    /// The oldest content version (the key's genesis), skipping markers
    pub fn genesis(&self) -> Option<&VersionRecord> {
        self.records.iter().find(|r| !r.is_delete_marker)
    }

    /// The freshest content version strictly before `instant`
    pub fn latest_content_before(&self, instant: DateTime<Utc>) -> Option<&VersionRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| !r.is_delete_marker && r.last_modified < instant)
    }

    /// Whether any event (marker or version) happened at or after `instant`
    pub fn modified_since(&self, instant: DateTime<Utc>) -> bool {
        self.records.iter().any(|r| r.last_modified >= instant)
    }
}

/// One page of a versioned listing. Versions and markers of the same key
/// may span pages; callers aggregate across pages before interpreting.
#[derive(Debug, Clone, Default)]
pub struct VersionListPage {
    pub versions: Vec<VersionRecord>,
    pub delete_markers: Vec<VersionRecord>,
    pub truncated: bool,
    pub next_key_marker: Option<String>,
}

/// One page of a current-key listing
#[derive(Debug, Clone, Default)]
pub struct KeyListPage {
    pub keys: Vec<String>,
    pub truncated: bool,
    pub next_token: Option<String>,
}
