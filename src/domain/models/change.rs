use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four classes of events a key's history decomposes into, plus a
/// tolerance bucket for change types written by a newer tool version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    #[serde(rename = "CREATE")]
    Create,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "UNDELETE")]
    Undelete,
    #[serde(other, rename = "UNKNOWN")]
    Unknown,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "CREATE",
            ChangeType::Update => "UPDATE",
            ChangeType::Delete => "DELETE",
            ChangeType::Undelete => "UNDELETE",
            ChangeType::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed modification of an object, as serialized into the
/// portable change log. Field names match the legacy log format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectChange {
    pub key: String,
    pub version_id: String,
    pub change_type: ChangeType,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub is_delete_marker: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version_id: Option<String>,
}

/// Outcome of dispatching one change during replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStatus {
    Success,
    Failed,
    DryRun,
}

impl ReplayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayStatus::Success => "SUCCESS",
            ReplayStatus::Failed => "FAILED",
            ReplayStatus::DryRun => "DRYRUN",
        }
    }
}

impl std::fmt::Display for ReplayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed (or skipped) change, with its intended and actual instants.
/// `executed_at` reflects when the worker actually began the mutation,
/// which may trail `scheduled_at` under per-key contention.
#[derive(Debug, Clone)]
pub struct ReplayEvent {
    pub change: ObjectChange,
    pub scheduled_at: DateTime<Utc>,
    pub executed_at: DateTime<Utc>,
    pub status: ReplayStatus,
    pub error_message: Option<String>,
}

/// Totals and per-event detail for one replay run
#[derive(Debug, Clone)]
pub struct ReplayResult {
    pub total_events: usize,
    pub success_events: usize,
    pub failed_events: usize,
    pub skipped_events: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub events: Vec<ReplayEvent>,
}

impl ReplayResult {
    pub fn new(total_events: usize, start_time: DateTime<Utc>) -> Self {
        Self {
            total_events,
            success_events: 0,
            failed_events: 0,
            skipped_events: 0,
            start_time,
            end_time: start_time,
            events: Vec::with_capacity(total_events),
        }
    }

    pub fn record(&mut self, event: ReplayEvent) {
        match event.status {
            ReplayStatus::Success => self.success_events += 1,
            ReplayStatus::Failed => self.failed_events += 1,
            ReplayStatus::DryRun => self.skipped_events += 1,
        }
        self.events.push(event);
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }
}
