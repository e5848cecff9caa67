use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::{
    errors::{StorageError, StorageResult},
    models::KeyHistory,
    value_objects::{BucketName, ObjectKey, VersionId},
};
use crate::ports::storage::{CopySource, VersionedObjectStore};
use crate::services::{history_reader::HistoryReader, worker_pool::WorkerPool};

/// What the planner decided for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackAction {
    /// No drift since the target instant
    Noop,
    /// The object did not exist at the target instant
    DeleteCurrent,
    /// Re-surface this version as the current one
    Restore(VersionId),
}

/// Decide how to bring one key back to its state at `target`.
///
/// Markers count as drift: a tombstone written after `target` is a change
/// to undo like any other. When the key existed before `target` only as
/// tombstones, its visible state then was "absent", so the current version
/// is deleted rather than restored.
pub fn plan(history: &KeyHistory, target: DateTime<Utc>) -> RollbackAction {
    if !history.modified_since(target) {
        return RollbackAction::Noop;
    }

    match history.oldest() {
        Some(oldest) if oldest.last_modified >= target => RollbackAction::DeleteCurrent,
        _ => match history.latest_content_before(target) {
            Some(version) => RollbackAction::Restore(version.version_id.clone()),
            None => RollbackAction::DeleteCurrent,
        },
    }
}

/// What to roll back: one key, or every key under a prefix
#[derive(Debug, Clone)]
pub enum RollbackTarget {
    Key(ObjectKey),
    Prefix(String),
}

#[derive(Debug, Clone)]
pub struct RollbackRequest {
    pub bucket: BucketName,
    pub target: RollbackTarget,
    pub timestamp: DateTime<Utc>,
    pub concurrency: usize,
}

/// Per-run totals. Failed keys are carried with their error text so the
/// caller can render them and decide the exit status.
#[derive(Debug, Default, Clone)]
pub struct RollbackSummary {
    pub examined: usize,
    pub restored: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub failures: Vec<(String, String)>,
}

enum KeyOutcome {
    Restored,
    Deleted,
    Unchanged,
    Failed(String, String),
}

/// Rolls keys back in parallel, one history read per key
pub struct RollbackService {
    store: Arc<dyn VersionedObjectStore>,
    reader: Arc<HistoryReader>,
}

impl RollbackService {
    pub fn new(store: Arc<dyn VersionedObjectStore>) -> Self {
        let reader = Arc::new(HistoryReader::new(Arc::clone(&store)));
        Self { store, reader }
    }

    pub async fn run(
        &self,
        request: RollbackRequest,
        cancel: &CancellationToken,
    ) -> StorageResult<RollbackSummary> {
        let bucket = request.bucket.as_str().to_string();

        let keys = match &request.target {
            RollbackTarget::Key(key) => vec![key.as_str().to_string()],
            RollbackTarget::Prefix(prefix) => {
                if prefix.is_empty() {
                    info!(bucket = %bucket, "rolling back the whole bucket");
                } else {
                    info!(bucket = %bucket, prefix = %prefix, "rolling back by prefix");
                }
                self.reader.list_keys(&bucket, prefix).await?
            }
        };

        if keys.is_empty() {
            info!(bucket = %bucket, "no matching objects found");
            return Ok(RollbackSummary::default());
        }

        info!(
            keys = keys.len(),
            concurrency = request.concurrency,
            target = %request.timestamp,
            "starting rollback"
        );

        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<KeyOutcome>();
        let collector = tokio::spawn(async move {
            let mut summary = RollbackSummary::default();
            while let Some(outcome) = outcome_rx.recv().await {
                summary.examined += 1;
                match outcome {
                    KeyOutcome::Restored => summary.restored += 1,
                    KeyOutcome::Deleted => summary.deleted += 1,
                    KeyOutcome::Unchanged => summary.unchanged += 1,
                    KeyOutcome::Failed(key, message) => {
                        summary.failed += 1;
                        summary.failures.push((key, message));
                    }
                }
            }
            summary
        });

        let pool = WorkerPool::new(request.concurrency);
        let store = Arc::clone(&self.store);
        let reader = Arc::clone(&self.reader);
        let timestamp = request.timestamp;

        let outcome = pool
            .run(
                keys,
                |key: &String| key.clone(),
                move |key: String| {
                    let store = Arc::clone(&store);
                    let reader = Arc::clone(&reader);
                    let bucket = bucket.clone();
                    let outcome_tx = outcome_tx.clone();
                    async move {
                        let result =
                            rollback_key(&*store, &reader, &bucket, &key, timestamp).await;
                        match result {
                            Ok(outcome) => {
                                let _ = outcome_tx.send(outcome);
                                Ok(())
                            }
                            Err(err) => {
                                error!(key = %key, error = %err, "rollback failed for key");
                                let _ = outcome_tx
                                    .send(KeyOutcome::Failed(key, err.to_string()));
                                Err(err)
                            }
                        }
                    }
                },
                cancel,
            )
            .await;

        let summary = match collector.await {
            Ok(summary) => summary,
            Err(_) => {
                warn!("rollback collector task panicked");
                RollbackSummary::default()
            }
        };

        // Listing-level failures abort the run; per-key failures only
        // count toward the summary.
        if let Some(err) = outcome.first_error {
            if err.is_fatal() {
                return Err(err);
            }
        }

        info!(
            examined = summary.examined,
            restored = summary.restored,
            deleted = summary.deleted,
            unchanged = summary.unchanged,
            failed = summary.failed,
            "rollback finished"
        );
        Ok(summary)
    }
}

async fn rollback_key(
    store: &dyn VersionedObjectStore,
    reader: &HistoryReader,
    bucket: &str,
    key: &str,
    target: DateTime<Utc>,
) -> StorageResult<KeyOutcome> {
    let history = reader.key_history(bucket, key).await?;

    if history.is_empty() {
        return Err(StorageError::ObjectNotFound {
            key: key.to_string(),
        });
    }

    match plan(&history, target) {
        RollbackAction::Noop => {
            debug!(key, "unchanged since target, skipping");
            Ok(KeyOutcome::Unchanged)
        }
        RollbackAction::DeleteCurrent => {
            debug!(key, "created after target, deleting");
            store.delete_object(bucket, key).await?;
            Ok(KeyOutcome::Deleted)
        }
        RollbackAction::Restore(version_id) => {
            debug!(key, version_id = %version_id, "restoring version");
            let source = CopySource::version(bucket, key, version_id.as_str());
            store.copy_object(bucket, key, &source).await?;
            Ok(KeyOutcome::Restored)
        }
    }
}
