use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::outbound::changelog::MemoryChangeLog;
use crate::domain::{
    errors::{ReplayError, StorageError},
    models::ObjectChange,
    value_objects::BucketName,
};
use crate::ports::changelog::ChangeSink;
use crate::ports::storage::VersionedObjectStore;
use crate::services::{
    change_interpreter::changes_for_key, history_reader::HistoryReader, worker_pool::WorkerPool,
};

#[derive(Debug, Clone)]
pub struct ReplayListOptions {
    pub bucket: BucketName,
    pub prefix: String,
    /// Changes at or after this instant are enumerated
    pub since: DateTime<Utc>,
    pub concurrency: usize,
    /// Changes are handed to the sink in chunks of this size
    pub batch_size: usize,
}

/// Enumerates a bucket's changes since an instant into a change sink.
///
/// Keys are interpreted in parallel; the assembled change set is sorted
/// globally by timestamp before anything reaches the sink, so the written
/// log satisfies the non-decreasing ordering the replay side relies on.
pub struct ReplayListService {
    store: Arc<dyn VersionedObjectStore>,
    reader: Arc<HistoryReader>,
}

impl ReplayListService {
    pub fn new(store: Arc<dyn VersionedObjectStore>) -> Self {
        let reader = Arc::new(HistoryReader::new(Arc::clone(&store)));
        Self { store, reader }
    }

    /// Enumerate changes and append them to `sink`. Returns the number of
    /// changes written. The sink is left open; callers close it.
    pub async fn run(
        &self,
        options: &ReplayListOptions,
        sink: &dyn ChangeSink,
        cancel: &CancellationToken,
    ) -> Result<usize, ReplayError> {
        let bucket = options.bucket.as_str().to_string();

        match self.store.bucket_versioning_enabled(&bucket).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    bucket = %bucket,
                    "bucket versioning is not enabled; the change history may be incomplete"
                );
            }
            Err(err) => return Err(err.into()),
        }

        info!(bucket = %bucket, prefix = %options.prefix, since = %options.since, "listing keys");
        let keys = self.reader.list_keys(&bucket, &options.prefix).await?;
        info!(keys = keys.len(), "enumerating changes");

        let (batch_tx, mut batch_rx) = mpsc::unbounded_channel::<Vec<ObjectChange>>();
        let collector = tokio::spawn(async move {
            let mut all = Vec::new();
            while let Some(mut batch) = batch_rx.recv().await {
                all.append(&mut batch);
            }
            all
        });

        let pool = WorkerPool::new(options.concurrency);
        let reader = Arc::clone(&self.reader);
        let since = options.since;

        let outcome = pool
            .run(
                keys,
                |key: &String| key.clone(),
                move |key: String| {
                    let reader = Arc::clone(&reader);
                    let bucket = bucket.clone();
                    let batch_tx = batch_tx.clone();
                    async move {
                        let history = reader.key_history(&bucket, &key).await?;
                        let changes = changes_for_key(&history, since);
                        if !changes.is_empty() {
                            let _ = batch_tx.send(changes);
                        }
                        Ok::<(), StorageError>(())
                    }
                },
                cancel,
            )
            .await;

        let mut changes = match collector.await {
            Ok(changes) => changes,
            Err(_) => {
                warn!("change collector task panicked");
                Vec::new()
            }
        };

        // Transport errors abort the enumeration; a partial log would
        // silently drop history.
        if let Some(err) = outcome.first_error {
            return Err(err.into());
        }

        changes.sort_by_key(|c| c.timestamp);

        let total = changes.len();
        let batch_size = options.batch_size.max(1);
        for chunk in changes.chunks(batch_size) {
            sink.append_batch(chunk)?;
        }

        info!(changes = total, "change enumeration finished");
        Ok(total)
    }

    /// Convenience form that materializes the change list in memory
    pub async fn collect(
        &self,
        options: &ReplayListOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<ObjectChange>, ReplayError> {
        let sink = MemoryChangeLog::new();
        self.run(options, &sink, cancel).await?;
        Ok(sink.into_changes())
    }
}
