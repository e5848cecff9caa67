use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::outbound::changelog::read_change_log;
use crate::domain::{
    errors::ReplayError,
    models::{ObjectChange, ReplayEvent, ReplayResult, ReplayStatus},
};
use crate::ports::storage::VersionedObjectStore;
use crate::services::{executor::ReplayExecutor, worker_pool::WorkerPool};

/// How a replay run should behave
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub source_bucket: String,
    pub dest_bucket: String,
    pub concurrency: usize,
    /// Multiplier on original inter-event spacing; 2.0 replays twice as fast
    pub speed_factor: f64,
    pub dry_run: bool,
    /// Dispatch every change as soon as a worker is free
    pub ignore_timing: bool,
}

/// Translates original event instants into wall-clock dispatch instants.
///
/// The i-th change is due at `start + (ts_i - ts_0) / speed`. A change
/// whose instant has already passed runs immediately; the schedule never
/// rewinds.
#[derive(Debug, Clone)]
pub struct ReplaySchedule {
    start: DateTime<Utc>,
    first_event: Option<DateTime<Utc>>,
    speed_factor: f64,
    ignore_timing: bool,
}

impl ReplaySchedule {
    pub fn new(
        start: DateTime<Utc>,
        first_event: Option<DateTime<Utc>>,
        speed_factor: f64,
        ignore_timing: bool,
    ) -> Self {
        Self {
            start,
            first_event,
            speed_factor: if speed_factor > 0.0 { speed_factor } else { 1.0 },
            ignore_timing,
        }
    }

    pub fn scheduled_at(&self, event_time: DateTime<Utc>) -> DateTime<Utc> {
        if self.ignore_timing {
            return Utc::now();
        }
        let Some(first) = self.first_event else {
            return self.start;
        };
        let elapsed = event_time - first;
        let micros = elapsed.num_microseconds().unwrap_or(i64::MAX) as f64;
        let adjusted = Duration::microseconds((micros / self.speed_factor) as i64);
        self.start + adjusted
    }

    /// Sleep until the instant arrives; instants in the past return at once
    pub async fn wait_until(at: DateTime<Utc>) {
        let now = Utc::now();
        if at > now {
            let sleep_for = (at - now).to_std().unwrap_or_default();
            debug!(?sleep_for, "waiting for scheduled instant");
            tokio::time::sleep(sleep_for).await;
        }
    }
}

/// Re-applies a recorded change log against a destination bucket
pub struct ReplayService {
    store: Arc<dyn VersionedObjectStore>,
}

impl ReplayService {
    pub fn new(store: Arc<dyn VersionedObjectStore>) -> Self {
        Self { store }
    }

    /// Load a change log from disk and replay it
    pub async fn replay_file(
        &self,
        path: &Path,
        options: ReplayOptions,
        cancel: &CancellationToken,
    ) -> Result<ReplayResult, ReplayError> {
        let changes = read_change_log(path)?;
        info!(count = changes.len(), path = %path.display(), "loaded change log");
        Ok(self.run(changes, options, cancel).await)
    }

    /// Replay an already-loaded change list. The list is re-sorted by
    /// timestamp; per-key execution order follows that sort.
    pub async fn run(
        &self,
        mut changes: Vec<ObjectChange>,
        options: ReplayOptions,
        cancel: &CancellationToken,
    ) -> ReplayResult {
        changes.sort_by_key(|c| c.timestamp);

        let start_time = Utc::now();
        let schedule = ReplaySchedule::new(
            start_time,
            changes.first().map(|c| c.timestamp),
            options.speed_factor,
            options.ignore_timing,
        );
        let executor = Arc::new(ReplayExecutor::new(
            Arc::clone(&self.store),
            &options.source_bucket,
            &options.dest_bucket,
        ));

        info!(
            total = changes.len(),
            source_bucket = %options.source_bucket,
            dest_bucket = %options.dest_bucket,
            concurrency = options.concurrency,
            speed_factor = options.speed_factor,
            dry_run = options.dry_run,
            ignore_timing = options.ignore_timing,
            "starting replay"
        );

        let total = changes.len();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ReplayEvent>();
        let collector = tokio::spawn(async move {
            let mut result = ReplayResult::new(total, start_time);
            while let Some(event) = event_rx.recv().await {
                result.record(event);
            }
            result
        });

        let pool = WorkerPool::new(options.concurrency);
        let dry_run = options.dry_run;

        pool.run(
            changes,
            |change: &ObjectChange| change.key.clone(),
            move |change: ObjectChange| {
                let executor = Arc::clone(&executor);
                let schedule = schedule.clone();
                let event_tx = event_tx.clone();
                async move {
                    let scheduled_at = schedule.scheduled_at(change.timestamp);
                    ReplaySchedule::wait_until(scheduled_at).await;
                    let executed_at = Utc::now();

                    let (status, error_message) = if dry_run {
                        debug!(key = %change.key, change_type = %change.change_type, "dry-run, skipping");
                        (ReplayStatus::DryRun, None)
                    } else {
                        match executor.execute(&change).await {
                            Ok(()) => (ReplayStatus::Success, None),
                            Err(err) => {
                                warn!(key = %change.key, error = %err, "change failed");
                                (ReplayStatus::Failed, Some(err.to_string()))
                            }
                        }
                    };

                    let _ = event_tx.send(ReplayEvent {
                        change,
                        scheduled_at,
                        executed_at,
                        status,
                        error_message,
                    });
                    Ok::<(), ReplayError>(())
                }
            },
            cancel,
        )
        .await;

        let mut result = match collector.await {
            Ok(result) => result,
            Err(_) => {
                warn!("replay collector task panicked");
                ReplayResult::new(total, start_time)
            }
        };
        result.end_time = Utc::now();

        info!(
            total = result.total_events,
            success = result.success_events,
            failed = result.failed_events,
            skipped = result.skipped_events,
            "replay finished"
        );
        result
    }
}
