use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::Poll;

use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Process-wide map of per-key mutexes, lazily populated on first
/// observation of a key and kept for the run.
#[derive(Default)]
pub(crate) struct KeyLocks {
    inner: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub(crate) fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut map = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// What a pool run observed. Per-item errors do not halt peers; the first
/// one wins for exit-status determination, the rest are logged and counted.
#[derive(Debug)]
pub struct PoolOutcome<E> {
    pub processed: usize,
    pub error_count: usize,
    pub first_error: Option<E>,
}

impl<E> PoolOutcome<E> {
    pub fn is_clean(&self) -> bool {
        self.error_count == 0
    }
}

/// Bounded worker pool with per-key serialization.
///
/// A bounded channel feeds items to `workers` long-lived tasks. The worker
/// takes the item key's mutex around the handler call, so two items with
/// the same key never execute concurrently. Workers join the key's mutex
/// queue while still holding the intake lock, and tokio mutexes hand
/// themselves over in FIFO order, so same-key items execute in the order
/// they were fed.
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Dispatch `handler(item)` across the pool. The feeder stops on
    /// cancellation; in-flight items run to completion.
    pub async fn run<T, E, K, F, Fut>(
        &self,
        items: Vec<T>,
        key_of: K,
        handler: F,
        cancel: &CancellationToken,
    ) -> PoolOutcome<E>
    where
        T: Send + 'static,
        E: std::fmt::Display + Send + 'static,
        K: Fn(&T) -> String + Send + Sync + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        let (work_tx, work_rx) = mpsc::channel::<T>(self.workers);
        let (err_tx, mut err_rx) = mpsc::channel::<E>(1);
        let work_rx = Arc::new(Mutex::new(work_rx));
        let locks = Arc::new(KeyLocks::default());
        let key_of = Arc::new(key_of);
        let handler = Arc::new(handler);
        let processed = Arc::new(AtomicUsize::new(0));
        let error_count = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let work_rx = Arc::clone(&work_rx);
            let locks = Arc::clone(&locks);
            let key_of = Arc::clone(&key_of);
            let handler = Arc::clone(&handler);
            let processed = Arc::clone(&processed);
            let error_count = Arc::clone(&error_count);
            let err_tx = err_tx.clone();
            let cancel = cancel.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        debug!(worker_id, "worker exiting on cancellation");
                        break;
                    }
                    let next = {
                        let mut rx = work_rx.lock().await;
                        match rx.recv().await {
                            Some(item) => {
                                let key = key_of(&item);
                                let lock = locks.lock_for(&key);
                                // Join the key's wait queue before releasing
                                // the intake lock: queue position = feed order.
                                let mut acquire = Box::pin(lock.lock_owned());
                                let early: Option<OwnedMutexGuard<()>> =
                                    match futures::poll!(acquire.as_mut()) {
                                        Poll::Ready(guard) => Some(guard),
                                        Poll::Pending => None,
                                    };
                                Some((item, key, acquire, early))
                            }
                            None => None,
                        }
                    };
                    let Some((item, key, acquire, early)) = next else {
                        break;
                    };
                    let _guard = match early {
                        Some(guard) => guard,
                        None => acquire.await,
                    };

                    if let Err(err) = handler(item).await {
                        error_count.fetch_add(1, Ordering::Relaxed);
                        if err_tx.try_send(err).is_err() {
                            // A first error is already recorded; this one
                            // was logged at its source.
                            debug!(worker_id, key = %key, "additional item error");
                        }
                    }
                    processed.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }
        drop(err_tx);

        // Feeder: blocks on a full channel, bounding outstanding work
        let feeder_cancel = cancel.clone();
        let feeder = tokio::spawn(async move {
            for item in items {
                tokio::select! {
                    _ = feeder_cancel.cancelled() => {
                        debug!("dispatch stopped by cancellation");
                        break;
                    }
                    sent = work_tx.send(item) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        if feeder.await.is_err() {
            warn!("work feeder panicked");
        }
        for worker in workers {
            if worker.await.is_err() {
                warn!("pool worker panicked");
            }
        }

        PoolOutcome {
            processed: processed.load(Ordering::Relaxed),
            error_count: error_count.load(Ordering::Relaxed),
            first_error: err_rx.recv().await,
        }
    }
}
