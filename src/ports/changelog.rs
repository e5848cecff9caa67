use thiserror::Error;

use crate::domain::models::ObjectChange;

/// Errors from a change sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize change: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sink already closed")]
    Closed,
}

/// Capability for writing batches of changes to some destination.
///
/// Implementations must be safe under concurrent `append_batch` calls and
/// must not reorder within a batch; global ordering is the caller's job.
pub trait ChangeSink: Send + Sync {
    fn append_batch(&self, changes: &[ObjectChange]) -> Result<(), SinkError>;

    /// Finalize the sink. Further appends fail with [`SinkError::Closed`].
    fn close(&self) -> Result<(), SinkError>;
}
