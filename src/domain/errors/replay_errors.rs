use thiserror::Error;

use crate::domain::errors::StorageError;
use crate::ports::changelog::SinkError;

/// Errors raised while enumerating or replaying a change log
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The change log file could not be opened or read
    #[error("failed to read change log: {0}")]
    Io(#[from] std::io::Error),

    /// The change log did not parse as a JSON array of changes
    #[error("change log is malformed: {0}")]
    LogMalformed(String),

    /// A log entry carries a change type this version does not understand
    #[error("unsupported change type for '{key}'")]
    BadChangeType { key: String },

    /// An UNDELETE entry has no previous version to restore from
    #[error("undelete for '{key}' has no predecessor version")]
    MissingPredecessor { key: String },

    /// Writing to the change sink failed
    #[error("change sink error: {0}")]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
