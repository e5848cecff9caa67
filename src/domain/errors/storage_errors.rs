use thiserror::Error;

/// Errors surfaced by the versioned object store capability
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Transport-level failure while talking to the store; the current
    /// enumeration or mutation is aborted and partial pages are discarded.
    #[error("object store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// The requested key has no history in the store
    #[error("object not found: {key}")]
    ObjectNotFound { key: String },

    /// The store rejected a copy or delete
    #[error("mutation rejected for '{key}': {message}")]
    MutationRejected { key: String, message: String },

    /// The bucket does not exist
    #[error("bucket not found: {bucket}")]
    BucketNotFound { bucket: String },

    /// The store returned a response the adapter could not interpret
    #[error("invalid store response: {message}")]
    InvalidResponse { message: String },
}

impl StorageError {
    /// Per-item errors leave the rest of a run intact; everything else
    /// aborts the operation that observed it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StorageError::StoreUnavailable { .. }
                | StorageError::BucketNotFound { .. }
                | StorageError::InvalidResponse { .. }
        )
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
