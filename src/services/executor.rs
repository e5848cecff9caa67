use std::sync::Arc;

use tracing::debug;

use crate::domain::{
    errors::ReplayError,
    models::{ChangeType, ObjectChange},
};
use crate::ports::storage::{CopySource, VersionedObjectStore};

/// Maps a change onto the concrete mutation it implies on the destination
/// bucket. Content is always sourced from the *source* bucket's version
/// history, so a destination can be rebuilt from scratch.
pub struct ReplayExecutor {
    store: Arc<dyn VersionedObjectStore>,
    source_bucket: String,
    dest_bucket: String,
}

impl ReplayExecutor {
    pub fn new(
        store: Arc<dyn VersionedObjectStore>,
        source_bucket: impl Into<String>,
        dest_bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            source_bucket: source_bucket.into(),
            dest_bucket: dest_bucket.into(),
        }
    }

    pub async fn execute(&self, change: &ObjectChange) -> Result<(), ReplayError> {
        match change.change_type {
            ChangeType::Create | ChangeType::Update => self.copy_version(change).await,
            ChangeType::Delete => {
                debug!(key = %change.key, "replaying tombstone");
                self.store
                    .delete_object(&self.dest_bucket, &change.key)
                    .await?;
                Ok(())
            }
            ChangeType::Undelete => self.restore_predecessor(change).await,
            ChangeType::Unknown => Err(ReplayError::BadChangeType {
                key: change.key.clone(),
            }),
        }
    }

    async fn copy_version(&self, change: &ObjectChange) -> Result<(), ReplayError> {
        // Older logs may omit the version id; fall back to the current one
        let source = if change.version_id.is_empty() {
            CopySource::latest(&self.source_bucket, &change.key)
        } else {
            CopySource::version(&self.source_bucket, &change.key, &change.version_id)
        };
        debug!(key = %change.key, source = %source, "replaying copy");
        self.store
            .copy_object(&self.dest_bucket, &change.key, &source)
            .await?;
        Ok(())
    }

    async fn restore_predecessor(&self, change: &ObjectChange) -> Result<(), ReplayError> {
        let previous = change
            .previous_version_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ReplayError::MissingPredecessor {
                key: change.key.clone(),
            })?;
        let source = CopySource::version(&self.source_bucket, &change.key, previous);
        debug!(key = %change.key, source = %source, "replaying undelete");
        self.store
            .copy_object(&self.dest_bucket, &change.key, &source)
            .await?;
        Ok(())
    }
}
