use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::adapters::outbound::storage::{InMemoryVersionedStore, S3Config, S3VersionedStore};
use crate::domain::errors::StorageError;
use crate::ports::storage::VersionedObjectStore;
use crate::services::{ReplayListService, ReplayService, RollbackService};

/// Storage backend configuration
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    S3(S3Config),
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_backend: StorageBackend,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::InMemory,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to initialize storage backend: {0}")]
    Storage(#[from] StorageError),
}

/// Application services container
pub struct AppServices {
    pub store: Arc<dyn VersionedObjectStore>,
    pub rollback: RollbackService,
    pub replay_list: ReplayListService,
    pub replay: ReplayService,
}

/// Application builder for dependency injection
pub struct AppBuilder {
    config: AppConfig,
    cancel: CancellationToken,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_storage_backend(mut self, backend: StorageBackend) -> Self {
        self.config.storage_backend = backend;
        self
    }

    /// Plumb the top-level cancellation signal into the store client
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Result<AppServices, AppError> {
        let store: Arc<dyn VersionedObjectStore> = match self.config.storage_backend {
            StorageBackend::InMemory => Arc::new(InMemoryVersionedStore::new()),
            StorageBackend::S3(config) => {
                Arc::new(S3VersionedStore::new(config)?.with_cancellation(self.cancel))
            }
        };
        Ok(AppServices::from_store(store))
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppServices {
    /// Assemble the services around an already-built store; useful when
    /// tests bring their own seeded backend.
    pub fn from_store(store: Arc<dyn VersionedObjectStore>) -> Self {
        Self {
            rollback: RollbackService::new(Arc::clone(&store)),
            replay_list: ReplayListService::new(Arc::clone(&store)),
            replay: ReplayService::new(Arc::clone(&store)),
            store,
        }
    }
}

/// Create application services backed by in-memory storage
pub fn create_in_memory_app() -> AppServices {
    AppServices::from_store(Arc::new(InMemoryVersionedStore::new()))
}

/// Create application services backed by an S3-compatible endpoint
pub fn create_s3_app(
    config: S3Config,
    cancel: CancellationToken,
) -> Result<AppServices, AppError> {
    AppBuilder::new()
        .with_storage_backend(StorageBackend::S3(config))
        .with_cancellation(cancel)
        .build()
}
