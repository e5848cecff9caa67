pub mod adapters;
pub mod app;
pub mod domain;
pub mod ports;
pub mod services;

// Re-export key types for convenience

// Domain types - core entities and value objects
pub use domain::{
    BucketName,
    ChangeType,
    DomainValidationError,
    KeyHistory,
    ObjectChange,
    ObjectKey,
    ReplayError,
    ReplayEvent,
    ReplayResult,
    ReplayStatus,
    StorageError,
    VersionId,
    VersionRecord,
};

// Port types - capabilities the host wires in
pub use ports::{ChangeSink, CopySource, SinkError, VersionedObjectStore};

// Services - the three operations and their building blocks
pub use services::{
    changes_for_key, plan, ReplayListOptions, ReplayListService, ReplayOptions, ReplaySchedule,
    ReplayService, RollbackAction, RollbackRequest, RollbackService, RollbackSummary,
    RollbackTarget, WorkerPool,
};

// Application factory and configuration
pub use app::{
    create_in_memory_app, create_s3_app, AppBuilder, AppConfig, AppError, AppServices,
    StorageBackend,
};

// Adapter types - infrastructure implementations
pub use adapters::outbound::changelog::{read_change_log, FileChangeLog, MemoryChangeLog};
pub use adapters::outbound::storage::{InMemoryVersionedStore, S3Config, S3VersionedStore};

// Public facade for easy construction
pub mod prelude {
    pub use crate::{
        changes_for_key, create_in_memory_app, create_s3_app, AppBuilder, AppServices, BucketName,
        ChangeSink, ChangeType, FileChangeLog, InMemoryVersionedStore, ObjectChange, ObjectKey,
        ReplayListOptions, ReplayListService, ReplayOptions, ReplayService, RollbackRequest,
        RollbackService, RollbackTarget, VersionedObjectStore, VersionId,
    };
}
