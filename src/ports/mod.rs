pub mod changelog;
pub mod storage;

// Re-export all port types for convenience
pub use changelog::{ChangeSink, SinkError};
pub use storage::{CopySource, VersionedObjectStore};
