pub mod change;
pub mod history;

pub use change::{ChangeType, ObjectChange, ReplayEvent, ReplayResult, ReplayStatus};
pub use history::{KeyHistory, KeyListPage, VersionListPage, VersionRecord};
