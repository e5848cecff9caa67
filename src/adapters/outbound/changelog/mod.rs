mod reader;
mod writer;

pub use reader::read_change_log;
pub use writer::{FileChangeLog, MemoryChangeLog};
