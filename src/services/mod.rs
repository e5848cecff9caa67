pub mod change_interpreter;
pub mod executor;
pub mod history_reader;
pub mod replay;
pub mod replay_list;
pub mod rollback;
pub mod worker_pool;

pub use change_interpreter::changes_for_key;
pub use executor::ReplayExecutor;
pub use history_reader::HistoryReader;
pub use replay::{ReplayOptions, ReplaySchedule, ReplayService};
pub use replay_list::{ReplayListOptions, ReplayListService};
pub use rollback::{plan, RollbackAction, RollbackRequest, RollbackService, RollbackSummary, RollbackTarget};
pub use worker_pool::{PoolOutcome, WorkerPool};
