pub mod polling_runtime;

pub use polling_runtime::PollingRuntime;

use std::time::SystemTime;

use crate::lifecycle::PollOutcome;
use crate::models::{CoreError, QueryExecutionId};

pub type PollingResult<T> = Result<T, CoreError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PollTaskId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PollTaskStatus {
    Queued,
    Running,
    /// The poll loop returned; see the snapshot outcome for the query state.
    Completed,
    /// The poll loop never returned a value.
    Failed,
}

impl PollTaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PollTaskSnapshot {
    pub id: PollTaskId,
    pub execution_id: QueryExecutionId,
    pub max_polling_attempts: Option<u32>,
    pub status: PollTaskStatus,
    pub outcome: Option<PollOutcome>,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
    pub error_message: Option<String>,
}
