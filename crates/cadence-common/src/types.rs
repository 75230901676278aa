use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State of a recorded run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Waiting for its schedule time
    Scheduled,
    /// Program is executing
    Running,
    /// Program completed successfully
    Success,
    /// Program ran and failed
    Failure,
    /// Program could not be started
    Error,
}

impl RunState {
    /// True for states that end a run's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Success | RunState::Failure | RunState::Error)
    }
}

/// One recorded execution instance of a scheduled job, persisted as
/// runs/{run_id}.json in the store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    /// Unique run identifier
    pub run_id: String,
    /// Job this run belongs to
    pub job_id: String,
    /// Current run state
    pub state: RunState,
    /// Time the run was scheduled for
    pub schedule_time: DateTime<Utc>,
    /// Time the program started, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Time the run reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// Create a fresh scheduled run with a new identifier
    pub fn new(job_id: impl Into<String>, schedule_time: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            state: RunState::Scheduled,
            schedule_time,
            start_time: None,
            completion_time: None,
        }
    }

    /// True once the run has a completion time before `cutoff`
    pub fn completed_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.completion_time.map_or(false, |t| t < cutoff)
    }
}
