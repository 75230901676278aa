use crate::error::ApiError;
use serde::{Deserialize, Serialize};

/// Control requests sent from the CLI to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Report the daemon's version
    Version,
    /// Re-scan the job source and diff against loaded jobs
    ReloadJobs {
        /// Compute the diff without applying it
        dry_run: bool,
    },
    /// Terminate the daemon
    Shutdown {
        /// Relaunch the hosting process after the serving loop exits
        restart: bool,
    },
}

/// Control responses sent from the daemon to the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Successful response with data payload
    Success {
        /// Response data (JSON value)
        data: serde_json::Value,
    },
    /// Application-level rejection
    Error {
        /// HTTP-style status code
        code: u16,
        /// Error message, surfaced to the operator verbatim
        message: String,
    },
}

impl Response {
    /// Create a success response with data
    pub fn success(data: serde_json::Value) -> Self {
        Self::Success { data }
    }

    /// Create an error response from an ApiError
    pub fn error(err: &ApiError) -> Self {
        Self::Error {
            code: err.code,
            message: err.message.clone(),
        }
    }
}

/// Payload of a successful Version request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Daemon version
    pub version: String,
}

/// Outcome of a reload: three disjoint, sorted lists of job ids
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobChangeResult {
    /// Jobs no longer present in the job source
    pub removed: Vec<String>,
    /// Jobs newly present in the job source
    pub added: Vec<String>,
    /// Jobs whose definition changed
    pub changed: Vec<String>,
    /// Whether the diff was computed without being applied
    pub dry_run: bool,
}

impl JobChangeResult {
    /// True when the reload found nothing to do
    pub fn is_unchanged(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.changed.is_empty()
    }
}
