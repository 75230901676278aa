use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Application-level rejection reported by the daemon.
///
/// The daemon was reachable and answered; it refused the request. The
/// message is the daemon's own explanation and is shown to the operator
/// verbatim.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    /// HTTP-style status code (400, 404, 409, 500).
    pub code: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(409, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }
}

/// Failure modes of a remote control call.
///
/// `Transport` means the daemon could not be reached at all (or hung up
/// before replying); `Api` means it answered with a rejection. Callers must
/// keep the two apart: one gets a remediation hint, the other surfaces the
/// daemon's message as-is.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot reach daemon: {0}")]
    Transport(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors raised by direct access to the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store already exists at {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("no store found at {}", .0.display())]
    NotFound(PathBuf),
    #[error("store version {found} is newer than supported version {supported}")]
    IncompatibleVersion { found: u32, supported: u32 },
    #[error("store version {found} predates version {current}; run `cadencectl migrate` first")]
    NeedsMigration { found: u32, current: u32 },
    #[error("corrupt store: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
