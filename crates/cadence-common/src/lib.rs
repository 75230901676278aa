// Error types
pub mod error;
pub use error::{ApiError, ClientError, StoreError};

// Core data types
pub mod types;
pub use types::{RunRecord, RunState};

// Job definitions
pub mod jobs;
pub use jobs::{JobError, JobSpec};

// Configuration
pub mod config;
pub use config::{DaemonConfig, DEFAULT_HOST, DEFAULT_PORT};

// Control protocol and framing
pub mod protocol;
pub use protocol::{JobChangeResult, Request, Response, VersionInfo};
pub mod wire;

// Persistent store
pub mod store;
pub use store::{ArchiveStats, CheckProblem, MigrateReport, Store, STORE_VERSION};
