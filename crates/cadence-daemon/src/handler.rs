// Request handler for the administrative control channel
use anyhow::Result;
use cadence_common::jobs::load_jobs;
use cadence_common::wire::{read_message, write_message};
use cadence_common::{ApiError, DaemonConfig, JobSpec, Request, Response, VersionInfo};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info};

use crate::jobs::diff_jobs;
use crate::restart::ShutdownKind;

/// Handler owns the loaded-jobs state and processes control requests
#[derive(Clone)]
pub struct Handler {
    /// Jobs currently loaded, keyed by job id
    jobs: Arc<RwLock<BTreeMap<String, JobSpec>>>,
    /// Daemon configuration
    config: Arc<DaemonConfig>,
    /// Signals the serving loop to drain and exit
    shutdown: mpsc::Sender<ShutdownKind>,
}

impl Handler {
    pub fn new(
        jobs: Arc<RwLock<BTreeMap<String, JobSpec>>>,
        config: Arc<DaemonConfig>,
        shutdown: mpsc::Sender<ShutdownKind>,
    ) -> Self {
        Self {
            jobs,
            config,
            shutdown,
        }
    }

    /// Handle a single connection (read request, process, write response)
    pub async fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        let request = match read_message(&mut stream).await {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to read request: {}", e);
                let response = Response::error(&ApiError::bad_request(e.to_string()));
                let _ = write_message(&mut stream, &response).await;
                return Ok(());
            }
        };

        let response = self.handle(request).await;
        write_message(&mut stream, &response).await?;
        Ok(())
    }

    /// Process a request and return a response
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Version => self.handle_version(),
            Request::ReloadJobs { dry_run } => self.handle_reload_jobs(dry_run).await,
            Request::Shutdown { restart } => self.handle_shutdown(restart).await,
        }
    }

    fn handle_version(&self) -> Response {
        info!("Version request");
        let info = VersionInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        match serde_json::to_value(info) {
            Ok(data) => Response::success(data),
            Err(e) => Response::error(&ApiError::internal(e.to_string())),
        }
    }

    /// Re-scan the job source, diff against loaded jobs, apply unless dry-run
    async fn handle_reload_jobs(&self, dry_run: bool) -> Response {
        info!("ReloadJobs request: dry_run={}", dry_run);

        let (next, errors) = match load_jobs(&self.config.jobs_dir) {
            Ok(scan) => scan,
            Err(e) => {
                return Response::error(&ApiError::internal(format!(
                    "cannot read job directory {}: {}",
                    self.config.jobs_dir.display(),
                    e
                )));
            }
        };

        if !errors.is_empty() {
            let listing = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Response::error(&ApiError::bad_request(format!(
                "job source has {} invalid definition(s): {}",
                errors.len(),
                listing
            )));
        }

        let mut jobs = self.jobs.write().await;
        let result = diff_jobs(&jobs, &next, dry_run);
        if !dry_run {
            *jobs = next;
            info!(
                "jobs reloaded: {} removed, {} added, {} changed",
                result.removed.len(),
                result.added.len(),
                result.changed.len()
            );
        }

        match serde_json::to_value(&result) {
            Ok(data) => Response::success(data),
            Err(e) => Response::error(&ApiError::internal(e.to_string())),
        }
    }

    /// Acknowledge, then signal the serving loop to drain
    async fn handle_shutdown(&self, restart: bool) -> Response {
        info!("Shutdown request: restart={}", restart);
        let kind = ShutdownKind::from_restart_flag(restart);
        if let Err(e) = self.shutdown.send(kind).await {
            return Response::error(&ApiError::internal(format!(
                "shutdown already in progress: {}",
                e
            )));
        }
        Response::success(serde_json::Value::Null)
    }
}
