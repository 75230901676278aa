// The cadence daemon: serving loop, control-request handler, job reload
// diffing, and restart orchestration. The scheduling engine proper plugs in
// behind this administrative surface.
pub mod handler;
pub mod jobs;
pub mod restart;
pub mod server;

pub use restart::{relaunch, ShutdownKind};
pub use server::Daemon;

use anyhow::{bail, Context, Result};
use cadence_common::jobs::load_jobs;
use cadence_common::{DaemonConfig, Store};
use std::path::PathBuf;
use tracing::error;

/// Invocation parameters shared by `cadenced` and `cadencectl serve`
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Bind address override
    pub host: Option<String>,
    /// Port override
    pub port: Option<u16>,
    /// Config file to load instead of defaults
    pub config: Option<PathBuf>,
    /// KEY=VALUE config overrides, applied in order
    pub overrides: Vec<String>,
}

/// Initialize tracing for a foreground daemon
pub fn init_tracing(debug: bool) {
    let level = if debug {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

/// Resolve configuration, open the store, load jobs, and serve until
/// shutdown. The caller decides what a `Restart` result turns into.
pub async fn serve(args: ServeArgs) -> Result<ShutdownKind> {
    let mut config = DaemonConfig::load(args.config.as_deref())?;
    for spec in &args.overrides {
        config.apply_override(spec)?;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let store = Store::open(&config.store_path)
        .with_context(|| format!("cannot open store at {}", config.store_path.display()))?;

    let (jobs, errors) = load_jobs(&config.jobs_dir)
        .with_context(|| format!("cannot read job directory {}", config.jobs_dir.display()))?;
    if !errors.is_empty() {
        for err in &errors {
            error!("invalid job definition: {}", err);
        }
        bail!(
            "job source {} has {} invalid definition(s)",
            config.jobs_dir.display(),
            errors.len()
        );
    }

    let daemon = Daemon::new(config, store, jobs);
    daemon.run().await
}
