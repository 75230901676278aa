// TCP serving loop for the administrative control channel
use anyhow::{Context, Result};
use cadence_common::{DaemonConfig, JobSpec, Store};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::handler::Handler;
use crate::restart::ShutdownKind;

/// Daemon server answering administrative requests over TCP
pub struct Daemon {
    config: DaemonConfig,
    store: Store,
    jobs: BTreeMap<String, JobSpec>,
}

impl Daemon {
    pub fn new(config: DaemonConfig, store: Store, jobs: BTreeMap<String, JobSpec>) -> Self {
        Self {
            config,
            store,
            jobs,
        }
    }

    /// Run the serving loop - blocks until a shutdown request or interrupt
    pub async fn run(&self) -> Result<ShutdownKind> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .with_context(|| {
                format!("Failed to bind {}:{}", self.config.host, self.config.port)
            })?;
        self.run_on(listener).await
    }

    /// Serve on an already-bound listener
    pub async fn run_on(&self, listener: TcpListener) -> Result<ShutdownKind> {
        info!(
            "cadenced listening on {} ({} jobs loaded, store version {})",
            listener.local_addr()?,
            self.jobs.len(),
            self.store.version()
        );

        // Notify systemd that the daemon is ready
        #[cfg(target_os = "linux")]
        {
            if let Err(e) = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]) {
                info!("Failed to notify systemd: {}", e);
            }
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<ShutdownKind>(1);
        let handler = Handler::new(
            Arc::new(RwLock::new(self.jobs.clone())),
            Arc::new(self.config.clone()),
            shutdown_tx,
        );
        let mut join_set = JoinSet::new();

        let kind = loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let handler_clone = handler.clone();
                        join_set.spawn(async move {
                            if let Err(e) = handler_clone.handle_connection(stream).await {
                                error!("Error handling connection: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                Some(kind) = shutdown_rx.recv() => {
                    info!("shutdown requested: {:?}", kind);
                    break kind;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    break ShutdownKind::Exit;
                }
            }

            // Clean up completed connection tasks
            while let Some(result) = join_set.try_join_next() {
                if let Err(e) = result {
                    error!("Error in connection handler task: {}", e);
                }
            }
        };

        // Draining: stop accepting, let in-flight requests finish.
        drop(listener);
        while let Some(result) = join_set.join_next().await {
            if let Err(e) = result {
                error!("Error in connection handler task: {}", e);
            }
        }
        info!("serving loop exited");

        Ok(kind)
    }
}
