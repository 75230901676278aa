use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default port the daemon listens on
pub const DEFAULT_PORT: u16 = 6101;

/// Default host the daemon binds and the client targets
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Environment variables consulted for the default daemon address
pub const HOST_ENV_VAR: &str = "CADENCE_HOST";
pub const PORT_ENV_VAR: &str = "CADENCE_PORT";

/// Daemon configuration loaded from a JSON config file or using defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address to bind (default: 127.0.0.1)
    pub host: String,
    /// Port to listen on (default: 6101)
    pub port: u16,
    /// Directory holding job definition files (default: ~/.cadence/jobs)
    pub jobs_dir: PathBuf,
    /// Path to the persistent store (default: ~/.cadence/store)
    pub store_path: PathBuf,
}

impl DaemonConfig {
    /// Load configuration from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let contents = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file {}", p.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file {}", p.display()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply a single `key=value` override to the loaded configuration
    pub fn apply_override(&mut self, spec: &str) -> anyhow::Result<()> {
        let Some((key, value)) = spec.split_once('=') else {
            bail!("invalid override {:?}, expected KEY=VALUE", spec);
        };
        match key {
            "host" => self.host = value.to_string(),
            "port" => {
                self.port = value
                    .parse()
                    .with_context(|| format!("invalid port: {:?}", value))?;
            }
            "jobs_dir" => self.jobs_dir = PathBuf::from(value),
            "store_path" => self.store_path = PathBuf::from(value),
            other => bail!("unknown config key: {:?}", other),
        }
        Ok(())
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let home = dirs::home_dir().expect("HOME directory not found");
        let base = home.join(".cadence");
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            jobs_dir: base.join("jobs"),
            store_path: base.join("store"),
        }
    }
}

/// Resolve the daemon address targeted by the client.
///
/// Per-invocation flags win over the CADENCE_HOST / CADENCE_PORT
/// environment, which wins over built-in defaults. A CADENCE_PORT that
/// does not parse as a port number is an error, not a fallback.
pub fn resolve_addr(host: Option<String>, port: Option<u16>) -> anyhow::Result<(String, u16)> {
    let host = host
        .or_else(|| std::env::var(HOST_ENV_VAR).ok())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = match port {
        Some(p) => p,
        None => match std::env::var(PORT_ENV_VAR) {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("invalid {}: {:?}", PORT_ENV_VAR, raw))?,
            Err(_) => DEFAULT_PORT,
        },
    };
    Ok((host, port))
}
