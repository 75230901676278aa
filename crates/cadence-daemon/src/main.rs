use anyhow::Result;
use cadence_daemon::{relaunch, serve, ServeArgs, ShutdownKind};
use clap::Parser;
use std::path::PathBuf;

/// Cadence job-scheduling daemon
#[derive(Parser, Debug)]
#[command(name = "cadenced")]
#[command(version)]
#[command(about = "Cadence job-scheduling daemon", long_about = None)]
struct Args {
    /// Log at debug level
    #[arg(long)]
    debug: bool,

    /// Bind address
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Config override, KEY=VALUE (repeatable)
    #[arg(long = "override", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    cadence_daemon::init_tracing(args.debug);

    let serve_args = ServeArgs {
        host: args.host,
        port: args.port,
        config: args.config,
        overrides: args.overrides,
    };

    match serve(serve_args).await? {
        ShutdownKind::Exit => Ok(()),
        ShutdownKind::Restart => {
            tracing::info!("relaunching with original invocation");
            // Only returns on failure; a failed relaunch is fatal.
            Err(relaunch())
        }
    }
}
