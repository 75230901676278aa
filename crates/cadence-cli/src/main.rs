use cadence_common::ClientError;
use clap::Parser;
use commands::Commands;
use std::process::ExitCode;

mod client;
mod commands;

/// cadencectl - administrative control plane for the cadence daemon
#[derive(Parser, Debug)]
#[command(name = "cadencectl")]
#[command(version)]
#[command(about = "Administrative client for the cadence job-scheduling daemon", long_about = None)]
struct Cli {
    /// Daemon host (default: $CADENCE_HOST, else 127.0.0.1)
    #[arg(long, global = true, value_name = "HOST")]
    host: Option<String>,

    /// Daemon port (default: $CADENCE_PORT, else 6101)
    #[arg(long, global = true, value_name = "PORT")]
    port: Option<u16>,

    /// Remote call timeout in seconds (default: 10)
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
            let _ = e.print();
            return code;
        }
    };

    let command_name = cli.command.name();
    match cli.command.execute(cli.host, cli.port, cli.timeout).await {
        Ok(code) => code,
        Err(err) => report_error(command_name, &err),
    }
}

/// The single place any uncaught error becomes a message and an exit status
fn report_error(command: &str, err: &anyhow::Error) -> ExitCode {
    // A reader gone mid-output is not a failure worth diagnosing.
    if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
        if io_err.kind() == std::io::ErrorKind::BrokenPipe {
            return ExitCode::SUCCESS;
        }
    }

    match err.downcast_ref::<ClientError>() {
        Some(ClientError::Api(api)) => {
            // The daemon's own explanation, verbatim.
            eprintln!("cadencectl {}: {}", command, api.message);
        }
        Some(ClientError::Transport(msg)) => {
            eprintln!("cadencectl {}: cannot reach daemon: {}", command, msg);
            eprintln!(
                "Is the daemon running? Check --host/--port or start it with `cadencectl serve`."
            );
        }
        None => {
            eprintln!("cadencectl {}: {:#}", command, err);
        }
    }
    ExitCode::FAILURE
}
