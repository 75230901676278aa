use ansi_term::Colour::{Green, Red, Yellow};
use anyhow::{Context, Result};
use cadence_common::jobs::load_jobs;
use cadence_common::store::{archive_runs, Store};
use cadence_common::{config, DaemonConfig, JobChangeResult};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use crate::client::ClientSession;

/// cadencectl subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Archive runs completed before a cutoff time into another store
    ArchiveRuns(ArchiveRunsArgs),
    /// Scan a store for structural problems
    CheckDb(CheckDbArgs),
    /// Validate job definition files
    CheckJobs(CheckJobsArgs),
    /// Initialize a new, empty store
    Create(CreateArgs),
    /// Upgrade a store's on-disk layout to the current version
    Migrate(MigrateArgs),
    /// Diff (and apply) job source changes on the running daemon
    ReloadJobs(ReloadJobsArgs),
    /// Shut down the daemon and relaunch it
    Restart,
    /// Run the daemon in the foreground
    Serve(ServeArgs),
    /// Terminate the daemon
    ShutDown,
    /// Print client and daemon versions
    Version,
}

impl Commands {
    /// Command name as typed on the command line, for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Commands::ArchiveRuns(_) => "archive-runs",
            Commands::CheckDb(_) => "check-db",
            Commands::CheckJobs(_) => "check-jobs",
            Commands::Create(_) => "create",
            Commands::Migrate(_) => "migrate",
            Commands::ReloadJobs(_) => "reload-jobs",
            Commands::Restart => "restart",
            Commands::Serve(_) => "serve",
            Commands::ShutDown => "shut-down",
            Commands::Version => "version",
        }
    }

    pub async fn execute(
        self,
        host: Option<String>,
        port: Option<u16>,
        timeout: Option<u64>,
    ) -> Result<ExitCode> {
        match self {
            Commands::ArchiveRuns(args) => cmd_archive_runs(args),
            Commands::CheckDb(args) => cmd_check_db(args),
            Commands::CheckJobs(args) => cmd_check_jobs(args),
            Commands::Create(args) => cmd_create(args),
            Commands::Migrate(args) => cmd_migrate(args),
            Commands::ReloadJobs(args) => cmd_reload_jobs(args, session(host, port, timeout)?).await,
            Commands::Restart => cmd_restart(session(host, port, timeout)?).await,
            Commands::Serve(args) => cmd_serve(args, host, port).await,
            Commands::ShutDown => cmd_shut_down(session(host, port, timeout)?).await,
            Commands::Version => cmd_version(session(host, port, timeout)?).await,
        }
    }
}

fn session(
    host: Option<String>,
    port: Option<u16>,
    timeout: Option<u64>,
) -> Result<ClientSession> {
    let (host, port) = config::resolve_addr(host, port)?;
    let mut session = ClientSession::new(host, port);
    if let Some(secs) = timeout {
        session = session.with_timeout(Duration::from_secs(secs));
    }
    Ok(session)
}

/// Expand `~` in a user-supplied path
fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn parse_cutoff(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            format!(
                "invalid timestamp {:?}: {} (expected RFC 3339, e.g. 2024-01-01T00:00:00Z)",
                s, e
            )
        })
}

/// Arguments for the `archive-runs` command
#[derive(Debug, Args)]
pub struct ArchiveRunsArgs {
    /// Source store path
    #[arg(value_name = "DBPATH")]
    pub db: String,

    /// Pre-existing archive store path
    #[arg(value_name = "ARCPATH")]
    pub archive: String,

    /// Archive runs completed strictly before this time (RFC 3339)
    #[arg(value_name = "TIME", value_parser = parse_cutoff)]
    pub cutoff: DateTime<Utc>,

    /// Also remove archived runs from the source store
    #[arg(long)]
    pub delete: bool,
}

/// Arguments for the `check-db` command
#[derive(Debug, Args)]
pub struct CheckDbArgs {
    /// Store path to scan
    #[arg(value_name = "DBPATH")]
    pub db: String,
}

/// Arguments for the `check-jobs` command
#[derive(Debug, Args)]
pub struct CheckJobsArgs {
    /// Job directory to validate (default: the configured job directory)
    #[arg(value_name = "DIR")]
    pub dir: Option<String>,

    /// Config file supplying the default job directory
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Arguments for the `create` command
#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Path for the new store
    #[arg(value_name = "PATH")]
    pub path: String,
}

/// Arguments for the `migrate` command
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Store path to upgrade
    #[arg(value_name = "PATH")]
    pub path: String,
}

/// Arguments for the `reload-jobs` command
#[derive(Debug, Args)]
pub struct ReloadJobsArgs {
    /// Compute the diff without applying it
    #[arg(long)]
    pub dry_run: bool,

    /// Suppress output
    #[arg(long)]
    pub quiet: bool,
}

/// Arguments for the `serve` command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Log at debug level
    #[arg(long)]
    pub debug: bool,

    /// Config file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Config override, KEY=VALUE (repeatable)
    #[arg(long = "override", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

fn cmd_archive_runs(args: ArchiveRunsArgs) -> Result<ExitCode> {
    let db = Store::open(&expand(&args.db))
        .with_context(|| format!("cannot open store {}", args.db))?;
    let archive = Store::open(&expand(&args.archive))
        .with_context(|| format!("cannot open archive store {}", args.archive))?;

    let stats = archive_runs(&db, &archive, args.cutoff, args.delete)?;

    let mut out = io::stdout().lock();
    writeln!(
        out,
        "archived {} run(s), {} already archived, {} deleted",
        stats.archived, stats.skipped, stats.deleted
    )?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_check_db(args: CheckDbArgs) -> Result<ExitCode> {
    let store = Store::open_for_check(&expand(&args.db))
        .with_context(|| format!("cannot open store {}", args.db))?;
    let problems = store.check()?;

    let mut out = io::stdout().lock();
    if problems.is_empty() {
        writeln!(out, "{}: no problems found", args.db)?;
        return Ok(ExitCode::SUCCESS);
    }
    for problem in &problems {
        writeln!(out, "{}: {}", args.db, problem)?;
    }
    writeln!(out, "{} problem(s) found", problems.len())?;
    Ok(ExitCode::FAILURE)
}

fn cmd_check_jobs(args: CheckJobsArgs) -> Result<ExitCode> {
    let dir = match args.dir {
        Some(dir) => expand(&dir),
        None => DaemonConfig::load(args.config.as_deref())?.jobs_dir,
    };
    let (jobs, errors) = load_jobs(&dir)
        .with_context(|| format!("cannot read job directory {}", dir.display()))?;

    let mut out = io::stdout().lock();
    if errors.is_empty() {
        writeln!(out, "{} job(s) OK", jobs.len())?;
        return Ok(ExitCode::SUCCESS);
    }
    for err in &errors {
        writeln!(out, "{}", err)?;
    }
    writeln!(out, "{} invalid job definition(s)", errors.len())?;
    Ok(ExitCode::FAILURE)
}

fn cmd_create(args: CreateArgs) -> Result<ExitCode> {
    let path = expand(&args.path);
    let store = Store::create(&path)?;
    let mut out = io::stdout().lock();
    writeln!(
        out,
        "initialized empty store at {} (version {})",
        store.path().display(),
        store.version()
    )?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_migrate(args: MigrateArgs) -> Result<ExitCode> {
    let path = expand(&args.path);
    let report = Store::migrate(&path)?;
    let mut out = io::stdout().lock();
    if report.is_noop() {
        writeln!(
            out,
            "{} already at version {}, nothing to do",
            path.display(),
            report.to_version
        )?;
    } else {
        writeln!(
            out,
            "migrated {} from version {} to {} ({} run record(s) relocated)",
            path.display(),
            report.from_version,
            report.to_version,
            report.moved_runs
        )?;
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_reload_jobs(args: ReloadJobsArgs, session: ClientSession) -> Result<ExitCode> {
    let result = session.reload_jobs(args.dry_run).await?;
    if !args.quiet {
        print_job_changes(&result)?;
    }
    Ok(ExitCode::SUCCESS)
}

fn print_job_changes(result: &JobChangeResult) -> Result<()> {
    let mut out = io::stdout().lock();
    for job_id in &result.removed {
        writeln!(out, "{} {}", Red.paint("-"), job_id)?;
    }
    for job_id in &result.added {
        writeln!(out, "{} {}", Green.paint("+"), job_id)?;
    }
    for job_id in &result.changed {
        writeln!(out, "{} {}", Yellow.paint("~"), job_id)?;
    }
    if result.is_unchanged() {
        writeln!(out, "job source unchanged")?;
    } else {
        writeln!(
            out,
            "{} removed, {} added, {} changed",
            result.removed.len(),
            result.added.len(),
            result.changed.len()
        )?;
    }
    if result.dry_run {
        writeln!(out, "dry run; no changes applied")?;
    }
    Ok(())
}

async fn cmd_restart(session: ClientSession) -> Result<ExitCode> {
    session.shut_down(true).await?;
    let mut out = io::stdout().lock();
    writeln!(out, "daemon restarting")?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_shut_down(session: ClientSession) -> Result<ExitCode> {
    session.shut_down(false).await?;
    let mut out = io::stdout().lock();
    writeln!(out, "daemon shutting down")?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_version(session: ClientSession) -> Result<ExitCode> {
    let mut out = io::stdout().lock();
    writeln!(out, "client: {}", env!("CARGO_PKG_VERSION"))?;
    let daemon_version = session.version().await?;
    writeln!(out, "daemon: {}", daemon_version)?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_serve(args: ServeArgs, host: Option<String>, port: Option<u16>) -> Result<ExitCode> {
    cadence_daemon::init_tracing(args.debug);
    let serve_args = cadence_daemon::ServeArgs {
        host,
        port,
        config: args.config,
        overrides: args.overrides,
    };
    match cadence_daemon::serve(serve_args).await? {
        cadence_daemon::ShutdownKind::Exit => Ok(ExitCode::SUCCESS),
        cadence_daemon::ShutdownKind::Restart => {
            tracing::info!("relaunching with original invocation");
            // Only returns on failure; a failed relaunch is fatal.
            Err(cadence_daemon::relaunch())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_cutoff_accepts_rfc3339() {
        let t = parse_cutoff("2024-01-01T00:00:00Z").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let offset = parse_cutoff("2024-01-01T05:30:00+05:30").unwrap();
        assert_eq!(offset, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_cutoff_rejects_malformed_timestamps() {
        let err = parse_cutoff("yesterday").unwrap_err();
        assert!(err.contains("RFC 3339"));
        assert!(parse_cutoff("2024-13-01T00:00:00Z").is_err());
    }

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/db.store"), home.join("db.store"));
        assert_eq!(expand("/srv/db.store"), PathBuf::from("/srv/db.store"));
    }

    #[test]
    fn test_command_names() {
        let cmd = Commands::ArchiveRuns(ArchiveRunsArgs {
            db: "db".to_string(),
            archive: "arc".to_string(),
            cutoff: Utc::now(),
            delete: false,
        });
        assert_eq!(cmd.name(), "archive-runs");
        assert_eq!(Commands::ShutDown.name(), "shut-down");
    }
}
