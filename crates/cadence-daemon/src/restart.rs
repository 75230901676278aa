// How the serving loop ends, and the in-place relaunch that follows a
// restart request.

/// Why the serving loop exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    /// Terminate the hosting process
    Exit,
    /// Hosting process should re-exec itself with its original invocation
    Restart,
}

impl ShutdownKind {
    pub fn from_restart_flag(restart: bool) -> Self {
        if restart {
            ShutdownKind::Restart
        } else {
            ShutdownKind::Exit
        }
    }
}

/// Replace this process with a fresh invocation of itself.
///
/// Re-executes the current executable with the original command-line
/// arguments, so configuration files and overrides are re-evaluated from
/// scratch. On success this never returns; the returned error is always a
/// relaunch failure and must be treated as fatal by the caller.
pub fn relaunch() -> anyhow::Error {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => return anyhow::Error::new(e).context("cannot determine current executable"),
    };
    let args: Vec<std::ffi::OsString> = std::env::args_os().skip(1).collect();

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // exec only returns on failure.
        let err = std::process::Command::new(&exe).args(&args).exec();
        anyhow::Error::new(err).context(format!("failed to relaunch {}", exe.display()))
    }

    #[cfg(not(unix))]
    {
        let _ = args;
        anyhow::anyhow!(
            "in-place restart is not supported on this platform; restart {} manually",
            exe.display()
        )
    }
}
