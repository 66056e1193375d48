//! Session teardown used as the universal recovery action.
//!
//! Restarting the hosting session re-runs the pinned autostart block, so a
//! failure that needs fresh state (a rejected credential, a completed install)
//! converges on the next session instead of inside this process.

use crate::error::{RunnerError, Result};
use crate::exec::{CommandExecutor, run_checked};

/// Tears down the hosting terminal session.
#[cfg_attr(test, mockall::automock)]
pub trait SessionRestarter {
    /// Requests the restart.
    ///
    /// Callers treat a successful return as the end of the process and exit
    /// straight afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the teardown command could not be issued.
    fn restart(&self) -> Result<()>;
}

/// Restarts a WSL instance, or hangs up the parent shell outside WSL.
pub struct WslSessionRestarter<'a> {
    executor: &'a dyn CommandExecutor,
    distro: Option<String>,
    parent_pid: u32,
}

impl<'a> WslSessionRestarter<'a> {
    /// Creates a restarter for the given distribution.
    ///
    /// `parent_pid` is the hosting shell that receives `SIGHUP` when no
    /// distribution is known.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, distro: Option<String>, parent_pid: u32) -> Self {
        Self {
            executor,
            distro,
            parent_pid,
        }
    }

    /// Creates a restarter whose fallback target is this process's parent.
    #[cfg(unix)]
    #[must_use]
    pub fn for_current_process(executor: &'a dyn CommandExecutor, distro: Option<String>) -> Self {
        Self::new(executor, distro, std::os::unix::process::parent_id())
    }
}

impl SessionRestarter for WslSessionRestarter<'_> {
    fn restart(&self) -> Result<()> {
        let map_err = |message: String| RunnerError::Restart { message };
        match &self.distro {
            Some(distro) => {
                log::warn!("restarting WSL instance {distro}");
                run_checked(
                    self.executor,
                    "wsl.exe",
                    &["--terminate", distro.as_str()],
                    map_err,
                )?;
            }
            None => {
                let pid = self.parent_pid.to_string();
                log::warn!("hanging up session process {pid}");
                run_checked(self.executor, "kill", &["-HUP", pid.as_str()], map_err)?;
            }
        }
        Ok(())
    }
}
