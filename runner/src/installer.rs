//! SDK installation and removal.
//!
//! Installation fetches the bootstrap script with the session's access token,
//! runs it inside the destination, and chains into split-archive assembly.
//! A rejected fetch is treated as a stale credential: the credential file is
//! deleted and the session restarted so the next session re-authenticates.
//!
//! A tree counts as installed only once [`COMPLETION_MARKER`] exists inside
//! it. Any failure after the destination is created removes it again, so the
//! next session starts over instead of mistaking a partial tree for a
//! finished one.

use crate::archive::ArchiveStep;
use crate::config::BootstrapConfig;
use crate::error::{RunnerError, Result};
use crate::exec::{CommandExecutor, RunOptions, exit_code};
use crate::http::{FetchError, HttpClient};
use crate::restart::SessionRestarter;
use crate::session::{AccessToken, SessionState};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

/// Environment variable carrying the token into the bootstrap script.
pub const TOKEN_VAR: &str = "GITHUB_TOKEN";

/// File written into the destination after assembly succeeds.
pub const COMPLETION_MARKER: &str = ".imcv2-runner-complete";

/// What to do with the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallAction {
    /// Fetch and run the bootstrap script.
    Install,
    /// Remove the destination tree.
    Uninstall,
}

/// A requested install or uninstall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationTarget {
    /// Where the SDK lives.
    pub destination: Utf8PathBuf,
    /// Install or uninstall.
    pub action: InstallAction,
    /// Reinstall over an existing tree.
    pub force: bool,
}

impl InstallationTarget {
    /// An install request.
    #[must_use]
    pub fn install(destination: impl Into<Utf8PathBuf>, force: bool) -> Self {
        Self {
            destination: destination.into(),
            action: InstallAction::Install,
            force,
        }
    }

    /// An uninstall request.
    #[must_use]
    pub fn uninstall(destination: impl Into<Utf8PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            action: InstallAction::Uninstall,
            force: false,
        }
    }
}

/// Result of a successful [`Installer::operate`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The SDK was installed and the archive assembled.
    Installed {
        /// The install destination.
        path: Utf8PathBuf,
    },
    /// The destination is gone.
    Uninstalled {
        /// The removed destination.
        path: Utf8PathBuf,
        /// Whether anything was there to remove.
        existed: bool,
    },
}

/// Checks that `destination` is the home directory or lies beneath it.
///
/// Returns the lexically normalised destination.
///
/// # Errors
///
/// Returns [`RunnerError::PathSafety`] for relative paths, paths containing
/// `..`, and paths outside `home`.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use imcv2_sdk_runner::installer::validate_destination;
///
/// let home = Utf8Path::new("/home/u");
/// let ok = validate_destination(home, Utf8Path::new("/home/u/./sdk/"))?;
/// assert_eq!(ok.as_str(), "/home/u/sdk");
/// assert!(validate_destination(home, Utf8Path::new("/home/u/../v/sdk")).is_err());
/// assert!(validate_destination(home, Utf8Path::new("/home/user2")).is_err());
/// # Ok::<(), imcv2_sdk_runner::error::RunnerError>(())
/// ```
pub fn validate_destination(home: &Utf8Path, destination: &Utf8Path) -> Result<Utf8PathBuf> {
    let reject = || RunnerError::PathSafety {
        path: destination.to_path_buf(),
        home: home.to_path_buf(),
    };
    let normalised = normalise(destination).ok_or_else(reject)?;
    let home = normalise(home).ok_or_else(reject)?;
    if normalised.starts_with(&home) {
        Ok(normalised)
    } else {
        Err(reject())
    }
}

/// Drops `.` components; `None` for relative paths or any `..`.
fn normalise(path: &Utf8Path) -> Option<Utf8PathBuf> {
    if !path.is_absolute() {
        return None;
    }
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::ParentDir => return None,
            Utf8Component::CurDir => {}
            other => out.push(other.as_str()),
        }
    }
    Some(out)
}

/// Installs or removes the SDK tree.
pub struct Installer<'a> {
    executor: &'a dyn CommandExecutor,
    http: &'a dyn HttpClient,
    restarter: &'a dyn SessionRestarter,
    assembler: &'a dyn ArchiveStep,
    bootstrap: &'a BootstrapConfig,
    credential_file: Utf8PathBuf,
}

impl<'a> Installer<'a> {
    /// Creates an installer.
    ///
    /// `credential_file` is deleted when the bootstrap fetch is rejected.
    #[must_use]
    pub fn new(
        executor: &'a dyn CommandExecutor,
        http: &'a dyn HttpClient,
        restarter: &'a dyn SessionRestarter,
        assembler: &'a dyn ArchiveStep,
        bootstrap: &'a BootstrapConfig,
        credential_file: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            executor,
            http,
            restarter,
            assembler,
            bootstrap,
            credential_file: credential_file.into(),
        }
    }

    /// Carries out `target` for the session.
    ///
    /// # Errors
    ///
    /// - [`RunnerError::PathSafety`] before any mutation for unsafe targets.
    /// - [`RunnerError::AlreadyInstalled`] when the destination exists and
    ///   `force` is not set.
    /// - [`RunnerError::AuthStatus`] when the bootstrap fetch is rejected,
    ///   after the credential reset and the restart request.
    /// - [`RunnerError::Network`] when the fetch gets no response.
    /// - [`RunnerError::BootstrapFailed`] when the script exits non-zero.
    /// - Any assembly [`RunnerError::StepFailure`].
    pub fn operate(
        &self,
        session: &mut SessionState,
        target: &InstallationTarget,
    ) -> Result<InstallOutcome> {
        let destination = validate_destination(session.home(), &target.destination)?;
        match target.action {
            InstallAction::Uninstall => uninstall(session, destination),
            InstallAction::Install => self.install(session, destination, target.force),
        }
    }

    fn install(
        &self,
        session: &mut SessionState,
        destination: Utf8PathBuf,
        force: bool,
    ) -> Result<InstallOutcome> {
        if destination.exists() && !force && !is_incomplete(session, &destination) {
            return Err(RunnerError::AlreadyInstalled { path: destination });
        }
        let token = session
            .token()
            .ok_or_else(|| RunnerError::Config {
                reason: "no access token; the credential gate has not passed".to_owned(),
            })?
            .clone();

        if destination.exists() {
            if force {
                log::info!("forcing reinstall over {destination}");
            } else {
                log::warn!("{destination} holds an unfinished install; starting over");
            }
            uninstall(session, destination.clone())?;
        }
        std::fs::create_dir_all(&destination)?;

        if let Err(err) = self.populate(session, &destination, &token) {
            discard(session, &destination);
            return Err(err);
        }
        Ok(InstallOutcome::Installed { path: destination })
    }

    /// Fetches and runs the bootstrap script, assembles the archive, and
    /// marks the tree complete.
    fn populate(
        &self,
        session: &mut SessionState,
        destination: &Utf8Path,
        token: &AccessToken,
    ) -> Result<()> {
        let url = self.bootstrap.url.as_str();
        let script = match self.http.fetch_text(url, token.expose()) {
            Ok(response) if response.is_success() => response.body,
            Ok(response) => return Err(self.reject(url, response.status)),
            Err(FetchError::Status { status, .. }) => return Err(self.reject(url, status)),
            Err(err) => {
                return Err(RunnerError::Network {
                    url: url.to_owned(),
                    reason: err.to_string(),
                });
            }
        };

        let options = RunOptions::default()
            .in_dir(destination)
            .with_env(TOKEN_VAR, token.expose())
            .with_env("PATH", session.child_path(std::env::var("PATH").ok().as_deref()))
            .with_stdin(script);
        let status = self.executor.run_interactive(
            "bash",
            &["-s", "--", self.bootstrap.branch.as_str()],
            &options,
        )?;
        if !status.success() {
            return Err(RunnerError::BootstrapFailed {
                code: exit_code(status),
            });
        }

        log::info!("SDK bootstrapped into {destination}");
        session.record_install(destination.to_path_buf());
        self.assembler.assemble(session, false)?;
        std::fs::write(destination.join(COMPLETION_MARKER), "")?;
        Ok(())
    }

    /// Resets credentials and requests a restart after a rejected fetch.
    fn reject(&self, url: &str, status: u16) -> RunnerError {
        log::warn!("bootstrap fetch returned HTTP {status}; resetting credentials");
        if let Err(err) = remove_file_if_present(&self.credential_file) {
            log::warn!("could not remove {}: {err}", self.credential_file);
        }
        if let Err(err) = self.restarter.restart() {
            log::warn!("session restart failed: {err}");
        }
        RunnerError::AuthStatus {
            url: url.to_owned(),
            status,
        }
    }
}

fn uninstall(session: &mut SessionState, destination: Utf8PathBuf) -> Result<InstallOutcome> {
    let existed = destination.exists();
    if existed {
        std::fs::remove_dir_all(&destination)?;
        log::info!("removed {destination}");
    }
    if session.install_path() == Some(destination.as_path()) {
        session.clear_install();
    }
    Ok(InstallOutcome::Uninstalled {
        path: destination,
        existed,
    })
}

/// True for a tree left behind by an interrupted install.
///
/// The home directory itself is never treated as unfinished.
fn is_incomplete(session: &SessionState, destination: &Utf8Path) -> bool {
    destination != session.home() && !destination.join(COMPLETION_MARKER).exists()
}

/// Removes a partially populated destination after a failed install.
fn discard(session: &mut SessionState, destination: &Utf8Path) {
    if destination == session.home() {
        log::warn!("leaving {destination} in place after the failed install");
    } else if let Err(err) = std::fs::remove_dir_all(destination) {
        log::warn!("could not remove unfinished install at {destination}: {err}");
    }
    if session.install_path() == Some(destination) {
        session.clear_install();
    }
}

fn remove_file_if_present(path: &Utf8Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
