//! Credential gate around the `dt` access-token tool.
//!
//! The gate guarantees that the session holds a usable access token before
//! anything authenticated is attempted. The tool itself is opaque: the runner
//! only relies on its exit codes, its credential file, and the token it
//! prints.

use crate::autostart::Pinner;
use crate::config::RunnerConfig;
use crate::env::RunnerEnv;
use crate::error::{RunnerError, Result};
use crate::exec::{CommandExecutor, RunOptions, exit_code, run_checked};
use crate::git_identity::configure_best_effort;
use crate::http::HttpClient;
use crate::session::{AccessToken, SessionState};
use camino::{Utf8Path, Utf8PathBuf};

/// Name of the credential tool, used in diagnostics.
pub const TOOL_NAME: &str = "dt";

/// Subcommand that installs the downloaded binary into the tool directory.
const SELF_INSTALL: &str = "install";
/// Interactive subcommand that authenticates the user.
const SETUP: &str = "setup";

/// Where the gate starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Tool installed and a token is available.
    Authenticated,
    /// The tool binary is missing.
    ToolAbsent,
    /// The tool is installed but yields no token.
    Unauthenticated,
}

/// Ensures the `dt` tool is installed and authenticated.
pub struct CredentialGate<'a> {
    executor: &'a dyn CommandExecutor,
    http: &'a dyn HttpClient,
    env: &'a RunnerEnv,
    config: &'a RunnerConfig,
    pinner: Pinner,
    script_path: Utf8PathBuf,
}

impl<'a> CredentialGate<'a> {
    /// Creates a gate that pins `script_path` once authentication succeeds.
    #[must_use]
    pub fn new(
        executor: &'a dyn CommandExecutor,
        http: &'a dyn HttpClient,
        env: &'a RunnerEnv,
        config: &'a RunnerConfig,
        script_path: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            executor,
            http,
            env,
            config,
            pinner: Pinner::new(config.autostart.marker.as_str()),
            script_path: script_path.into(),
        }
    }

    /// Directory the tool installs itself into.
    #[must_use]
    pub fn tool_dir(&self) -> Utf8PathBuf {
        self.env.home.join(&self.config.credential.tool_dir)
    }

    /// The installed tool binary.
    #[must_use]
    pub fn tool_path(&self) -> Utf8PathBuf {
        self.tool_dir().join(TOOL_NAME)
    }

    /// The tool's credential file.
    #[must_use]
    pub fn credential_path(&self) -> Utf8PathBuf {
        self.env.home.join(&self.config.credential.credential_file)
    }

    /// Removes the credential file so the next session re-authenticates.
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists but cannot be removed.
    pub fn reset_credentials(&self) -> Result<()> {
        remove_if_present(&self.credential_path())
    }

    /// Classifies the current state and the token, if one is already there.
    #[must_use]
    pub fn probe(&self) -> (GateState, Option<AccessToken>) {
        if !self.tool_path().is_file() {
            return (GateState::ToolAbsent, None);
        }
        if !self.credential_path().is_file() {
            return (GateState::Unauthenticated, None);
        }
        match self.query_token() {
            Some(token) => (GateState::Authenticated, Some(token)),
            None => (GateState::Unauthenticated, None),
        }
    }

    /// Drives the gate to an authenticated state and returns the token.
    ///
    /// On success the tool directory is exported through the session, the
    /// autostart block is pinned and the git identity is materialised.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Download`] or [`RunnerError::Install`] when the
    /// tool cannot be provisioned, and [`RunnerError::AuthFault`] carrying
    /// the setup's exit code when no token is produced.
    pub fn ensure(&self, session: &mut SessionState) -> Result<AccessToken> {
        let (state, token) = self.probe();
        log::debug!("credential gate state: {state:?}");

        if let Some(token) = token {
            return self.finish(session, token);
        }
        if state == GateState::ToolAbsent {
            self.install_tool()?;
        }
        self.authenticate(session)
    }

    fn authenticate(&self, session: &mut SessionState) -> Result<AccessToken> {
        configure_best_effort(self.env, &self.config.git_identity);

        let tool = self.tool_path();
        let path = session.child_path(std::env::var("PATH").ok().as_deref());
        let options = RunOptions::default().with_env("PATH", path);
        let status = self
            .executor
            .run_interactive(tool.as_str(), &[SETUP], &options)?;

        if let Some(token) = self.query_token() {
            return self.finish(session, token);
        }

        self.reset_credentials()?;
        let code = if status.success() { 1 } else { exit_code(status) };
        Err(RunnerError::AuthFault {
            tool: TOOL_NAME,
            code,
        })
    }

    fn finish(&self, session: &mut SessionState, token: AccessToken) -> Result<AccessToken> {
        session.authenticate(token.clone(), self.tool_dir());
        self.pinner.pin(session, &self.script_path)?;
        configure_best_effort(self.env, &self.config.git_identity);
        log::info!("{TOOL_NAME} authenticated");
        Ok(token)
    }

    fn query_token(&self) -> Option<AccessToken> {
        let args: Vec<&str> = self
            .config
            .credential
            .token_args
            .iter()
            .map(String::as_str)
            .collect();
        let output = self.executor.run(self.tool_path().as_str(), &args).ok()?;
        if !output.status.success() {
            return None;
        }
        AccessToken::new(&String::from_utf8_lossy(&output.stdout))
    }

    fn install_tool(&self) -> Result<()> {
        let url = self.config.credential.tool_url.as_str();
        let download_dir = self.env.home.join(&self.config.credential.download_dir);
        let binary = download_dir.join(TOOL_NAME);
        let download_error = |reason: String| RunnerError::Download {
            tool: TOOL_NAME,
            url: url.to_owned(),
            reason,
        };

        log::info!("downloading {TOOL_NAME} from {url}");
        std::fs::create_dir_all(&download_dir).map_err(|e| download_error(e.to_string()))?;
        self.http
            .download_to_file(url, binary.as_std_path())
            .map_err(|e| download_error(e.to_string()))?;
        make_executable(&binary).map_err(|e| RunnerError::Install {
            tool: TOOL_NAME,
            message: format!("cannot mark {binary} executable: {e}"),
        })?;

        run_checked(self.executor, binary.as_str(), &[SELF_INSTALL], |message| {
            RunnerError::Install {
                tool: TOOL_NAME,
                message,
            }
        })?;
        Ok(())
    }
}

fn remove_if_present(path: &Utf8Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            log::info!("removed stale credentials at {path}");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(unix)]
fn make_executable(path: &Utf8Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Utf8Path) -> std::io::Result<()> {
    Ok(())
}
