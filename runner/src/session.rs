//! Per-invocation session state.
//!
//! [`SessionState`] is rebuilt from the environment and filesystem probes at
//! the start of every run and threaded through the components explicitly. It
//! is never written to disk: durability comes from the side effects the
//! components leave behind (the installed tree, the pinned block, and the
//! credential file owned by `dt`).

use crate::autostart::{ShellKind, ShellProbe};
use crate::env::RunnerEnv;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;

/// An access token issued by the credential tool.
///
/// The token is held in memory only; `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a token, returning `None` for blank input.
    ///
    /// # Examples
    ///
    /// ```
    /// use imcv2_sdk_runner::session::AccessToken;
    ///
    /// assert!(AccessToken::new("  \n").is_none());
    /// let token = AccessToken::new("ghp_abc\n").expect("token");
    /// assert_eq!(token.expose(), "ghp_abc");
    /// assert_eq!(format!("{token:?}"), "AccessToken(<redacted>)");
    /// ```
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_owned()))
    }

    /// Returns the token text.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// State shared by the components during one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    home: Utf8PathBuf,
    shell: ShellKind,
    install_path: Option<Utf8PathBuf>,
    token: Option<AccessToken>,
    tool_dir: Option<Utf8PathBuf>,
}

impl SessionState {
    /// Creates a session with nothing installed and no token.
    #[must_use]
    pub fn new(home: Utf8PathBuf, shell: ShellKind) -> Self {
        Self {
            home,
            shell,
            install_path: None,
            token: None,
            tool_dir: None,
        }
    }

    /// Builds the session from the environment snapshot and a shell probe.
    ///
    /// A prior install path is only trusted when the directory still exists.
    #[must_use]
    pub fn probe(env: &RunnerEnv, shell_probe: &dyn ShellProbe) -> Self {
        let mut session = Self::new(env.home.clone(), shell_probe.detect());
        session.install_path = env
            .install_path
            .clone()
            .filter(|path| path.is_absolute() && path.is_dir());
        session
    }

    /// Returns the user's home directory.
    #[must_use]
    pub fn home(&self) -> &Utf8Path {
        &self.home
    }

    /// Returns the detected shell.
    #[must_use]
    pub fn shell(&self) -> &ShellKind {
        &self.shell
    }

    /// Returns the recorded install path, if any.
    #[must_use]
    pub fn install_path(&self) -> Option<&Utf8Path> {
        self.install_path.as_deref()
    }

    /// Records a completed installation.
    pub fn record_install(&mut self, path: Utf8PathBuf) {
        self.install_path = Some(path);
    }

    /// Forgets the installation, e.g. after an uninstall.
    pub fn clear_install(&mut self) {
        self.install_path = None;
    }

    /// Returns the access token, once the credential gate has passed.
    #[must_use]
    pub fn token(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }

    /// Stores the access token and exports the tool directory for children.
    pub fn authenticate(&mut self, token: AccessToken, tool_dir: Utf8PathBuf) {
        self.token = Some(token);
        self.tool_dir = Some(tool_dir);
    }

    /// Returns the `PATH` value for child processes.
    ///
    /// The credential tool's directory is prepended once the gate has passed.
    #[must_use]
    pub fn child_path(&self, inherited: Option<&str>) -> String {
        let inherited = inherited.filter(|value| !value.is_empty());
        match (&self.tool_dir, inherited) {
            (Some(dir), Some(rest)) => format!("{dir}:{rest}"),
            (Some(dir), None) => dir.to_string(),
            (None, Some(rest)) => rest.to_owned(),
            (None, None) => String::new(),
        }
    }
}
