//! Error types for the IMCv2 SDK runner.
//!
//! Every failure the runner can report is a variant of [`RunnerError`]. The
//! variants double as the exit-status contract with the pinned autostart
//! loop: [`RunnerError::exit_code`] either returns `1` for generic failures
//! or passes through the status reported by the failing sub-step.

use crate::archive::AssemblyStep;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur while provisioning the session.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The destination lies outside the user's home directory.
    #[error("refusing to touch {path}: destination must be {home} or a path beneath it")]
    PathSafety {
        /// The rejected destination.
        path: Utf8PathBuf,
        /// The home directory the destination was checked against.
        home: Utf8PathBuf,
    },

    /// A required precondition is missing from the environment or config.
    #[error("configuration error: {reason}")]
    Config {
        /// Description of the missing or invalid setting.
        reason: String,
    },

    /// A generated file could not be written.
    #[error("failed to generate {path}: {reason}")]
    Generation {
        /// Path of the file being generated.
        path: Utf8PathBuf,
        /// Description of the underlying failure.
        reason: String,
    },

    /// The SDK is already installed and `force` was not requested.
    #[error("SDK already installed at {path}; use force to reinstall")]
    AlreadyInstalled {
        /// The existing installation.
        path: Utf8PathBuf,
    },

    /// Downloading an external tool failed.
    #[error("failed to download {tool} from {url}: {reason}")]
    Download {
        /// Name of the tool being downloaded.
        tool: &'static str,
        /// Location the tool was fetched from.
        url: String,
        /// Description of the failure.
        reason: String,
    },

    /// Installing a tool or package failed.
    #[error("failed to install {tool}: {message}")]
    Install {
        /// Name of the tool or package.
        tool: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// The authentication tool's setup did not yield a usable token.
    #[error("{tool} authentication failed with exit code {code}")]
    AuthFault {
        /// Name of the tool whose setup failed.
        tool: &'static str,
        /// The tool's own exit code.
        code: i32,
    },

    /// An authenticated fetch was answered with a non-success status.
    ///
    /// Treated as a stale credential: the artifact is deleted and the session
    /// restarted so the next session re-authenticates.
    #[error("authenticated fetch of {url} returned HTTP {status}; credentials reset")]
    AuthStatus {
        /// The URL that was requested.
        url: String,
        /// The HTTP status code returned by the server.
        status: u16,
    },

    /// A request failed before any HTTP status was received.
    #[error("network error fetching {url}: {reason}")]
    Network {
        /// The URL that was requested.
        url: String,
        /// Description of the transport failure.
        reason: String,
    },

    /// The fetched bootstrap script exited unsuccessfully.
    #[error("bootstrap script failed with exit code {code}")]
    BootstrapFailed {
        /// The script's exit code.
        code: i32,
    },

    /// A step of the split-archive assembly failed.
    #[error("archive assembly failed at step '{step}': {reason}")]
    StepFailure {
        /// The step that failed.
        step: AssemblyStep,
        /// Description of the failure.
        reason: String,
    },

    /// The hosting session could not be torn down.
    #[error("session restart failed: {message}")]
    Restart {
        /// Description of the failure.
        message: String,
    },

    /// The active shell has no known startup file.
    #[error("unsupported shell '{shell}'; only bash and zsh can be pinned")]
    UnsupportedShell {
        /// Name of the detected shell.
        shell: String,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Returns the process exit code for this error.
    ///
    /// Sub-step statuses pass through unchanged; the operating system keeps
    /// only the low eight bits.
    ///
    /// # Examples
    ///
    /// ```
    /// use imcv2_sdk_runner::error::RunnerError;
    ///
    /// let err = RunnerError::AuthStatus {
    ///     url: "https://example.test/bootstrap.sh".to_owned(),
    ///     status: 403,
    /// };
    /// assert_eq!(err.exit_code(), 403);
    ///
    /// let err = RunnerError::Config { reason: "no proxy".to_owned() };
    /// assert_eq!(err.exit_code(), 1);
    /// ```
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AuthStatus { status, .. } => i32::from(*status),
            Self::AuthFault { code, .. } | Self::BootstrapFailed { code } => nonzero(*code),
            _ => 1,
        }
    }
}

/// Keeps a failing status from ever being reported as success.
const fn nonzero(code: i32) -> i32 {
    if code == 0 { 1 } else { code }
}

/// Result type alias using [`RunnerError`].
pub type Result<T> = std::result::Result<T, RunnerError>;
