//! Subprocess execution for the external collaborators.
//!
//! The runner drives `dt`, `git`, `bash`, `sudo`, and the WSL interop binaries
//! as opaque subprocesses. All of them go through [`CommandExecutor`] so tests
//! can substitute a stub and assert on the exact invocation sequence.

use crate::error::{RunnerError, Result};
use camino::Utf8PathBuf;
use std::io::{ErrorKind, Write};
use std::process::{Command, ExitStatus, Output, Stdio};

/// Options for an interactive invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Working directory for the child, if different from the runner's.
    pub cwd: Option<Utf8PathBuf>,
    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,
    /// Data written to the child's stdin; stdin is inherited when `None`.
    pub stdin: Option<String>,
}

impl RunOptions {
    /// Sets the working directory.
    #[must_use]
    pub fn in_dir(mut self, cwd: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Feeds `input` to the child's stdin.
    #[must_use]
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs a command with arguments and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns any I/O errors encountered while spawning or running the command.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use imcv2_sdk_runner::exec::{CommandExecutor, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor;
    /// let output = executor.run("git", &["--version"])?;
    /// assert!(output.status.success());
    /// # Ok::<(), imcv2_sdk_runner::error::RunnerError>(())
    /// ```
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output>;

    /// Runs a command attached to the user's terminal.
    ///
    /// Stdout and stderr are inherited so interactive prompts reach the user.
    ///
    /// # Errors
    ///
    /// Returns any I/O errors encountered while spawning or running the command.
    fn run_interactive(&self, cmd: &str, args: &[&str], options: &RunOptions)
    -> Result<ExitStatus>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        log::debug!("running {cmd} {}", args.join(" "));
        Command::new(cmd)
            .args(args)
            .output()
            .map_err(RunnerError::from)
    }

    fn run_interactive(
        &self,
        cmd: &str,
        args: &[&str],
        options: &RunOptions,
    ) -> Result<ExitStatus> {
        log::debug!("running {cmd} {} (interactive)", args.join(" "));
        let mut command = Command::new(cmd);
        command.args(args);
        if let Some(dir) = &options.cwd {
            command.current_dir(dir.as_std_path());
        }
        for (key, value) in &options.env {
            command.env(key, value);
        }

        let Some(input) = &options.stdin else {
            return command.status().map_err(RunnerError::from);
        };

        command.stdin(Stdio::piped());
        let mut child = command.spawn()?;
        // The handle is dropped inside the closure so the child sees EOF.
        let written = child
            .stdin
            .take()
            .map_or(Ok(()), |mut stdin| stdin.write_all(input.as_bytes()));
        let status = child.wait()?;
        match written {
            Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                log::debug!("{cmd} exited before reading all of its input");
            }
            Err(err) => return Err(err.into()),
            Ok(()) => {}
        }
        Ok(status)
    }
}

/// Returns the exit code of `status`, treating signal termination as `1`.
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// Returns true if the given command executes successfully.
pub fn command_succeeds(executor: &dyn CommandExecutor, cmd: &str, args: &[&str]) -> bool {
    executor.run(cmd, args).is_ok_and(|o| o.status.success())
}

/// Runs a captured command, converting a non-zero exit into a message built
/// from its stderr.
///
/// # Errors
///
/// Returns the spawn error, or `Err(message)` wrapped by `on_failure`.
pub fn run_checked(
    executor: &dyn CommandExecutor,
    cmd: &str,
    args: &[&str],
    on_failure: impl FnOnce(String) -> RunnerError,
) -> Result<Output> {
    let output = executor.run(cmd, args)?;
    if output.status.success() {
        return Ok(output);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = match stderr.trim() {
        "" => format!("{cmd} exited with code {}", exit_code(output.status)),
        trimmed => trimmed.to_owned(),
    };
    Err(on_failure(message))
}
