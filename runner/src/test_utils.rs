//! Shared test utilities for the runner crate.

use crate::error::Result;
use crate::exec::{CommandExecutor, RunOptions};
use crate::restart::SessionRestarter;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::process::{ExitStatus, Output};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code as u32)
}

/// Creates a successful command `Output` with empty stdout and stderr.
pub fn success_output() -> Output {
    stdout_output("")
}

/// Creates a successful command `Output` with the given stdout.
pub fn stdout_output(stdout: &str) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
pub fn failure_output(stderr: &str) -> Output {
    exit_output(1, stderr)
}

/// Creates a command `Output` with an explicit exit code.
pub fn exit_output(code: i32, stderr: &str) -> Output {
    Output {
        status: exit_status(code),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The command to execute (e.g., "git").
    pub cmd: String,
    /// The arguments to pass to the command.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: Result<Output>,
}

impl ExpectedCall {
    /// Creates an expectation for `cmd` with `args`.
    pub fn new(cmd: impl Into<String>, args: &[&str], result: Result<Output>) -> Self {
        Self {
            cmd: cmd.into(),
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            result,
        }
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects. Both
/// captured and interactive invocations consume the same queue; interactive
/// ones return only the status of the queued output.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
    interactive: RefCell<Vec<RunOptions>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
            interactive: RefCell::new(Vec::new()),
        }
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        let remaining = self.expected.borrow();
        assert!(
            remaining.is_empty(),
            "expected no further command invocations, {} remain: {:?}",
            remaining.len(),
            remaining.iter().map(|call| call.cmd.as_str()).collect::<Vec<_>>()
        );
    }

    /// Returns the options passed to each interactive invocation so far.
    pub fn interactive_options(&self) -> Vec<RunOptions> {
        self.interactive.borrow().clone()
    }

    fn next_call(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        let mut expected = self.expected.borrow_mut();
        let call = expected
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected command invocation: {cmd} {args:?}"));

        assert_eq!(call.cmd, cmd);
        assert_eq!(call.args, args);

        call.result
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        self.next_call(cmd, args)
    }

    fn run_interactive(
        &self,
        cmd: &str,
        args: &[&str],
        options: &RunOptions,
    ) -> Result<ExitStatus> {
        self.interactive.borrow_mut().push(options.clone());
        self.next_call(cmd, args).map(|output| output.status)
    }
}

/// A `SessionRestarter` that counts restart requests.
#[derive(Debug, Default)]
pub struct RecordingRestarter {
    calls: Cell<usize>,
}

impl RecordingRestarter {
    /// Returns how many times a restart was requested.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl SessionRestarter for RecordingRestarter {
    fn restart(&self) -> Result<()> {
        self.calls.set(self.calls.get() + 1);
        Ok(())
    }
}
