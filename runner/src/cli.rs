//! CLI argument definitions for the IMCv2 SDK runner.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use crate::kerberos::KerberosRequest;
use camino::Utf8PathBuf;
use clap::{ArgGroup, Parser};

/// Provision the IMCv2 SDK and keep this session self-healing.
#[derive(Parser, Debug, Default)]
#[command(name = "imcv2-sdk-runner")]
#[command(version, about)]
#[command(long_about = concat!(
    "Provision the IMCv2 SDK and keep this session self-healing.\n\n",
    "Without flags the runner authenticates through 'dt', pins itself to the ",
    "end of the shell startup file, installs the SDK, assembles the simulator ",
    "archive, and restarts the session. Any failure exits with a distinguishing ",
    "status; the pinned block retries on the next session.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Run the full provisioning sequence:\n",
    "    $ imcv2-sdk-runner\n\n",
    "  Install into a custom location:\n",
    "    $ imcv2-sdk-runner -i ~/work/imcv2\n\n",
    "  Rebuild the simulator tree, echoing each step:\n",
    "    $ imcv2-sdk-runner -g -v\n\n",
    "  Obtain a Kerberos ticket:\n",
    "    $ imcv2-sdk-runner -k jdoe 'p4ssw0rd'\n\n",
    "  Open a file with a Windows program:\n",
    "    $ imcv2-sdk-runner -l notepad.exe ~/notes.txt",
))]
#[command(group(
    ArgGroup::new("mode")
        .args(["pin_shell", "get_simics", "set_kerberos", "git_config", "launch", "restart_wsl"])
        .multiple(false)
))]
pub struct Cli {
    /// Pin the runner to the end of the shell startup file and exit.
    #[arg(short = 'p', long)]
    pub pin_shell: bool,

    /// Assemble and relocate the simulator archive, then exit.
    #[arg(short = 'g', long)]
    pub get_simics: bool,

    /// Echo each assembly step (with --get-simics).
    #[arg(short = 'v', long, requires = "get_simics")]
    pub verbose: bool,

    /// Install Kerberos and obtain a ticket: USER PASSWORD [REALM].
    #[arg(
        short = 'k',
        long,
        num_args = 2..=3,
        value_names = ["USER", "PASSWORD", "REALM"],
    )]
    pub set_kerberos: Option<Vec<String>>,

    /// Materialise the git identity template and exit.
    #[arg(short = 'c', long)]
    pub git_config: bool,

    /// SDK install destination [default: ~/projects/imcv2].
    #[arg(short = 'i', long, value_name = "PATH")]
    pub install_path: Option<Utf8PathBuf>,

    /// Run a helper command, translating paths for Windows executables.
    #[arg(
        short = 'l',
        long,
        num_args = 1..,
        allow_hyphen_values = true,
        value_names = ["COMMAND", "ARGS"],
    )]
    pub launch: Option<Vec<String>>,

    /// Restart the WSL session and exit.
    #[arg(short = 'r', long)]
    pub restart_wsl: bool,
}

/// The action selected on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Gate, pin, install, assemble, pin, restart.
    FullSequence,
    /// Pin only.
    PinShell,
    /// Assemble only.
    GetSimics {
        /// Echo each step.
        verbose: bool,
    },
    /// Kerberos setup.
    SetKerberos(KerberosRequest),
    /// Git identity only.
    GitConfig,
    /// Helper launch.
    Launch {
        /// The program to run.
        command: String,
        /// Its arguments.
        args: Vec<String>,
    },
    /// Restart only.
    RestartWsl,
}

impl Cli {
    /// Returns the selected mode; clap guarantees at most one is set.
    ///
    /// # Examples
    ///
    /// ```
    /// use clap::Parser;
    /// use imcv2_sdk_runner::cli::{Cli, Mode};
    ///
    /// let cli = Cli::parse_from(["imcv2-sdk-runner", "-g", "-v"]);
    /// assert_eq!(cli.mode(), Mode::GetSimics { verbose: true });
    /// assert_eq!(Cli::parse_from(["imcv2-sdk-runner"]).mode(), Mode::FullSequence);
    /// ```
    #[must_use]
    pub fn mode(&self) -> Mode {
        if self.pin_shell {
            return Mode::PinShell;
        }
        if self.get_simics {
            return Mode::GetSimics {
                verbose: self.verbose,
            };
        }
        if let Some(values) = &self.set_kerberos {
            return kerberos_mode(values);
        }
        if self.git_config {
            return Mode::GitConfig;
        }
        if let Some((command, args)) = self.launch.as_deref().and_then(<[String]>::split_first) {
            return Mode::Launch {
                command: command.clone(),
                args: args.to_vec(),
            };
        }
        if self.restart_wsl {
            return Mode::RestartWsl;
        }
        Mode::FullSequence
    }
}

fn kerberos_mode(values: &[String]) -> Mode {
    let mut values = values.iter();
    let user = values.next().map(String::as_str).unwrap_or_default();
    let password = values.next().map(String::as_str).unwrap_or_default();
    let realm = values.next().map(String::as_str);
    Mode::SetKerberos(KerberosRequest::new(user, password, realm))
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
