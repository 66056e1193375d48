//! The full provisioning sequence run when no one-shot flag is given.
//!
//! Gate, pin, install (which chains into assembly), pin again, then restart
//! so the new session picks up the installed tree. Every failure exits with a
//! distinguishing status and the pinned block retries on the next session.

use crate::autostart::Pinner;
use crate::credential::CredentialGate;
use crate::error::{RunnerError, Result};
use crate::installer::{InstallationTarget, Installer};
use crate::restart::SessionRestarter;
use crate::session::SessionState;
use camino::{Utf8Path, Utf8PathBuf};
use std::io::Write;

/// How a successful sequence ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// A fresh install completed and a restart was requested.
    Installed {
        /// The install destination.
        path: Utf8PathBuf,
    },
    /// The SDK was already installed; nothing left to do.
    SteadyState {
        /// The existing installation.
        path: Utf8PathBuf,
    },
}

/// Orchestrates the full sequence.
pub struct Sequence<'a> {
    gate: &'a CredentialGate<'a>,
    installer: &'a Installer<'a>,
    restarter: &'a dyn SessionRestarter,
    pinner: Pinner,
    script_path: Utf8PathBuf,
}

impl<'a> Sequence<'a> {
    /// Creates the sequence.
    #[must_use]
    pub fn new(
        gate: &'a CredentialGate<'a>,
        installer: &'a Installer<'a>,
        restarter: &'a dyn SessionRestarter,
        pinner: Pinner,
        script_path: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            gate,
            installer,
            restarter,
            pinner,
            script_path: script_path.into(),
        }
    }

    /// Runs the sequence for `destination`.
    ///
    /// The completion notice goes to `console` before the restart is
    /// requested.
    ///
    /// # Errors
    ///
    /// Propagates the first failing component's error; an existing install
    /// is not an error.
    pub fn run(
        &self,
        session: &mut SessionState,
        destination: &Utf8Path,
        console: &mut dyn Write,
    ) -> Result<SequenceOutcome> {
        self.gate.ensure(session)?;
        self.pinner.pin(session, &self.script_path)?;

        let target = InstallationTarget::install(destination, false);
        match self.installer.operate(session, &target) {
            Ok(_) => {
                self.pinner.pin(session, &self.script_path)?;
                if writeln!(console, "IMCv2 SDK installed at {destination}; restarting.").is_err() {
                    log::debug!("could not write the completion notice");
                }
                self.restarter.restart()?;
                Ok(SequenceOutcome::Installed {
                    path: destination.to_path_buf(),
                })
            }
            Err(RunnerError::AlreadyInstalled { path }) => {
                log::info!("SDK already installed at {path}");
                session.record_install(path.clone());
                self.pinner.pin(session, &self.script_path)?;
                Ok(SequenceOutcome::SteadyState { path })
            }
            Err(err) => Err(err),
        }
    }
}
