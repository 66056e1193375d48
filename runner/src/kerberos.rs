//! Kerberos ticket setup.

use crate::error::{RunnerError, Result};
use crate::exec::{CommandExecutor, RunOptions, command_succeeds, exit_code, run_checked};
use std::fmt;

/// Realm used when none is given.
pub const DEFAULT_REALM: &str = "CLIENTS.INTEL.COM";

const PACKAGES: [&str; 2] = ["krb5-config", "krb5-user"];

/// Credentials for `kinit`.
#[derive(Clone, PartialEq, Eq)]
pub struct KerberosRequest {
    user: String,
    password: String,
    realm: String,
}

impl KerberosRequest {
    /// Builds a request, upper-casing the realm and applying the default.
    ///
    /// # Examples
    ///
    /// ```
    /// use imcv2_sdk_runner::kerberos::KerberosRequest;
    ///
    /// let request = KerberosRequest::new("jdoe", "secret", Some("corp.example.com"));
    /// assert_eq!(request.principal(), "jdoe@CORP.EXAMPLE.COM");
    ///
    /// let request = KerberosRequest::new("jdoe", "secret", None);
    /// assert_eq!(request.principal(), "jdoe@CLIENTS.INTEL.COM");
    /// ```
    #[must_use]
    pub fn new(user: impl Into<String>, password: impl Into<String>, realm: Option<&str>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            realm: realm.unwrap_or(DEFAULT_REALM).to_uppercase(),
        }
    }

    /// Returns `user@REALM`.
    #[must_use]
    pub fn principal(&self) -> String {
        format!("{}@{}", self.user, self.realm)
    }
}

impl fmt::Debug for KerberosRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KerberosRequest")
            .field("user", &self.user)
            .field("realm", &self.realm)
            .finish_non_exhaustive()
    }
}

/// Installs the Kerberos client if needed and obtains a ticket.
///
/// # Errors
///
/// Returns [`RunnerError::Install`] when the packages cannot be installed and
/// [`RunnerError::AuthFault`] carrying `kinit`'s exit code when the ticket
/// request fails.
pub fn set_kerberos(executor: &dyn CommandExecutor, request: &KerberosRequest) -> Result<()> {
    ensure_client(executor)?;

    let principal = request.principal();
    let options = RunOptions::default().with_stdin(format!("{}\n", request.password));
    let status = executor.run_interactive("kinit", &[principal.as_str()], &options)?;
    if !status.success() {
        return Err(RunnerError::AuthFault {
            tool: "kinit",
            code: exit_code(status),
        });
    }
    log::info!("kerberos ticket obtained for {principal}");
    Ok(())
}

fn ensure_client(executor: &dyn CommandExecutor) -> Result<()> {
    if command_succeeds(executor, "dpkg", &["-s", "krb5-user"]) {
        return Ok(());
    }
    log::info!("installing {}", PACKAGES.join(" "));
    let mut args = vec![
        "env",
        "DEBIAN_FRONTEND=noninteractive",
        "apt-get",
        "install",
        "-y",
    ];
    args.extend(PACKAGES);
    run_checked(executor, "sudo", &args, |message| RunnerError::Install {
        tool: "krb5-user",
        message,
    })?;
    Ok(())
}
