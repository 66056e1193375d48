//! Snapshot of the environment inputs the runner consumes.
//!
//! The environment is read exactly once per invocation. Components receive the
//! resulting [`RunnerEnv`] by reference instead of consulting process-wide
//! variables themselves.

use crate::dirs::BaseDirs;
use crate::error::{RunnerError, Result};
use camino::Utf8PathBuf;

/// Proxy variables, in order of preference.
const PROXY_VARS: [&str; 4] = ["http_proxy", "HTTP_PROXY", "https_proxy", "HTTPS_PROXY"];

/// Prior install path exported by earlier sessions.
pub const INSTALL_PATH_VAR: &str = "IMCV2_INSTALL_PATH";
/// Display name used for the git identity.
pub const FULL_NAME_VAR: &str = "IMCV2_FULL_NAME";
/// Email used for the git identity.
pub const EMAIL_VAR: &str = "IMCV2_EMAIL";
/// Distribution name set by WSL inside every instance.
pub const DISTRO_VAR: &str = "WSL_DISTRO_NAME";

/// Environment inputs captured at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerEnv {
    /// The user's home directory.
    pub home: Utf8PathBuf,
    /// The invoking user's login name.
    pub user: String,
    /// Proxy server URL, if one is configured.
    pub proxy: Option<String>,
    /// Install path recorded by a previous session.
    pub install_path: Option<Utf8PathBuf>,
    /// Display name for the git identity.
    pub full_name: Option<String>,
    /// Email for the git identity.
    pub email: Option<String>,
    /// WSL distribution hosting this session, if any.
    pub distro: Option<String>,
}

impl RunnerEnv {
    /// Captures the current process environment.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] when no home directory can be found.
    pub fn from_process(dirs: &dyn BaseDirs) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), dirs)
    }

    /// Builds the snapshot from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset. `HOME` wins over the platform
    /// resolver so a session started with a custom `HOME` stays consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] when no home directory can be found.
    ///
    /// # Examples
    ///
    /// ```
    /// use imcv2_sdk_runner::dirs::FixedBaseDirs;
    /// use imcv2_sdk_runner::env::RunnerEnv;
    ///
    /// let env = RunnerEnv::from_lookup(
    ///     |key| (key == "https_proxy").then(|| "http://proxy:911".to_owned()),
    ///     &FixedBaseDirs::new("/home/dev"),
    /// )?;
    /// assert_eq!(env.home.as_str(), "/home/dev");
    /// assert_eq!(env.user, "dev");
    /// assert_eq!(env.proxy.as_deref(), Some("http://proxy:911"));
    /// # Ok::<(), imcv2_sdk_runner::error::RunnerError>(())
    /// ```
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        dirs: &dyn BaseDirs,
    ) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let home = var("HOME")
            .map(Utf8PathBuf::from)
            .or_else(|| dirs.home_dir())
            .ok_or_else(|| RunnerError::Config {
                reason: "could not determine the home directory".to_owned(),
            })?;

        let user = var("USER")
            .or_else(|| home.file_name().map(str::to_owned))
            .ok_or_else(|| RunnerError::Config {
                reason: "could not determine the user name".to_owned(),
            })?;

        Ok(Self {
            proxy: PROXY_VARS.iter().find_map(|key| var(key)),
            install_path: var(INSTALL_PATH_VAR).map(Utf8PathBuf::from),
            full_name: var(FULL_NAME_VAR),
            email: var(EMAIL_VAR),
            distro: var(DISTRO_VAR),
            home,
            user,
        })
    }
}
