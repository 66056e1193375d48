//! Runner configuration backed by an optional TOML file.
//!
//! The runner keeps its locations and URLs in `~/.imcv2/runner.toml`, grouped
//! by component. Every table and key is optional: values are deserialised
//! when present and fall back to the built-in defaults otherwise, so a fresh
//! instance works without any file at all. Relative paths are resolved
//! against the user's home directory.

use crate::error::{RunnerError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

/// Location of the configuration file, relative to the home directory.
pub const CONFIG_FILE: &str = ".imcv2/runner.toml";

/// Complete runner configuration.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Settings for the `dt` credential gate.
    pub credential: CredentialConfig,
    /// Settings for fetching and running the SDK bootstrap script.
    pub bootstrap: BootstrapConfig,
    /// Settings for split-archive assembly.
    pub archive: ArchiveConfig,
    /// Settings for the autostart block.
    pub autostart: AutostartConfig,
    /// Settings for the git identity template.
    pub git_identity: GitIdentityConfig,
}

impl RunnerConfig {
    /// Loads `~/.imcv2/runner.toml`, or the defaults if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] when the file exists but cannot be read
    /// or parsed.
    pub fn load(home: &Utf8Path) -> Result<Self> {
        Self::load_from(&home.join(CONFIG_FILE))
    }

    /// Loads the configuration from `path`, or the defaults if it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] when the file exists but cannot be read
    /// or parsed.
    pub fn load_from(path: &Utf8Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no configuration at {path}, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| RunnerError::Config {
            reason: format!("failed to read {path}: {e}"),
        })?;
        Self::from_toml(&contents).map_err(|e| RunnerError::Config {
            reason: format!("invalid {path}: {e}"),
        })
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the TOML deserialisation error.
    ///
    /// # Examples
    ///
    /// ```
    /// use imcv2_sdk_runner::config::RunnerConfig;
    ///
    /// let config = RunnerConfig::from_toml("[bootstrap]\nbranch = \"next\"\n")?;
    /// assert_eq!(config.bootstrap.branch, "next");
    /// assert_eq!(config.archive.reference, "main");
    /// # Ok::<(), toml::de::Error>(())
    /// ```
    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

/// Settings for the external access-token tool.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialConfig {
    /// Direct download location of the tool binary.
    pub tool_url: String,
    /// Where the downloaded binary is stored before self-installation.
    pub download_dir: Utf8PathBuf,
    /// Directory the tool installs itself into.
    pub tool_dir: Utf8PathBuf,
    /// The tool's credential file.
    pub credential_file: Utf8PathBuf,
    /// Arguments that make the tool print its access token.
    pub token_args: Vec<String>,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            tool_url: "https://gfx-assets.intel.com/artifactory/gfx-build-assets/build-tools/devtool-go/latest/artifacts/linux64/dt".to_owned(),
            download_dir: Utf8PathBuf::from("downloads"),
            tool_dir: Utf8PathBuf::from(".local/bin"),
            credential_file: Utf8PathBuf::from(".config/dt/config.yaml"),
            token_args: vec!["github".to_owned(), "print-token".to_owned()],
        }
    }
}

/// Settings for the SDK bootstrap script.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    /// Location of the bootstrap script; requires the access token.
    pub url: String,
    /// Branch argument passed to the script.
    pub branch: String,
    /// Install destination used by the full sequence.
    pub install_path: Utf8PathBuf,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            url: "https://raw.githubusercontent.com/intel-innersource/firmware.ethernet.imcv2/main/scripts/imcv2_install.sh".to_owned(),
            branch: "main".to_owned(),
            install_path: Utf8PathBuf::from("projects/imcv2"),
        }
    }
}

/// Settings for split-archive assembly.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Fragment source repository, relative to the install path.
    pub source_dir: Utf8PathBuf,
    /// Fragment directory, relative to the source repository.
    pub fragment_dir: Utf8PathBuf,
    /// Reference line checked out before pulling.
    pub reference: String,
    /// Name of the assembled archive inside the source repository.
    pub archive_name: String,
    /// Extraction root, relative to the source repository.
    pub extract_dir: Utf8PathBuf,
    /// Absolute system mount point for the extracted tree.
    pub mount_path: Utf8PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            source_dir: Utf8PathBuf::from("simics"),
            fragment_dir: Utf8PathBuf::from("fragments"),
            reference: "main".to_owned(),
            archive_name: "simics.tar.gz".to_owned(),
            extract_dir: Utf8PathBuf::from("extracted"),
            mount_path: Utf8PathBuf::from("/opt/simics/install"),
        }
    }
}

/// Settings for the autostart block.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AutostartConfig {
    /// Marker line written above the runner invocation.
    pub marker: String,
}

impl Default for AutostartConfig {
    fn default() -> Self {
        Self {
            marker: "# IMCv2 SDK runner (keep these lines last)".to_owned(),
        }
    }
}

/// Settings for the git identity template.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GitIdentityConfig {
    /// Single-use template, relative to the home directory.
    pub template: Utf8PathBuf,
    /// Generated identity file, relative to the home directory.
    pub output: Utf8PathBuf,
}

impl Default for GitIdentityConfig {
    fn default() -> Self {
        Self {
            template: Utf8PathBuf::from(".imcv2/imcv2_git_config.template"),
            output: Utf8PathBuf::from(".gitconfig"),
        }
    }
}
