//! IMCv2 SDK runner library.
//!
//! This crate provisions and self-heals an unattended development session:
//! it keeps an access token available, installs the SDK tree, assembles the
//! simulator archive from version-controlled fragments, and pins itself to
//! the end of the login shell's startup file so that every new session
//! retries until the installation converges. It is used by the
//! `imcv2-sdk-runner` binary and can be consumed programmatically for testing.
//!
//! # Modules
//!
//! - [`archive`] - Split-archive assembly and relocation
//! - [`autostart`] - Shell detection and autostart block pinning
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Optional TOML configuration with built-in defaults
//! - [`credential`] - Credential gate around the `dt` token tool
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`env`] - Snapshot of the environment inputs
//! - [`error`] - Error taxonomy and exit-code mapping
//! - [`exec`] - Subprocess execution abstraction
//! - [`git_identity`] - Git identity template materialisation
//! - [`http`] - HTTP transport for the bootstrap script and tool download
//! - [`installer`] - SDK install and uninstall
//! - [`kerberos`] - Kerberos client setup and ticket acquisition
//! - [`launch`] - Helper launcher with Windows path translation
//! - [`restart`] - Session restart as the universal recovery action
//! - [`sequence`] - The full provisioning sequence
//! - [`session`] - Per-invocation session state

pub mod archive;
pub mod autostart;
pub mod cli;
pub mod config;
pub mod credential;
pub mod dirs;
pub mod env;
pub mod error;
pub mod exec;
pub mod git_identity;
pub mod http;
pub mod installer;
pub mod kerberos;
pub mod launch;
pub mod restart;
pub mod sequence;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
