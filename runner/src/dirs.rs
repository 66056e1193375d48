//! Directory resolution abstraction for platform-specific paths.
//!
//! Production code resolves directories through `directories-next`; tests
//! inject their own [`BaseDirs`] so nothing touches the real home directory.

use camino::Utf8PathBuf;

/// Resolves the base directories the runner works under.
pub trait BaseDirs {
    /// Returns the user's home directory.
    fn home_dir(&self) -> Option<Utf8PathBuf>;
}

/// Base directories of the current user, resolved from the platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBaseDirs;

impl BaseDirs for SystemBaseDirs {
    fn home_dir(&self) -> Option<Utf8PathBuf> {
        directories_next::BaseDirs::new()
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().to_path_buf()).ok())
    }
}

/// Fixed base directories, used when the home directory is already known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedBaseDirs {
    home: Utf8PathBuf,
}

impl FixedBaseDirs {
    /// Creates a resolver that always reports `home`.
    #[must_use]
    pub fn new(home: impl Into<Utf8PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl BaseDirs for FixedBaseDirs {
    fn home_dir(&self) -> Option<Utf8PathBuf> {
        Some(self.home.clone())
    }
}
