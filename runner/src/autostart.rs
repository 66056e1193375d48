//! Autostart pinning for the active login shell.
//!
//! The runner re-invokes itself on every new session through a two-line block
//! at the very end of the shell's startup file: a fixed marker line followed by
//! the absolute path of the runner. [`Pinner::pin`] converges the startup file
//! to exactly one such block, always last, whatever state the file was in.

use crate::error::{RunnerError, Result};
use crate::session::SessionState;
use camino::{Utf8Path, Utf8PathBuf};

/// Shell flavours the runner can detect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellKind {
    /// A POSIX login shell (`bash`), pinned through `~/.bashrc`.
    Bash,
    /// The interactive alternative shell (`zsh`), pinned through `~/.zshrc`.
    Zsh,
    /// Any other shell; it cannot be pinned.
    Unsupported(String),
}

impl ShellKind {
    /// Classifies a shell from a process name or executable path.
    ///
    /// Login shells report themselves with a leading dash (`-bash`), which is
    /// ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use imcv2_sdk_runner::autostart::ShellKind;
    ///
    /// assert_eq!(ShellKind::from_name("-bash"), ShellKind::Bash);
    /// assert_eq!(ShellKind::from_name("/usr/bin/zsh"), ShellKind::Zsh);
    /// assert!(!ShellKind::from_name("fish").is_supported());
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let trimmed = name.trim();
        let base = trimmed.rsplit('/').next().unwrap_or(trimmed);
        match base.trim_start_matches('-') {
            "bash" => Self::Bash,
            "zsh" => Self::Zsh,
            other => Self::Unsupported(other.to_owned()),
        }
    }

    /// Returns the startup file name relative to the home directory.
    #[must_use]
    pub fn startup_file(&self) -> Option<&'static str> {
        match self {
            Self::Bash => Some(".bashrc"),
            Self::Zsh => Some(".zshrc"),
            Self::Unsupported(_) => None,
        }
    }

    /// Returns true if the shell has a known startup file.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.startup_file().is_some()
    }

    fn name(&self) -> &str {
        match self {
            Self::Bash => "bash",
            Self::Zsh => "zsh",
            Self::Unsupported(name) => name,
        }
    }
}

/// Detects the shell hosting the runner.
#[cfg_attr(test, mockall::automock)]
pub trait ShellProbe {
    /// Returns the active shell kind.
    fn detect(&self) -> ShellKind;
}

/// Detects the shell from the parent process, falling back to the user's
/// registered login shell.
#[derive(Debug, Clone)]
pub struct ProcessShellProbe {
    user: String,
}

impl ProcessShellProbe {
    /// Creates a probe for `user`.
    #[must_use]
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }

    #[cfg(unix)]
    fn parent_shell() -> Option<ShellKind> {
        let ppid = std::os::unix::process::parent_id();
        let comm = std::fs::read_to_string(format!("/proc/{ppid}/comm")).ok()?;
        log::debug!("parent process {ppid} is {}", comm.trim());
        Some(ShellKind::from_name(&comm))
    }

    #[cfg(not(unix))]
    fn parent_shell() -> Option<ShellKind> {
        None
    }

    fn login_shell(&self) -> Option<ShellKind> {
        let passwd = std::fs::read_to_string("/etc/passwd").ok();
        let registered = passwd.as_deref().and_then(|text| login_shell_of(text, &self.user));
        registered
            .map(str::to_owned)
            .or_else(|| std::env::var("SHELL").ok())
            .map(|shell| ShellKind::from_name(&shell))
    }
}

impl ShellProbe for ProcessShellProbe {
    fn detect(&self) -> ShellKind {
        let parent = Self::parent_shell();
        if let Some(kind) = parent.as_ref().filter(|kind| kind.is_supported()) {
            return kind.clone();
        }
        self.login_shell()
            .or(parent)
            .unwrap_or_else(|| ShellKind::Unsupported("unknown".to_owned()))
    }
}

/// Returns the login shell registered for `user` in passwd-formatted text.
fn login_shell_of<'a>(passwd: &'a str, user: &str) -> Option<&'a str> {
    passwd
        .lines()
        .filter(|line| line.split(':').next() == Some(user))
        .find_map(|line| line.rsplit(':').next())
        .filter(|shell| !shell.is_empty())
}

/// The two-line unit that re-invokes the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutostartBlock {
    marker: String,
    script_path: Utf8PathBuf,
}

impl AutostartBlock {
    /// Creates a block for `script_path` under `marker`.
    #[must_use]
    pub fn new(marker: impl Into<String>, script_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            marker: marker.into(),
            script_path: script_path.into(),
        }
    }

    /// Returns the marker line.
    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Returns the script path line.
    #[must_use]
    pub fn script_line(&self) -> &str {
        self.script_path.as_str()
    }

    /// Returns true if `line` invokes this block's script, with or without
    /// arguments and under any directory.
    fn invokes_script(&self, line: &str) -> bool {
        let Some(command) = line.split_whitespace().next() else {
            return false;
        };
        let command = command.trim_matches(|c| c == '"' || c == '\'');
        Utf8Path::new(command).file_name().is_some()
            && Utf8Path::new(command).file_name() == self.script_path.file_name()
    }
}

/// A startup file held as an ordered list of lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupFile {
    lines: Vec<String>,
}

impl StartupFile {
    /// Parses startup file text. `\r\n` terminators are normalised.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_owned).collect(),
        }
    }

    /// Renders the file with a trailing newline.
    #[must_use]
    pub fn render(&self) -> String {
        if self.lines.is_empty() {
            return String::new();
        }
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }

    /// Returns the lines of the file.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns true if the final two lines are exactly `block`.
    #[must_use]
    pub fn ends_with(&self, block: &AutostartBlock) -> bool {
        match self.lines.as_slice() {
            [.., marker, script] => {
                marker.trim_end() == block.marker() && script.trim_end() == block.script_line()
            }
            _ => false,
        }
    }

    /// Removes every occurrence of `block`, returning how many were removed.
    ///
    /// A block spans the marker line through the next non-blank line that
    /// invokes the script. A marker without such a line is removed on its own,
    /// as is a bare copy of the canonical script line. The blank separator line
    /// in front of a removed block goes with it.
    pub fn remove_blocks(&mut self, block: &AutostartBlock) -> usize {
        let spans = self.block_spans(block);
        let mut kept: Vec<String> = Vec::with_capacity(self.lines.len());
        let mut next = 0;

        for &(start, end) in &spans {
            kept.extend_from_slice(self.lines.get(next..start).unwrap_or_default());
            if kept.last().is_some_and(|prev| prev.trim().is_empty()) {
                kept.pop();
            }
            next = end + 1;
        }
        kept.extend_from_slice(self.lines.get(next..).unwrap_or_default());

        self.lines = kept;
        spans.len()
    }

    /// Returns the inclusive line ranges occupied by occurrences of `block`.
    fn block_spans(&self, block: &AutostartBlock) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut index = 0;

        while let Some(line) = self.lines.get(index) {
            let trimmed = line.trim();
            let end = if trimmed == block.marker() {
                Some(self.block_end(index, block))
            } else if trimmed == block.script_line() {
                Some(index)
            } else {
                None
            };

            match end {
                Some(end) => {
                    spans.push((index, end));
                    index = end + 1;
                }
                None => index += 1,
            }
        }
        spans
    }

    /// Returns the index of the last line of the block starting at `marker`.
    fn block_end(&self, marker: usize, block: &AutostartBlock) -> usize {
        self.lines
            .iter()
            .enumerate()
            .skip(marker + 1)
            .find(|(_, line)| !line.trim().is_empty())
            .filter(|(_, line)| block.invokes_script(line))
            .map_or(marker, |(index, _)| index)
    }

    /// Appends a blank separator and `block` after the last non-blank line.
    pub fn append_block(&mut self, block: &AutostartBlock) {
        while self.lines.last().is_some_and(|line| line.trim().is_empty()) {
            self.lines.pop();
        }
        self.lines.push(String::new());
        self.lines.push(block.marker().to_owned());
        self.lines.push(block.script_line().to_owned());
    }

    /// Converges the file to exactly one trailing `block`.
    ///
    /// Returns `None` if the file already ends with the block, otherwise the
    /// number of stale occurrences removed before appending.
    pub fn pin(&mut self, block: &AutostartBlock) -> Option<usize> {
        if self.ends_with(block) && self.block_spans(block).len() == 1 {
            return None;
        }
        let removed = self.remove_blocks(block);
        self.append_block(block);
        Some(removed)
    }

}

/// Result of a pin request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinOutcome {
    /// The startup file already ended with the block.
    Unchanged {
        /// The startup file.
        path: Utf8PathBuf,
    },
    /// The startup file was rewritten.
    Rewritten {
        /// The startup file.
        path: Utf8PathBuf,
        /// How many stale blocks were removed.
        removed: usize,
    },
}

/// Pins the runner's autostart block into the active shell's startup file.
#[derive(Debug, Clone)]
pub struct Pinner {
    marker: String,
}

impl Pinner {
    /// Creates a pinner writing `marker` above the script line.
    #[must_use]
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// Ensures the startup file of the session's shell ends with the block
    /// for `script_path`.
    ///
    /// A missing startup file is treated as empty and created.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::UnsupportedShell`] before touching any file when
    /// the shell has no known startup file, or an I/O error when the file
    /// cannot be read or written.
    pub fn pin(&self, session: &SessionState, script_path: &Utf8Path) -> Result<PinOutcome> {
        let name = session
            .shell()
            .startup_file()
            .ok_or_else(|| RunnerError::UnsupportedShell {
                shell: session.shell().name().to_owned(),
            })?;
        let path = session.home().join(name);
        let block = AutostartBlock::new(self.marker.as_str(), script_path);

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };

        let mut file = StartupFile::parse(&text);
        match file.pin(&block) {
            None => {
                log::debug!("{path} already ends with the autostart block");
                Ok(PinOutcome::Unchanged { path })
            }
            Some(removed) => {
                std::fs::write(&path, file.render())?;
                log::info!("pinned autostart block in {path} ({removed} stale block(s) removed)");
                Ok(PinOutcome::Rewritten { path, removed })
            }
        }
    }
}

/// Returns the absolute path of the running executable.
///
/// # Errors
///
/// Returns [`RunnerError::Config`] if the path cannot be determined or is not
/// valid UTF-8.
pub fn current_script_path() -> Result<Utf8PathBuf> {
    let exe = std::env::current_exe()?;
    Utf8PathBuf::from_path_buf(exe).map_err(|path| RunnerError::Config {
        reason: format!("runner path {} is not valid UTF-8", path.display()),
    })
}
