//! Helper launcher with Windows path translation.
//!
//! Inside WSL, Windows executables cannot resolve Linux paths. When the
//! launched command is a `.exe`, absolute path arguments are rewritten to
//! their Windows form: drive mounts map back to drive letters and every
//! other path goes through the `\\wsl$` share of the distribution.

use crate::error::Result;
use crate::exec::{CommandExecutor, RunOptions, exit_code};

/// Returns true when `command` names a Windows executable.
#[must_use]
pub fn is_windows_executable(command: &str) -> bool {
    command
        .rsplit('/')
        .next()
        .is_some_and(|name| name.to_ascii_lowercase().ends_with(".exe"))
}

/// Translates an absolute Linux path into its Windows form.
///
/// Arguments that are not absolute paths are returned unchanged, as are
/// non-mount paths when the distribution is unknown.
///
/// # Examples
///
/// ```
/// use imcv2_sdk_runner::launch::to_windows_path;
///
/// assert_eq!(to_windows_path("/mnt/c/Users/jd/a.txt", None), r"C:\Users\jd\a.txt");
/// assert_eq!(to_windows_path("/home/jd/a.txt", Some("IMCv2")), r"\\wsl$\IMCv2\home\jd\a.txt");
/// assert_eq!(to_windows_path("--help", Some("IMCv2")), "--help");
/// ```
#[must_use]
pub fn to_windows_path(arg: &str, distro: Option<&str>) -> String {
    if !arg.starts_with('/') {
        return arg.to_owned();
    }
    if let Some(drive_path) = drive_mount(arg) {
        return drive_path;
    }
    match distro {
        Some(distro) => format!(r"\\wsl$\{distro}{}", arg.replace('/', "\\")),
        None => arg.to_owned(),
    }
}

/// Maps `/mnt/<letter>[/rest]` to `<LETTER>:\rest`.
fn drive_mount(arg: &str) -> Option<String> {
    let rest = arg.strip_prefix("/mnt/")?;
    let mut chars = rest.chars();
    let letter = chars.next().filter(char::is_ascii_alphabetic)?;
    let tail = chars.as_str();
    if !(tail.is_empty() || tail.starts_with('/')) {
        return None;
    }
    let tail = tail.trim_start_matches('/').replace('/', "\\");
    Some(format!("{}:\\{tail}", letter.to_ascii_uppercase()))
}

/// Runs `command` with inherited stdio and returns its exit code.
///
/// # Errors
///
/// Returns an I/O error if the command cannot be started.
pub fn launch(
    executor: &dyn CommandExecutor,
    command: &str,
    args: &[String],
    distro: Option<&str>,
) -> Result<i32> {
    let translated: Vec<String> = if is_windows_executable(command) {
        args.iter().map(|arg| to_windows_path(arg, distro)).collect()
    } else {
        args.to_vec()
    };
    let argv: Vec<&str> = translated.iter().map(String::as_str).collect();
    let status = executor.run_interactive(command, &argv, &RunOptions::default())?;
    Ok(exit_code(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ExpectedCall, StubExecutor, exit_output, success_output};
    use rstest::rstest;

    #[rstest]
    #[case("notepad.exe", true)]
    #[case("/mnt/c/Windows/explorer.EXE", true)]
    #[case("code", false)]
    #[case("/usr/bin/exe", false)]
    fn detects_windows_executables(#[case] command: &str, #[case] expected: bool) {
        assert_eq!(is_windows_executable(command), expected);
    }

    #[rstest]
    #[case("/mnt/c", r"C:\")]
    #[case("/mnt/d/data/x.bin", r"D:\data\x.bin")]
    #[case("/mnt/cdrom/x", r"\\wsl$\IMCv2\mnt\cdrom\x")]
    #[case("/opt/simics/install", r"\\wsl$\IMCv2\opt\simics\install")]
    #[case("relative/path", "relative/path")]
    fn translates_paths(#[case] arg: &str, #[case] expected: &str) {
        assert_eq!(to_windows_path(arg, Some("IMCv2")), expected);
    }

    #[test]
    fn windows_command_gets_translated_arguments() {
        let executor = StubExecutor::new(vec![ExpectedCall::new(
            "notepad.exe",
            &[r"\\wsl$\IMCv2\home\u\notes.txt"],
            Ok(success_output()),
        )]);

        let code = launch(
            &executor,
            "notepad.exe",
            &["/home/u/notes.txt".to_owned()],
            Some("IMCv2"),
        )
        .expect("launched");

        assert_eq!(code, 0);
        executor.assert_finished();
    }

    #[test]
    fn linux_command_keeps_arguments_and_exit_code() {
        let executor = StubExecutor::new(vec![ExpectedCall::new(
            "ls",
            &["/home/u"],
            Ok(exit_output(2, "")),
        )]);

        let code = launch(&executor, "ls", &["/home/u".to_owned()], Some("IMCv2")).expect("launched");

        assert_eq!(code, 2);
    }
}
