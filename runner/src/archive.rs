//! Split-archive assembly for the simulator installer.
//!
//! The installer is too large for a single repository object, so it is kept
//! as numbered fragments inside the SDK checkout. Assembly refreshes the
//! checkout, concatenates the fragments in lexical order, extracts the
//! resulting gzip tarball, and moves the tree to a fixed system mount point
//! owned by the invoking user.
//!
//! Every step is individually fatal and tagged with its [`AssemblyStep`].
//! Completed steps are not rolled back.

use crate::config::ArchiveConfig;
use crate::error::{RunnerError, Result};
use crate::exec::{CommandExecutor, run_checked};
use crate::session::SessionState;
use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use std::fmt;
use std::fs::File;
use std::path::{Component, Path};

/// Log target for step announcements.
pub const PROGRESS_TARGET: &str = "simics";

/// The steps of an assembly run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyStep {
    /// Resolve the fragment source repository.
    Locate,
    /// Check out the fixed reference line.
    Checkout,
    /// Pull the latest fragments.
    Pull,
    /// Confirm at least one fragment exists.
    VerifyFragments,
    /// Join the fragments into one archive.
    Concatenate,
    /// Unpack the archive.
    Extract,
    /// Remove the previous tree from the mount point.
    RemoveStale,
    /// Move the extracted tree into the mount point.
    Relocate,
    /// Hand the mount point's parent to the invoking user.
    Reown,
}

impl fmt::Display for AssemblyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Locate => "locate",
            Self::Checkout => "checkout",
            Self::Pull => "pull",
            Self::VerifyFragments => "verify fragments",
            Self::Concatenate => "concatenate",
            Self::Extract => "extract",
            Self::RemoveStale => "remove stale",
            Self::Relocate => "relocate",
            Self::Reown => "reown",
        };
        f.write_str(name)
    }
}

/// Resolved locations for one assembly run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePlan {
    /// The fragment source repository.
    pub source_dir: Utf8PathBuf,
    /// Directory holding the fragments.
    pub fragment_dir: Utf8PathBuf,
    /// Where the concatenated archive is written.
    pub archive_path: Utf8PathBuf,
    /// Where the archive is unpacked before relocation.
    pub extract_root: Utf8PathBuf,
    /// The final system mount point.
    pub mount_path: Utf8PathBuf,
}

impl ArchivePlan {
    /// Resolves the plan for an SDK installed at `install_path`.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use imcv2_sdk_runner::archive::ArchivePlan;
    /// use imcv2_sdk_runner::config::ArchiveConfig;
    ///
    /// let plan = ArchivePlan::new(Utf8Path::new("/home/u/projects/imcv2"), &ArchiveConfig::default());
    /// assert_eq!(plan.fragment_dir.as_str(), "/home/u/projects/imcv2/simics/fragments");
    /// assert_eq!(plan.mount_path.as_str(), "/opt/simics/install");
    /// ```
    #[must_use]
    pub fn new(install_path: &Utf8Path, config: &ArchiveConfig) -> Self {
        let source_dir = install_path.join(&config.source_dir);
        Self {
            fragment_dir: source_dir.join(&config.fragment_dir),
            archive_path: source_dir.join(&config.archive_name),
            extract_root: source_dir.join(&config.extract_dir),
            mount_path: config.mount_path.clone(),
            source_dir,
        }
    }

    /// Lists the fragment files in lexical order.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the fragment directory cannot be read.
    pub fn fragments(&self) -> Result<Vec<Utf8PathBuf>> {
        let mut fragments = Vec::new();
        for entry in self.fragment_dir.read_dir_utf8()? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fragments.push(entry.into_path());
            }
        }
        fragments.sort();
        Ok(fragments)
    }

    fn mount_parent(&self) -> &Utf8Path {
        self.mount_path.parent().unwrap_or(&self.mount_path)
    }
}

/// Reconstructs and relocates the split archive.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveStep {
    /// Runs every assembly step for the session's install.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::StepFailure`] naming the first step that failed.
    fn assemble(&self, session: &SessionState, verbose: bool) -> Result<()>;
}

/// Production assembler driving `git` and `sudo` through an executor.
pub struct Assembler<'a> {
    executor: &'a dyn CommandExecutor,
    config: ArchiveConfig,
    default_install: Utf8PathBuf,
    user: String,
}

impl<'a> Assembler<'a> {
    /// Creates an assembler.
    ///
    /// `default_install` is used, relative to the home directory, when the
    /// session has no recorded install path. `user` receives ownership of
    /// the mount point.
    #[must_use]
    pub fn new(
        executor: &'a dyn CommandExecutor,
        config: ArchiveConfig,
        default_install: impl Into<Utf8PathBuf>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            config,
            default_install: default_install.into(),
            user: user.into(),
        }
    }

    fn locate(&self, session: &SessionState) -> Result<ArchivePlan> {
        let install = session
            .install_path()
            .map_or_else(|| session.home().join(&self.default_install), Utf8Path::to_path_buf);
        let plan = ArchivePlan::new(&install, &self.config);
        if !plan.source_dir.is_dir() {
            return Err(step_failure(
                AssemblyStep::Locate,
                format!("fragment source {} does not exist", plan.source_dir),
            ));
        }
        Ok(plan)
    }

    fn run(&self, step: AssemblyStep, cmd: &str, args: &[&str]) -> Result<()> {
        run_checked(self.executor, cmd, args, |reason| step_failure(step, reason)).map(|_| ())
    }

    fn verify_fragments(plan: &ArchivePlan) -> Result<Vec<Utf8PathBuf>> {
        let fragments = plan
            .fragments()
            .map_err(|e| step_failure(AssemblyStep::VerifyFragments, e.to_string()))?;
        if fragments.is_empty() {
            return Err(step_failure(
                AssemblyStep::VerifyFragments,
                format!("no fragments in {}", plan.fragment_dir),
            ));
        }
        Ok(fragments)
    }
}

impl ArchiveStep for Assembler<'_> {
    fn assemble(&self, session: &SessionState, verbose: bool) -> Result<()> {
        let announce = |step: AssemblyStep| {
            if verbose {
                log::info!(target: PROGRESS_TARGET, "{step}");
            } else {
                log::debug!(target: PROGRESS_TARGET, "{step}");
            }
        };

        announce(AssemblyStep::Locate);
        let plan = self.locate(session)?;
        let source = plan.source_dir.as_str();

        announce(AssemblyStep::Checkout);
        self.run(
            AssemblyStep::Checkout,
            "git",
            &["-C", source, "checkout", self.config.reference.as_str()],
        )?;

        announce(AssemblyStep::Pull);
        self.run(AssemblyStep::Pull, "git", &["-C", source, "pull"])?;

        announce(AssemblyStep::VerifyFragments);
        let fragments = Self::verify_fragments(&plan)?;

        announce(AssemblyStep::Concatenate);
        concatenate(&fragments, &plan.archive_path)
            .map_err(|e| step_failure(AssemblyStep::Concatenate, e.to_string()))?;

        announce(AssemblyStep::Extract);
        extract_tar_gz(plan.archive_path.as_std_path(), plan.extract_root.as_std_path())
            .map_err(|e| step_failure(AssemblyStep::Extract, e.to_string()))?;

        let mount = plan.mount_path.as_str();
        let parent = plan.mount_parent().as_str();

        announce(AssemblyStep::RemoveStale);
        self.run(AssemblyStep::RemoveStale, "sudo", &["rm", "-rf", mount])?;

        announce(AssemblyStep::Relocate);
        self.run(AssemblyStep::Relocate, "sudo", &["mkdir", "-p", parent])?;
        self.run(
            AssemblyStep::Relocate,
            "sudo",
            &["mv", plan.extract_root.as_str(), mount],
        )?;

        announce(AssemblyStep::Reown);
        let owner = format!("{0}:{0}", self.user);
        self.run(
            AssemblyStep::Reown,
            "sudo",
            &["chown", "-R", owner.as_str(), parent],
        )?;

        log::info!("simulator installed at {mount}");
        Ok(())
    }
}

fn step_failure(step: AssemblyStep, reason: impl Into<String>) -> RunnerError {
    RunnerError::StepFailure {
        step,
        reason: reason.into(),
    }
}

/// Writes `fragments`, in the given order, into a single file at `dest`.
fn concatenate(fragments: &[Utf8PathBuf], dest: &Utf8Path) -> std::io::Result<u64> {
    let mut out = File::create(dest)?;
    let mut total = 0;
    for fragment in fragments {
        let mut input = File::open(fragment)?;
        total += std::io::copy(&mut input, &mut out)?;
    }
    out.sync_all()?;
    Ok(total)
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
enum ExtractionError {
    #[error("extraction I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path traversal detected: {path}")]
    PathTraversal { path: String },

    #[error("archive is empty")]
    EmptyArchive,
}

/// Unpacks a gzip tarball into a fresh `dest_dir`.
///
/// Returns the number of entries unpacked.
fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> std::result::Result<usize, ExtractionError> {
    if dest_dir.exists() {
        std::fs::remove_dir_all(dest_dir)?;
    }
    std::fs::create_dir_all(dest_dir)?;

    let decoder = GzDecoder::new(File::open(archive_path)?);
    let mut archive = tar::Archive::new(decoder);
    let mut count = 0;

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_path = entry.path()?.into_owned();
        validate_entry_path(&entry_path)?;

        let dest_path = dest_dir.join(&entry_path);
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&dest_path)?;
        count += 1;
    }

    if count == 0 {
        return Err(ExtractionError::EmptyArchive);
    }
    Ok(count)
}

/// Rejects absolute entries and entries with `..` components.
fn validate_entry_path(path: &Path) -> std::result::Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|component| matches!(component, Component::ParentDir));
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autostart::ShellKind;
    use crate::test_utils::{ExpectedCall, StubExecutor, failure_output, success_output};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use rstest::{fixture, rstest};
    use std::path::PathBuf;

    struct Sandbox {
        _temp: tempfile::TempDir,
        home: Utf8PathBuf,
        install: Utf8PathBuf,
    }

    impl Sandbox {
        fn plan(&self) -> ArchivePlan {
            ArchivePlan::new(&self.install, &config())
        }

        fn session(&self) -> SessionState {
            let mut session = SessionState::new(self.home.clone(), ShellKind::Bash);
            session.record_install(self.install.clone());
            session
        }
    }

    fn config() -> ArchiveConfig {
        ArchiveConfig {
            mount_path: Utf8PathBuf::from("/opt/simics/install"),
            ..ArchiveConfig::default()
        }
    }

    /// Builds a gzip tarball holding `files` and returns its bytes.
    fn tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, *contents)
                .expect("append entry");
        }
        builder
            .into_inner()
            .expect("finish tar")
            .finish()
            .expect("finish gzip")
    }

    #[fixture]
    fn sandbox() -> Sandbox {
        let temp = tempfile::tempdir().expect("temp dir");
        let home = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8");
        let install = home.join("projects/imcv2");
        let plan = ArchivePlan::new(&install, &config());
        std::fs::create_dir_all(&plan.fragment_dir).expect("fragment dir");

        let bytes = tarball(&[
            ("simics-7/bin/simics", "#!/bin/sh\n".as_bytes()),
            ("simics-7/README", "docs".as_bytes()),
        ]);
        let (first, second) = bytes.split_at(bytes.len() / 2);
        std::fs::write(plan.fragment_dir.join("simics.tar.gz.part-aa"), first).expect("part aa");
        std::fs::write(plan.fragment_dir.join("simics.tar.gz.part-ab"), second).expect("part ab");

        Sandbox {
            _temp: temp,
            home,
            install,
        }
    }

    fn expected_calls(plan: &ArchivePlan, user: &str) -> Vec<ExpectedCall> {
        let source = plan.source_dir.as_str().to_owned();
        let extract = plan.extract_root.as_str().to_owned();
        let owner = format!("{user}:{user}");
        vec![
            git_call(&["-C", &source, "checkout", "main"]),
            git_call(&["-C", &source, "pull"]),
            sudo_call(&["rm", "-rf", "/opt/simics/install"]),
            sudo_call(&["mkdir", "-p", "/opt/simics"]),
            sudo_call(&["mv", &extract, "/opt/simics/install"]),
            sudo_call(&["chown", "-R", &owner, "/opt/simics"]),
        ]
    }

    fn git_call(args: &[&str]) -> ExpectedCall {
        ExpectedCall::new("git", args, Ok(success_output()))
    }

    fn sudo_call(args: &[&str]) -> ExpectedCall {
        ExpectedCall::new("sudo", args, Ok(success_output()))
    }

    #[test]
    fn step_names_are_lowercase() {
        assert_eq!(AssemblyStep::Concatenate.to_string(), "concatenate");
        assert_eq!(AssemblyStep::VerifyFragments.to_string(), "verify fragments");
        assert_eq!(AssemblyStep::RemoveStale.to_string(), "remove stale");
    }

    #[rstest]
    fn assembles_fragments_in_lexical_order(sandbox: Sandbox) {
        let plan = sandbox.plan();
        let executor = StubExecutor::new(expected_calls(&plan, "u"));
        let assembler = Assembler::new(&executor, config(), "projects/imcv2", "u");

        assembler
            .assemble(&sandbox.session(), false)
            .expect("assembly succeeds");

        executor.assert_finished();
        assert_eq!(
            std::fs::read_to_string(plan.extract_root.join("simics-7/README")).expect("readme"),
            "docs"
        );
    }

    #[rstest]
    fn default_install_path_is_used_without_a_recorded_install(sandbox: Sandbox) {
        let plan = sandbox.plan();
        let executor = StubExecutor::new(expected_calls(&plan, "u"));
        let assembler = Assembler::new(&executor, config(), "projects/imcv2", "u");
        let session = SessionState::new(sandbox.home.clone(), ShellKind::Bash);

        assembler.assemble(&session, true).expect("assembly succeeds");
        executor.assert_finished();
    }

    #[test]
    fn missing_source_fails_closed_at_locate() {
        let temp = tempfile::tempdir().expect("temp dir");
        let home = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8");
        let executor = StubExecutor::new(vec![]);
        let assembler = Assembler::new(&executor, config(), "projects/imcv2", "u");

        let err = assembler
            .assemble(&SessionState::new(home, ShellKind::Bash), false)
            .expect_err("nothing to assemble");

        assert!(matches!(
            err,
            RunnerError::StepFailure {
                step: AssemblyStep::Locate,
                ..
            }
        ));
        executor.assert_finished();
    }

    #[rstest]
    fn failed_pull_stops_before_later_steps(sandbox: Sandbox) {
        let plan = sandbox.plan();
        let source = plan.source_dir.as_str();
        let executor = StubExecutor::new(vec![
            git_call(&["-C", source, "checkout", "main"]),
            ExpectedCall::new(
                "git",
                &["-C", source, "pull"],
                Ok(failure_output("fatal: unable to access remote")),
            ),
        ]);
        let assembler = Assembler::new(&executor, config(), "projects/imcv2", "u");

        let err = assembler
            .assemble(&sandbox.session(), false)
            .expect_err("pull fails");

        assert!(matches!(
            err,
            RunnerError::StepFailure {
                step: AssemblyStep::Pull,
                ..
            }
        ));
        executor.assert_finished();
        assert!(!plan.archive_path.exists());
    }

    #[rstest]
    fn empty_fragment_directory_fails_verification(sandbox: Sandbox) {
        let plan = sandbox.plan();
        for fragment in plan.fragments().expect("fragments") {
            std::fs::remove_file(fragment).expect("remove fragment");
        }
        let source = plan.source_dir.as_str();
        let executor = StubExecutor::new(vec![
            git_call(&["-C", source, "checkout", "main"]),
            git_call(&["-C", source, "pull"]),
        ]);
        let assembler = Assembler::new(&executor, config(), "projects/imcv2", "u");

        let err = assembler
            .assemble(&sandbox.session(), false)
            .expect_err("no fragments");

        assert!(matches!(
            err,
            RunnerError::StepFailure {
                step: AssemblyStep::VerifyFragments,
                ..
            }
        ));
    }

    #[rstest]
    fn corrupt_archive_fails_extraction(sandbox: Sandbox) {
        let plan = sandbox.plan();
        std::fs::write(plan.fragment_dir.join("simics.tar.gz.part-aa"), b"not gzip")
            .expect("corrupt fragment");
        let source = plan.source_dir.as_str();
        let executor = StubExecutor::new(vec![
            git_call(&["-C", source, "checkout", "main"]),
            git_call(&["-C", source, "pull"]),
        ]);
        let assembler = Assembler::new(&executor, config(), "projects/imcv2", "u");

        let err = assembler
            .assemble(&sandbox.session(), false)
            .expect_err("corrupt archive");

        assert!(matches!(
            err,
            RunnerError::StepFailure {
                step: AssemblyStep::Extract,
                ..
            }
        ));
        executor.assert_finished();
    }

    #[rstest]
    #[case::parent_dir("../escape.txt")]
    #[case::nested_parent("foo/../../escape.txt")]
    #[case::absolute("/etc/passwd")]
    fn rejects_path_traversal(#[case] bad_path: &str) {
        let result = validate_entry_path(&PathBuf::from(bad_path));
        assert!(
            matches!(result, Err(ExtractionError::PathTraversal { .. })),
            "expected PathTraversal for {bad_path}"
        );
    }

    #[test]
    fn accepts_normal_paths() {
        assert!(validate_entry_path(&PathBuf::from("simics-7/bin/simics")).is_ok());
    }

    #[test]
    fn empty_archive_is_rejected() {
        let temp = tempfile::tempdir().expect("temp dir");
        let archive = temp.path().join("empty.tar.gz");
        std::fs::write(&archive, tarball(&[])).expect("write archive");

        let result = extract_tar_gz(&archive, &temp.path().join("out"));
        assert!(matches!(result, Err(ExtractionError::EmptyArchive)));
    }
}
