//! Behaviour-driven tests for autostart pinning.
//!
//! These scenarios pin the runner into a scratch home directory and check the
//! resulting startup file. Tests use the rstest-bdd v0.5.0 mutable world
//! pattern.

use camino::{Utf8Path, Utf8PathBuf};
use imcv2_sdk_runner::autostart::{PinOutcome, Pinner, ShellKind};
use imcv2_sdk_runner::error::{Result as RunnerResult, RunnerError};
use imcv2_sdk_runner::session::SessionState;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

const MARKER: &str = "# IMCv2 SDK runner (keep these lines last)";
const SCRIPT: &str = "/usr/local/bin/imcv2-sdk-runner";

// ---------------------------------------------------------------------------
// World types
// ---------------------------------------------------------------------------

#[derive(Default)]
struct AutostartWorld {
    // Keep the scratch home alive for the lifetime of the scenario.
    temp: Option<TempDir>,
    session: Option<SessionState>,
    outcomes: Vec<RunnerResult<PinOutcome>>,
}

impl AutostartWorld {
    fn home(&self) -> Utf8PathBuf {
        let temp = self.temp.as_ref().expect("home created");
        Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 home")
    }

    fn start(&mut self, shell: ShellKind, bashrc: &str) {
        let temp = tempfile::tempdir().expect("temp dir");
        self.temp = Some(temp);
        let home = self.home();
        std::fs::write(home.join(".bashrc"), bashrc).expect("write bashrc");
        self.session = Some(SessionState::new(home, shell));
    }

    fn bashrc(&self) -> String {
        std::fs::read_to_string(self.home().join(".bashrc")).expect("read bashrc")
    }

    fn last_outcome(&self) -> &RunnerResult<PinOutcome> {
        self.outcomes.last().expect("runner pinned")
    }
}

#[fixture]
fn world() -> AutostartWorld {
    AutostartWorld::default()
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("a bash session with an empty startup file")]
fn given_empty_bashrc(world: &mut AutostartWorld) {
    world.start(ShellKind::Bash, "");
}

#[given("a bash session whose startup file holds a stale block with CRLF endings")]
fn given_stale_crlf_block(world: &mut AutostartWorld) {
    let contents = format!(
        "export EDITOR=vim\r\n\r\n{MARKER}\r\n{SCRIPT}\r\nalias ll='ls -l'\n"
    );
    world.start(ShellKind::Bash, &contents);
}

#[given("a fish session")]
fn given_fish_session(world: &mut AutostartWorld) {
    world.start(ShellKind::Unsupported("fish".to_owned()), "");
}

#[when("the runner is pinned")]
fn when_pinned(world: &mut AutostartWorld) {
    let session = world.session.as_ref().expect("session started");
    let outcome = Pinner::new(MARKER).pin(session, Utf8Path::new(SCRIPT));
    world.outcomes.push(outcome);
}

#[then("the startup file is exactly the separator and the block")]
fn then_exact_block(world: &mut AutostartWorld) {
    assert_eq!(world.bashrc(), format!("\n{MARKER}\n{SCRIPT}\n"));
}

#[then("the startup file was rewritten")]
fn then_rewritten(world: &mut AutostartWorld) {
    assert!(matches!(
        world.last_outcome(),
        Ok(PinOutcome::Rewritten { .. })
    ));
}

#[then("the startup file was left unchanged")]
fn then_unchanged(world: &mut AutostartWorld) {
    assert!(matches!(
        world.last_outcome(),
        Ok(PinOutcome::Unchanged { .. })
    ));
}

#[then("the block appears once")]
fn then_block_once(world: &mut AutostartWorld) {
    let bashrc = world.bashrc();
    assert_eq!(bashrc.matches(MARKER).count(), 1, "{bashrc}");
    assert_eq!(bashrc.matches(SCRIPT).count(), 1, "{bashrc}");
}

#[then("the startup file ends with the block")]
fn then_ends_with_block(world: &mut AutostartWorld) {
    assert!(world.bashrc().ends_with(&format!("{MARKER}\n{SCRIPT}\n")));
}

#[then("the user's own lines are preserved")]
fn then_user_lines_preserved(world: &mut AutostartWorld) {
    let bashrc = world.bashrc();
    assert!(bashrc.contains("export EDITOR=vim"));
    assert!(bashrc.contains("alias ll='ls -l'"));
}

#[then("pinning fails because the shell is unsupported")]
fn then_unsupported(world: &mut AutostartWorld) {
    assert!(matches!(
        world.last_outcome(),
        Err(RunnerError::UnsupportedShell { shell }) if shell == "fish"
    ));
    assert!(world.bashrc().is_empty());
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/autostart.feature",
    name = "Pinning an empty startup file"
)]
fn scenario_pin_empty_file(world: AutostartWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/autostart.feature",
    name = "Pinning twice changes nothing the second time"
)]
fn scenario_pin_is_idempotent(world: AutostartWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/autostart.feature",
    name = "Stale blocks with different line endings converge"
)]
fn scenario_stale_blocks_converge(world: AutostartWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/autostart.feature",
    name = "Unsupported shells are refused"
)]
fn scenario_unsupported_shell(world: AutostartWorld) {
    let _ = world;
}
