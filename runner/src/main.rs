//! IMCv2 SDK runner CLI entrypoint.
//!
//! This binary provisions the IMCv2 SDK inside a WSL session. It is pinned to
//! the end of the shell startup file, so every new session re-runs it until
//! the installation converges.

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use imcv2_sdk_runner::archive::{ArchiveStep, Assembler, PROGRESS_TARGET};
use imcv2_sdk_runner::autostart::{PinOutcome, Pinner, ProcessShellProbe, current_script_path};
use imcv2_sdk_runner::cli::{Cli, Mode};
use imcv2_sdk_runner::config::RunnerConfig;
use imcv2_sdk_runner::credential::CredentialGate;
use imcv2_sdk_runner::dirs::SystemBaseDirs;
use imcv2_sdk_runner::env::RunnerEnv;
use imcv2_sdk_runner::error::Result;
use imcv2_sdk_runner::exec::SystemCommandExecutor;
use imcv2_sdk_runner::git_identity::{GitIdentityTemplate, IdentityOutcome};
use imcv2_sdk_runner::http::UreqClient;
use imcv2_sdk_runner::installer::Installer;
use imcv2_sdk_runner::kerberos::set_kerberos;
use imcv2_sdk_runner::launch::launch;
use imcv2_sdk_runner::restart::{SessionRestarter, WslSessionRestarter};
use imcv2_sdk_runner::sequence::{Sequence, SequenceOutcome};
use imcv2_sdk_runner::session::SessionState;
use std::io::Write;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "IMCV2_LOG";

struct RunContext {
    env: RunnerEnv,
    config: RunnerConfig,
    session: SessionState,
    script_path: Utf8PathBuf,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or(LOG_ENV, default_log_filter()))
        .init();
    let cli = Cli::parse();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, stderr: &mut dyn Write) -> Result<i32> {
    let env = RunnerEnv::from_process(&SystemBaseDirs)?;
    let config = RunnerConfig::load(&env.home)?;
    let session = SessionState::probe(&env, &ProcessShellProbe::new(env.user.as_str()));
    let mut context = RunContext {
        env,
        config,
        session,
        script_path: current_script_path()?,
    };
    log::debug!("shell {:?}, install {:?}", context.session.shell(), context.session.install_path());

    let executor = SystemCommandExecutor;
    let restarter = WslSessionRestarter::for_current_process(&executor, context.env.distro.clone());

    match cli.mode() {
        Mode::PinShell => {
            let pinner = Pinner::new(context.config.autostart.marker.as_str());
            report_pin(&pinner.pin(&context.session, &context.script_path)?, stderr);
        }
        Mode::GetSimics { verbose } => {
            let assembler = assembler_for(&context, &executor);
            assembler.assemble(&context.session, verbose)?;
            write_stderr_line(stderr, "Simics assembled.");
        }
        Mode::SetKerberos(request) => set_kerberos(&executor, &request)?,
        Mode::GitConfig => {
            let template = GitIdentityTemplate::from_env(&context.env, &context.config.git_identity);
            if let IdentityOutcome::Written { path } = template.configure()? {
                write_stderr_line(stderr, format!("Git identity written to {path}."));
            }
        }
        Mode::Launch { command, args } => {
            return launch(&executor, &command, &args, context.env.distro.as_deref());
        }
        Mode::RestartWsl => restarter.restart()?,
        Mode::FullSequence => {
            let destination = cli.install_path.clone().unwrap_or_else(|| {
                context.env.home.join(&context.config.bootstrap.install_path)
            });
            run_full_sequence(&mut context, &executor, &restarter, &destination, stderr)?;
        }
    }
    Ok(0)
}

fn run_full_sequence(
    context: &mut RunContext,
    executor: &SystemCommandExecutor,
    restarter: &dyn SessionRestarter,
    destination: &Utf8Path,
    stderr: &mut dyn Write,
) -> Result<()> {
    let http = UreqClient;
    let gate = CredentialGate::new(
        executor,
        &http,
        &context.env,
        &context.config,
        context.script_path.clone(),
    );
    let assembler = assembler_for(context, executor);
    let installer = Installer::new(
        executor,
        &http,
        restarter,
        &assembler,
        &context.config.bootstrap,
        gate.credential_path(),
    );
    let sequence = Sequence::new(
        &gate,
        &installer,
        restarter,
        Pinner::new(context.config.autostart.marker.as_str()),
        context.script_path.clone(),
    );

    if let SequenceOutcome::SteadyState { path } =
        sequence.run(&mut context.session, destination, stderr)?
    {
        log::info!("nothing to do, SDK present at {path}");
    }
    Ok(())
}

fn assembler_for<'a>(context: &RunContext, executor: &'a SystemCommandExecutor) -> Assembler<'a> {
    Assembler::new(
        executor,
        context.config.archive.clone(),
        context.config.bootstrap.install_path.clone(),
        context.env.user.as_str(),
    )
}

/// Warnings everywhere, plus the assembly step announcements.
fn default_log_filter() -> String {
    format!("warn,{PROGRESS_TARGET}=info")
}

fn report_pin(outcome: &PinOutcome, stderr: &mut dyn Write) {
    match outcome {
        PinOutcome::Unchanged { path } => {
            write_stderr_line(stderr, format!("{path} already runs the SDK runner last."));
        }
        PinOutcome::Rewritten { path, .. } => {
            write_stderr_line(stderr, format!("Pinned the SDK runner to the end of {path}."));
        }
    }
}

fn exit_code_for_run_result(result: Result<i32>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(code) => code,
        Err(err) => {
            write_stderr_line(stderr, &err);
            err.exit_code()
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}
