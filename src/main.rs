//! Binary entry point for the relaunch CLI.

use std::future::Future;
use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use relaunch::auth::{AuthError, Authenticator, HttpAuthenticator};
use relaunch::body::{Body, CommandBody};
use relaunch::command::ProcessCommandRunner;
use relaunch::config::{ConfigError, PipelineConfig, parse_platforms};
use relaunch::coordinator::{FanOutCoordinator, FanOutSummary};
use relaunch::janitor::{Janitor, JanitorConfig, JanitorError};
use relaunch::launch::Platform;
use relaunch::launch_cli::{LaunchCli, LaunchCliConfig, LaunchCliError};
use relaunch::logging::init_logging;
use relaunch::pipeline::PlatformPipeline;

mod cli;

use cli::{Cli, RunCommand, TeardownCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("launch client error: {0}")]
    Launch(#[from] LaunchCliError),
    #[error("auth client error: {0}")]
    Auth(#[from] AuthError),
    #[error("teardown failed: {0}")]
    Janitor(#[from] JanitorError),
    #[error("invalid command argument: {0}")]
    InvalidCommand(String),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Run(command) => run_command(command).await,
        Cli::Teardown(command) => teardown_command(command).await,
    }
}

async fn run_command(args: RunCommand) -> Result<i32, CliError> {
    validate_command_args(&args.command)?;
    let config = PipelineConfig::load_without_cli_args()?;
    config.validate()?;
    let platforms = select_platforms(&config, &args.platforms)?;
    let build_id = config.resolved_build_id();

    let authenticator: Arc<dyn Authenticator> = Arc::new(HttpAuthenticator::new(
        config.auth_scheme.trim(),
        config.login_path.trim(),
        config.accept_invalid_certs,
        config.login_timeout(),
    )?);
    let body: Arc<dyn Body> = Arc::new(
        CommandBody::new(&args.command, ProcessCommandRunner)
            .ok_or_else(|| CliError::InvalidCommand(String::from("build command is empty")))?,
    );

    let cancel = CancellationToken::new();
    let mut coordinator = FanOutCoordinator::new(cancel.clone());
    for platform in platforms {
        let client = LaunchCli::with_process_runner(LaunchCliConfig::new(
            config.launch_bin.as_str(),
            config.work_dir_for(platform),
        )?);
        let pipeline = PlatformPipeline::new(
            client,
            config.plan_for(platform, &build_id)?,
            Arc::clone(&authenticator),
            config.credentials(),
            Arc::clone(&body),
        )
        .with_policy(config.retry_policy());
        coordinator = coordinator.with_runner(Box::new(pipeline));
    }

    let interrupt = tokio::spawn(cancel_on_interrupt(cancel));
    let summary = coordinator.run().await;
    interrupt.abort();

    write_summary(io::stdout(), &summary)?;
    Ok(summary.exit_code())
}

async fn teardown_command(args: TeardownCommand) -> Result<i32, CliError> {
    let config = PipelineConfig::load_without_cli_args()?;
    let platforms = select_platforms(&config, &args.platforms)?;
    let janitor = Janitor::with_process_runner(JanitorConfig::new(
        config.work_dir(),
        config.launch_bin.as_str(),
        platforms,
    )?);
    let summary = janitor.sweep().await?;
    writeln!(
        io::stdout(),
        "teardown complete: deleted_deployments={}",
        summary.deleted_deployments()
    )?;
    Ok(0)
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    match shutdown_signal() {
        Ok(received) => {
            let signal = received.await;
            warn!(signal, "shutdown signal received; cancelling all platforms");
            cancel.cancel();
        }
        Err(err) => warn!(error = %err, "cannot listen for shutdown signals"),
    }
}

/// Registers the shutdown handlers and resolves with the name of the first
/// signal delivered.
#[cfg(unix)]
fn shutdown_signal() -> io::Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> io::Result<impl Future<Output = &'static str>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl-c",
            Err(err) => {
                warn!(error = %err, "cannot listen for ctrl-c");
                std::future::pending().await
            }
        }
    })
}

/// Platforms named on the command line, or the configured list when none
/// are given.
fn select_platforms(
    config: &PipelineConfig,
    requested: &[String],
) -> Result<Vec<Platform>, CliError> {
    if requested.is_empty() {
        return Ok(config.platforms()?);
    }
    Ok(parse_platforms(requested.iter().map(String::as_str))?)
}

fn validate_command_args(args: &[String]) -> Result<(), CliError> {
    if args.first().is_none_or(|program| program.trim().is_empty()) {
        return Err(CliError::InvalidCommand(String::from(
            "build command is empty",
        )));
    }
    Ok(())
}

fn write_summary(mut target: impl Write, summary: &FanOutSummary) -> io::Result<()> {
    for report in &summary.reports {
        writeln!(target, "{report}")?;
    }
    let verdict = if summary.passed() {
        "passed"
    } else if summary.cancelled() {
        "cancelled"
    } else {
        "failed"
    };
    writeln!(target, "relaunch: {verdict}")
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod main_tests;
