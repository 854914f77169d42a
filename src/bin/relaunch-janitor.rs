//! Leftover-deployment janitor for relaunch.
//!
//! This binary destroys every deployment whose launch info file remains in
//! the per-platform work directories and then verifies none are left.

use clap::Parser;
use relaunch::config::parse_platforms;
use relaunch::janitor::{Janitor, JanitorConfig};
use relaunch::launch_cli::DEFAULT_LAUNCH_BIN;
use relaunch::logging::init_logging;
use std::io::Write as _;

#[derive(Debug, Parser)]
#[command(
    name = "relaunch-janitor",
    about = "Destroy leftover relaunch deployments in a work directory"
)]
struct Cli {
    /// Work directory holding one subdirectory per platform.
    #[arg(long, env = "RELAUNCH_WORK_DIR", default_value = ".relaunch")]
    work_dir: String,
    /// Path to the launch executable.
    #[arg(long, env = "RELAUNCH_LAUNCH_BIN", default_value = DEFAULT_LAUNCH_BIN)]
    launch_bin: String,
    /// Comma-separated platforms to sweep.
    #[arg(long, env = "RELAUNCH_PLATFORMS", default_value = "linux,darwin,windows")]
    platforms: String,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    init_logging();
    let cli = Cli::parse();
    let platforms = parse_platforms(cli.platforms.split(',')).map_err(|err| err.to_string())?;
    let config =
        JanitorConfig::new(cli.work_dir, cli.launch_bin, platforms).map_err(|err| err.to_string())?;
    let janitor = Janitor::with_process_runner(config);
    let summary = janitor.sweep().await.map_err(|err| err.to_string())?;
    writeln!(
        std::io::stdout(),
        "janitor sweep complete: deleted_deployments={}",
        summary.deleted_deployments()
    )
    .map_err(|err| err.to_string())?;
    Ok(())
}
