//! Command-line interface definitions for the `relaunch` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `relaunch` binary.
#[derive(Debug, Parser)]
#[command(
    name = "relaunch",
    about = "Provision a test cluster per platform, run a build against each, and tear them down",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Provision clusters, run the build command against each, and tear down.
    #[command(
        name = "run",
        about = "Provision clusters, run the build command against each, and tear down"
    )]
    Run(RunCommand),
    /// Destroy every deployment left behind in the work directory.
    #[command(
        name = "teardown",
        about = "Destroy every deployment left behind in the work directory"
    )]
    Teardown(TeardownCommand),
}

/// Arguments for the `relaunch run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Restrict the run to these platforms (repeatable). Defaults to the
    /// configured platform list.
    #[arg(long = "platform", value_name = "PLATFORM")]
    pub(crate) platforms: Vec<String>,
    /// Build command to run once a platform's cluster is ready (use -- to
    /// separate flags). The cluster URL and token are exported as
    /// `RELAUNCH_CLUSTER_URL` and `RELAUNCH_ACS_TOKEN`.
    #[arg(required = true, trailing_var_arg = true)]
    pub(crate) command: Vec<String>,
}

/// Arguments for the `relaunch teardown` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct TeardownCommand {
    /// Restrict the sweep to these platforms (repeatable).
    #[arg(long = "platform", value_name = "PLATFORM")]
    pub(crate) platforms: Vec<String>,
}
