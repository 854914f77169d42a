//! Core library for the relaunch CI driver.
//!
//! The crate provisions one ephemeral test cluster per target platform
//! through an external launch executable, retrying failed provisioning by
//! destroying and recreating the cluster. It logs in to each ready cluster,
//! runs a build body against it, and always tears it down. Platforms run
//! concurrently and share only a cancellation token.

pub mod auth;
pub mod body;
pub mod command;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod janitor;
pub mod launch;
pub mod launch_cli;
pub mod logging;
pub mod pipeline;
pub mod test_support;

pub use auth::{AuthError, Authenticator, BearerToken, Credentials, HttpAuthenticator};
pub use body::{Body, BodyEnv, BodyError, CommandBody};
pub use command::{CommandError, CommandOutput, CommandRequest, CommandRunner, ProcessCommandRunner};
pub use config::{ConfigError, PipelineConfig};
pub use controller::{AbortReason, ControllerState, Outcome, RetryController, RetryPolicy};
pub use coordinator::{FanOutCoordinator, FanOutSummary};
pub use janitor::{Janitor, JanitorConfig, JanitorError, SweepSummary};
pub use launch::{
    ClusterDescription, ClusterHandle, LaunchClient, LaunchError, LaunchFailure, LaunchPlan,
    LaunchPlanBuilder, LaunchSpec, Platform,
};
pub use launch_cli::{LaunchCli, LaunchCliConfig, LaunchCliError};
pub use pipeline::{PipelineError, PlatformPipeline, PlatformReport, PlatformRunner};
