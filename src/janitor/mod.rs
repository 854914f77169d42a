//! Leftover-deployment janitor.
//!
//! Every deployment the launch tool accepted leaves an info file in its
//! platform's work directory until it is destroyed. The janitor deletes each
//! one it finds, then lists again and fails if anything remains. CI runs it
//! as the unconditional teardown stage after `relaunch run`.

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::command::{CommandRunner, ProcessCommandRunner};
use crate::launch::{ClusterHandle, LaunchClient, Platform};
use crate::launch_cli::{LaunchCli, LaunchCliConfig, LaunchCliError, files};

/// Configuration for a janitor sweep.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JanitorConfig {
    /// Work directory root; each platform owns `<work_dir>/<platform>`.
    pub work_dir: Utf8PathBuf,
    /// Path to the launch executable.
    pub launch_bin: String,
    /// Platforms whose directories are swept.
    pub platforms: Vec<Platform>,
}

impl JanitorConfig {
    /// Constructs a config, trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`JanitorError::InvalidConfig`] when any required field is blank.
    pub fn new(
        work_dir: impl Into<Utf8PathBuf>,
        launch_bin: impl Into<String>,
        platforms: Vec<Platform>,
    ) -> Result<Self, JanitorError> {
        let dir = work_dir.into();
        let trimmed_bin = launch_bin.into().trim().to_owned();
        if dir.as_str().trim().is_empty() {
            return Err(JanitorError::InvalidConfig {
                field: String::from("work_dir"),
            });
        }
        if trimmed_bin.is_empty() {
            return Err(JanitorError::InvalidConfig {
                field: String::from("launch_bin"),
            });
        }
        if platforms.is_empty() {
            return Err(JanitorError::InvalidConfig {
                field: String::from("platforms"),
            });
        }
        Ok(Self {
            work_dir: dir,
            launch_bin: trimmed_bin,
            platforms,
        })
    }

    /// Directory swept for `platform`.
    #[must_use]
    pub fn platform_dir(&self, platform: Platform) -> Utf8PathBuf {
        self.work_dir.join(platform.as_str())
    }
}

/// Summary of janitor work.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SweepSummary {
    /// Deployments destroyed during the sweep, in sweep order.
    pub deleted: Vec<String>,
}

impl SweepSummary {
    /// Number of deployments destroyed.
    #[must_use]
    pub const fn deleted_deployments(&self) -> usize {
        self.deleted.len()
    }
}

/// Errors returned by the janitor.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum JanitorError {
    /// Raised when configuration is missing required values.
    #[error("missing {field}")]
    InvalidConfig {
        /// Name of the missing or invalid field.
        field: String,
    },
    /// Raised when a work directory cannot be listed.
    #[error(transparent)]
    Launch(#[from] LaunchCliError),
    /// Raised when deployments remain after the sweep.
    #[error("deployments remain after janitor sweep: {message}")]
    NotClean {
        /// Human-readable description of what remains.
        message: String,
    },
}

/// Destroys leftover deployments through the launch executable.
#[derive(Clone, Debug)]
pub struct Janitor<R: CommandRunner + Clone> {
    config: JanitorConfig,
    runner: R,
}

impl Janitor<ProcessCommandRunner> {
    /// Creates a janitor wired to the real process runner.
    #[must_use]
    pub const fn with_process_runner(config: JanitorConfig) -> Self {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner + Clone> Janitor<R> {
    /// Creates a new janitor using the provided configuration and runner.
    #[must_use]
    pub const fn new(config: JanitorConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// Destroys every deployment with an info file, then verifies none
    /// remain.
    ///
    /// A failed delete does not stop the sweep; it shows up in the final
    /// check instead.
    ///
    /// # Errors
    ///
    /// Returns [`JanitorError`] when a directory cannot be listed or
    /// deployments remain after deletion attempts.
    pub async fn sweep(&self) -> Result<SweepSummary, JanitorError> {
        let mut summary = SweepSummary::default();
        for &platform in &self.config.platforms {
            let client = self.client_for(platform)?;
            for deployment in files::list_deployments(client.work_dir())? {
                let handle = ClusterHandle {
                    deployment_name: deployment.clone(),
                    platform,
                };
                match client.destroy(handle).await {
                    Ok(()) => {
                        info!(%platform, %deployment, "destroyed leftover deployment");
                        summary.deleted.push(deployment);
                    }
                    Err(err) => {
                        warn!(%platform, %deployment, error = %err, "failed to destroy leftover deployment");
                    }
                }
            }
        }

        let mut remaining = Vec::new();
        for &platform in &self.config.platforms {
            remaining.extend(files::list_deployments(&self.config.platform_dir(platform))?);
        }
        if !remaining.is_empty() {
            return Err(JanitorError::NotClean {
                message: remaining.join(", "),
            });
        }
        Ok(summary)
    }

    fn client_for(&self, platform: Platform) -> Result<LaunchCli<R>, JanitorError> {
        let config = LaunchCliConfig::new(
            self.config.launch_bin.as_str(),
            self.config.platform_dir(platform),
        )?;
        Ok(LaunchCli::new(config, self.runner.clone()))
    }
}
