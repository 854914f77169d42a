//! Launch client that shells out to an external cluster-launch executable.
//!
//! Each deployment is tracked through two files in the work directory: the
//! rendered launch config (`<name>.yaml`) and the info file the tool writes
//! on `create` (`<name>.info.json`). Every other subcommand is pointed at the
//! info file.

mod error;
pub mod files;

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tracing::debug;

use crate::command::{CommandOutput, CommandRequest, CommandRunner, ProcessCommandRunner};
use crate::launch::{ClusterDescription, ClusterHandle, LaunchClient, LaunchFuture, LaunchSpec};

pub use error::LaunchCliError;

/// Default name of the launch executable.
pub const DEFAULT_LAUNCH_BIN: &str = "dcos-launch";

/// Settings for [`LaunchCli`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchCliConfig {
    /// Path to the launch executable.
    pub launch_bin: String,
    /// Directory holding config and info files for this client.
    pub work_dir: Utf8PathBuf,
}

impl LaunchCliConfig {
    /// Constructs a config, trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchCliError::InvalidConfig`] when a field is blank.
    pub fn new(
        launch_bin: impl Into<String>,
        work_dir: impl Into<Utf8PathBuf>,
    ) -> Result<Self, LaunchCliError> {
        let trimmed_bin = launch_bin.into().trim().to_owned();
        let dir = work_dir.into();
        if trimmed_bin.is_empty() {
            return Err(LaunchCliError::InvalidConfig {
                field: String::from("launch_bin"),
            });
        }
        if dir.as_str().trim().is_empty() {
            return Err(LaunchCliError::InvalidConfig {
                field: String::from("work_dir"),
            });
        }
        Ok(Self {
            launch_bin: trimmed_bin,
            work_dir: dir,
        })
    }
}

/// [`LaunchClient`] backed by the launch executable.
#[derive(Clone, Debug)]
pub struct LaunchCli<R: CommandRunner> {
    config: LaunchCliConfig,
    runner: R,
}

impl LaunchCli<ProcessCommandRunner> {
    /// Creates a client wired to the real process runner.
    #[must_use]
    pub const fn with_process_runner(config: LaunchCliConfig) -> Self {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> LaunchCli<R> {
    /// Creates a client using the provided configuration and runner.
    #[must_use]
    pub const fn new(config: LaunchCliConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn config(&self) -> &LaunchCliConfig {
        &self.config
    }

    /// Directory holding this client's config and info files.
    #[must_use]
    pub fn work_dir(&self) -> &Utf8Path {
        &self.config.work_dir
    }

    fn info_arg(&self, deployment: &str) -> OsString {
        OsString::from(files::info_path(&self.config.work_dir, deployment).into_string())
    }

    fn build_args(&self, operation: &str, deployment: &str) -> Vec<OsString> {
        vec![
            OsString::from(operation),
            OsString::from("-i"),
            self.info_arg(deployment),
        ]
    }

    fn build_create_args(&self, deployment: &str) -> Vec<OsString> {
        vec![
            OsString::from("create"),
            OsString::from("-c"),
            OsString::from(files::config_path(&self.config.work_dir, deployment).into_string()),
            OsString::from("-i"),
            self.info_arg(deployment),
        ]
    }

    async fn invoke(
        &self,
        operation: &str,
        args: Vec<OsString>,
    ) -> Result<CommandOutput, LaunchCliError> {
        let request = CommandRequest::new(self.config.launch_bin.as_str()).args(args);
        let output = self.runner.run(&request).await?;
        self.check_output(operation, output)
    }

    /// Converts a non-zero exit into an error, separating operator
    /// interrupts from ordinary failures.
    fn check_output(
        &self,
        operation: &str,
        output: CommandOutput,
    ) -> Result<CommandOutput, LaunchCliError> {
        if output.is_success() {
            return Ok(output);
        }
        if output.is_interrupted() {
            return Err(LaunchCliError::Interrupted {
                program: self.config.launch_bin.clone(),
                operation: operation.to_owned(),
            });
        }
        Err(LaunchCliError::CommandFailure {
            program: self.config.launch_bin.clone(),
            operation: operation.to_owned(),
            status: output.code,
            status_text: output.status_text(),
            stderr: output.stderr.trim().to_owned(),
        })
    }

    fn parse_description(
        deployment: &str,
        stdout: &str,
    ) -> Result<ClusterDescription, LaunchCliError> {
        let parsed: DescribeOutput =
            serde_json::from_str(stdout).map_err(|err| LaunchCliError::Parse {
                deployment: deployment.to_owned(),
                message: err.to_string(),
            })?;
        let master = parsed
            .masters
            .into_iter()
            .find(|host| host.public_ip.as_deref().is_some_and(|ip| !ip.is_empty()))
            .ok_or_else(|| LaunchCliError::MissingEndpoint {
                deployment: deployment.to_owned(),
            })?;
        let endpoint = master
            .public_ip
            .ok_or_else(|| LaunchCliError::MissingEndpoint {
                deployment: deployment.to_owned(),
            })?;
        Ok(ClusterDescription {
            endpoint,
            private_address: master.private_ip,
        })
    }
}

impl<R: CommandRunner> LaunchClient for LaunchCli<R> {
    type Error = LaunchCliError;

    fn create<'a>(&'a self, spec: &'a LaunchSpec) -> LaunchFuture<'a, ClusterHandle, Self::Error> {
        Box::pin(async move {
            files::write_config(&self.config.work_dir, spec)?;
            debug!(deployment = %spec.deployment_name, "wrote launch config");
            self.invoke("create", self.build_create_args(&spec.deployment_name))
                .await?;
            Ok(ClusterHandle::provisional(spec))
        })
    }

    fn wait<'a>(&'a self, handle: &'a ClusterHandle) -> LaunchFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.invoke("wait", self.build_args("wait", &handle.deployment_name))
                .await?;
            Ok(())
        })
    }

    fn describe<'a>(
        &'a self,
        handle: &'a ClusterHandle,
    ) -> LaunchFuture<'a, ClusterDescription, Self::Error> {
        Box::pin(async move {
            let output = self
                .invoke(
                    "describe",
                    self.build_args("describe", &handle.deployment_name),
                )
                .await?;
            Self::parse_description(&handle.deployment_name, &output.stdout)
        })
    }

    fn destroy(&self, handle: ClusterHandle) -> LaunchFuture<'_, (), Self::Error> {
        Box::pin(async move {
            // Without an info file the tool never got far enough to allocate
            // anything.
            if files::info_exists(&self.config.work_dir, &handle.deployment_name)? {
                self.invoke("delete", self.build_args("delete", &handle.deployment_name))
                    .await?;
            }
            files::remove_deployment_files(&self.config.work_dir, &handle.deployment_name)
        })
    }
}

#[derive(Debug, Deserialize)]
struct DescribeOutput {
    #[serde(default)]
    masters: Vec<HostAddress>,
}

#[derive(Debug, Deserialize)]
struct HostAddress {
    #[serde(default)]
    public_ip: Option<String>,
    #[serde(default)]
    private_ip: Option<String>,
}
