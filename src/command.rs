//! External command execution and the runner abstraction used by the launch
//! client, the janitor, and command-backed bodies.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};

use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Exit code reported by shells when a child is interrupted with `SIGINT`.
pub const SIGINT_EXIT_CODE: i32 = 130;

/// Exit code reported by shells when a child is terminated with `SIGTERM`.
pub const SIGTERM_EXIT_CODE: i32 = 143;

/// POSIX signal number of `SIGINT`.
pub const SIGINT: i32 = 2;

/// POSIX signal number of `SIGTERM`.
pub const SIGTERM: i32 = 15;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Signal that terminated the process, if it died from one.
    pub signal: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Returns `true` when the process was interrupted by the operator:
    /// killed by `SIGINT` or `SIGTERM`, or exiting with the matching shell
    /// codes. Other signals (`SIGKILL`, `SIGSEGV`) are ordinary failures.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self.code, Some(SIGINT_EXIT_CODE | SIGTERM_EXIT_CODE))
            || matches!(self.signal, Some(SIGINT | SIGTERM))
    }

    /// Human readable exit status for error messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        match (self.code, self.signal) {
            (Some(code), _) => code.to_string(),
            (None, Some(signal)) => format!("signal {signal}"),
            (None, None) => String::from("unknown"),
        }
    }
}

/// How the child's standard output and error are handled.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OutputMode {
    /// Capture both streams into the returned [`CommandOutput`].
    #[default]
    Capture,
    /// Let the child write straight to the parent's streams.
    Inherit,
}

/// A single command invocation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandRequest {
    /// Program to execute.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Extra environment variables layered over the parent environment.
    pub envs: Vec<(String, String)>,
    /// Working directory for the child, if different from the parent's.
    pub current_dir: Option<Utf8PathBuf>,
    /// Output handling.
    pub output: OutputMode,
}

impl CommandRequest {
    /// Starts a request for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Appends arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends environment variables.
    #[must_use]
    pub fn envs<I>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.envs.extend(envs);
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: Option<Utf8PathBuf>) -> Self {
        self.current_dir = dir;
        self
    }

    /// Streams output to the parent instead of capturing it.
    #[must_use]
    pub const fn inherit_output(mut self) -> Self {
        self.output = OutputMode::Inherit;
        self
    }

    /// Returns a shell-like command string for logs and assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

/// Errors raised when a command cannot be run at all.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CommandError {
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
}

/// Future returned by command runners.
pub type CommandFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandOutput, CommandError>> + Send + 'a>>;

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner: Send + Sync {
    /// Runs the request to completion.
    ///
    /// Dropping the returned future must stop the child process.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Spawn`] if the command cannot be started.
    fn run<'a>(&'a self, request: &'a CommandRequest) -> CommandFuture<'a>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run<'a>(&'a self, request: &'a CommandRequest) -> CommandFuture<'a> {
        Box::pin(async move {
            debug!(command = %request.command_string(), "running command");
            let mut command = Command::new(&request.program);
            command
                .args(&request.args)
                .envs(request.envs.iter().map(|(key, value)| (key, value)))
                .stdin(Stdio::null())
                .kill_on_drop(true);
            if let Some(dir) = &request.current_dir {
                command.current_dir(dir);
            }

            let spawn_error = |err: std::io::Error| CommandError::Spawn {
                program: request.program.clone(),
                message: err.to_string(),
            };

            match request.output {
                OutputMode::Capture => {
                    let output = command.output().await.map_err(spawn_error)?;
                    Ok(CommandOutput {
                        code: output.status.code(),
                        signal: terminating_signal(output.status),
                        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    })
                }
                OutputMode::Inherit => {
                    let status = command
                        .stdout(Stdio::inherit())
                        .stderr(Stdio::inherit())
                        .status()
                        .await
                        .map_err(spawn_error)?;
                    Ok(CommandOutput {
                        code: status.code(),
                        signal: terminating_signal(status),
                        stdout: String::new(),
                        stderr: String::new(),
                    })
                }
            }
        })
    }
}

#[cfg(unix)]
fn terminating_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
const fn terminating_signal(_status: ExitStatus) -> Option<i32> {
    None
}
