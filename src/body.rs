//! Build/test bodies run against a ready cluster.

use std::future::Future;
use std::pin::Pin;

use camino::Utf8PathBuf;
use shell_escape::unix::escape;
use thiserror::Error;

use crate::auth::BearerToken;
use crate::command::{CommandError, CommandRequest, CommandRunner};
use crate::launch::Platform;

/// Environment variable naming the platform under test.
pub const PLATFORM_ENV: &str = "RELAUNCH_PLATFORM";

/// Environment variable carrying the cluster base URL.
pub const CLUSTER_URL_ENV: &str = "RELAUNCH_CLUSTER_URL";

/// Environment variable carrying the bearer token.
pub const TOKEN_ENV: &str = "RELAUNCH_ACS_TOKEN";

/// Values handed to a body once its cluster is ready.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BodyEnv {
    /// Platform the body builds and tests.
    pub platform: Platform,
    /// Base URL of the cluster (scheme and endpoint).
    pub cluster_url: String,
    /// Bearer token for the cluster.
    pub token: BearerToken,
}

impl BodyEnv {
    /// Environment variables exported to command-backed bodies.
    #[must_use]
    pub fn vars(&self) -> Vec<(String, String)> {
        vec![
            (PLATFORM_ENV.to_owned(), self.platform.as_str().to_owned()),
            (CLUSTER_URL_ENV.to_owned(), self.cluster_url.clone()),
            (TOKEN_ENV.to_owned(), self.token.expose().to_owned()),
        ]
    }
}

/// Errors reported by bodies.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BodyError {
    /// Raised when the body's command cannot be started.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// Raised when the body's command exits non-zero.
    #[error("`{command}` exited with status {status_text}")]
    Failed {
        /// Rendered command line.
        command: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
    },
    /// Raised when the body panicked.
    #[error("body panicked: {0}")]
    Panicked(String),
    /// Free-form failure reported by a custom body.
    #[error("{0}")]
    Other(String),
}

/// Future returned by bodies.
pub type BodyFuture<'a> = Pin<Box<dyn Future<Output = Result<(), BodyError>> + Send + 'a>>;

/// Build/test logic executed once a cluster is ready.
pub trait Body: Send + Sync {
    /// Runs the body against the cluster described by `env`.
    fn run(&self, env: BodyEnv) -> BodyFuture<'_>;
}

/// Body that runs a build command with the cluster details exported as
/// environment variables.
#[derive(Clone, Debug)]
pub struct CommandBody<R: CommandRunner> {
    program: String,
    args: Vec<String>,
    current_dir: Option<Utf8PathBuf>,
    runner: R,
}

impl<R: CommandRunner> CommandBody<R> {
    /// Creates a body from a command line (`argv[0]` followed by arguments).
    ///
    /// Returns `None` when `command` is empty.
    #[must_use]
    pub fn new(command: &[String], runner: R) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            current_dir: None,
            runner,
        })
    }

    /// Runs the command from `dir` instead of the current directory.
    #[must_use]
    pub fn with_current_dir(mut self, dir: Utf8PathBuf) -> Self {
        self.current_dir = Some(dir);
        self
    }

    /// Shell-escaped rendering of the command, for logs and errors.
    #[must_use]
    pub fn render(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|arg| escape(arg.as_str().into()).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<R: CommandRunner> Body for CommandBody<R> {
    fn run(&self, env: BodyEnv) -> BodyFuture<'_> {
        Box::pin(async move {
            let request = CommandRequest::new(self.program.as_str())
                .args(self.args.iter().map(String::as_str))
                .envs(env.vars())
                .current_dir(self.current_dir.clone())
                .inherit_output();
            let output = self.runner.run(&request).await?;
            if output.is_success() {
                return Ok(());
            }
            Err(BodyError::Failed {
                command: self.render(),
                status: output.code,
                status_text: output.status_text(),
            })
        })
    }
}
