//! Error types for the command-line launch client.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::command::CommandError;
use crate::launch::LaunchFailure;

/// Errors raised by [`super::LaunchCli`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LaunchCliError {
    /// Raised when the client configuration is incomplete.
    #[error("invalid launch client configuration: missing {field}")]
    InvalidConfig {
        /// Name of the missing field.
        field: String,
    },
    /// Raised when a config or info file cannot be read or written.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the launch executable cannot be started.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// Raised when the launch executable exits with a non-zero status.
    #[error("{program} {operation} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Launch executable.
        program: String,
        /// Subcommand that failed (for example `wait`).
        operation: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when the launch executable was interrupted by the operator.
    #[error("{program} {operation} was interrupted")]
    Interrupted {
        /// Launch executable.
        program: String,
        /// Subcommand that was interrupted.
        operation: String,
    },
    /// Raised when `describe` output cannot be parsed.
    #[error("failed to parse describe output for {deployment}: {message}")]
    Parse {
        /// Deployment being described.
        deployment: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when `describe` reports no reachable master.
    #[error("deployment {deployment} reported no master address")]
    MissingEndpoint {
        /// Deployment being described.
        deployment: String,
    },
}

impl LaunchFailure for LaunchCliError {
    fn is_cancellation(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}
