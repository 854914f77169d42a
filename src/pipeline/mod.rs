//! Per-platform pipeline: provision, log in, run the body, tear down.
//!
//! A pipeline owns everything it touches, so pipelines for different
//! platforms share no state. Once the controller hands back a cluster the
//! pipeline destroys it on every exit path, and a teardown failure never
//! replaces the error that came before it.

use std::any::Any;
use std::fmt::{self, Display};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::{AuthError, Authenticator, Credentials};
use crate::body::{Body, BodyEnv, BodyError};
use crate::controller::{AbortReason, Outcome, RetryController, RetryPolicy};
use crate::launch::{ClusterHandle, LaunchClient, LaunchFailure, LaunchPlan, Platform};

/// Errors that end a platform's pipeline without a passing body.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PipelineError {
    /// Raised when the operator cancelled the run.
    #[error("cancelled")]
    Cancelled,
    /// Raised when the attempt ceiling was reached before a cluster became
    /// ready.
    #[error("provisioning gave up after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Message of the last provisioning failure.
        last_error: String,
    },
    /// Raised when the ready cluster could not be described.
    #[error("failed to describe {deployment}: {message}")]
    Describe {
        /// Deployment being described.
        deployment: String,
        /// Launch client error message.
        message: String,
    },
    /// Raised when login against the cluster fails.
    #[error("login failed: {0}")]
    Auth(#[from] AuthError),
    /// Raised when the body fails.
    #[error("body failed: {0}")]
    Body(#[from] BodyError),
    /// Raised when the pipeline task itself died.
    #[error("pipeline task aborted: {0}")]
    Crashed(String),
}

impl From<AbortReason> for PipelineError {
    fn from(reason: AbortReason) -> Self {
        match reason {
            AbortReason::Cancelled => Self::Cancelled,
            AbortReason::Exhausted {
                attempts,
                last_error,
            } => Self::Exhausted {
                attempts,
                last_error,
            },
        }
    }
}

/// Terminal result for one platform.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlatformReport {
    /// Platform the report covers.
    pub platform: Platform,
    /// Creates issued by the retry controller.
    pub attempts: u32,
    /// Body outcome, or the error that prevented it from running.
    pub result: Result<(), PipelineError>,
}

impl PlatformReport {
    /// Returns `true` when the body ran and passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.result.is_ok()
    }

    /// Returns `true` when the platform stopped because of cancellation.
    #[must_use]
    pub const fn cancelled(&self) -> bool {
        matches!(self.result, Err(PipelineError::Cancelled))
    }

    /// Report for a pipeline task that panicked or was aborted.
    #[must_use]
    pub fn crashed(platform: Platform, err: &JoinError) -> Self {
        let message = if err.is_cancelled() {
            String::from("task was cancelled")
        } else {
            String::from("task panicked")
        };
        Self {
            platform,
            attempts: 0,
            result: Err(PipelineError::Crashed(message)),
        }
    }
}

impl Display for PlatformReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.attempts == 1 { "attempt" } else { "attempts" };
        match &self.result {
            Ok(()) => write!(
                f,
                "{}: passed ({} {noun})",
                self.platform, self.attempts
            ),
            Err(err) => write!(
                f,
                "{}: failed ({} {noun}): {err}",
                self.platform, self.attempts
            ),
        }
    }
}

/// Future returned by [`PlatformRunner::run`].
pub type RunnerFuture = Pin<Box<dyn Future<Output = PlatformReport> + Send>>;

/// A self-contained unit of per-platform work the coordinator can spawn.
pub trait PlatformRunner: Send + 'static {
    /// Platform this runner serves.
    fn platform(&self) -> Platform;

    /// Consumes the runner and drives it to a report.
    fn run(self: Box<Self>, cancel: CancellationToken) -> RunnerFuture;
}

/// Controller, describe, login, body, and guaranteed teardown for one
/// platform.
pub struct PlatformPipeline<C: LaunchClient> {
    client: C,
    plan: LaunchPlan,
    policy: RetryPolicy,
    authenticator: Arc<dyn Authenticator>,
    credentials: Credentials,
    body: Arc<dyn Body>,
}

impl<C: LaunchClient> fmt::Debug for PlatformPipeline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformPipeline")
            .field("plan", &self.plan)
            .field("policy", &self.policy)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl<C: LaunchClient> PlatformPipeline<C> {
    /// Creates a pipeline.
    #[must_use]
    pub const fn new(
        client: C,
        plan: LaunchPlan,
        authenticator: Arc<dyn Authenticator>,
        credentials: Credentials,
        body: Arc<dyn Body>,
    ) -> Self {
        Self {
            client,
            plan,
            policy: RetryPolicy::unbounded(),
            authenticator,
            credentials,
            body,
        }
    }

    /// Overrides the retry policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Platform this pipeline serves.
    #[must_use]
    pub const fn platform(&self) -> Platform {
        self.plan.platform
    }

    /// Runs the pipeline to completion.
    ///
    /// The returned report carries the body's outcome; teardown errors are
    /// logged and never reported.
    pub async fn execute(&self, cancel: &CancellationToken) -> PlatformReport {
        let mut controller =
            RetryController::new(&self.client, &self.plan, self.policy, cancel.clone());
        let outcome = controller.run().await;
        let attempts = controller.attempts_made();

        let result = match outcome {
            Outcome::Ready(handle) => {
                let result = self.use_cluster(&handle, cancel).await;
                self.teardown(handle, result.as_ref().err()).await;
                result
            }
            Outcome::Aborted { reason, handle } => {
                let err = PipelineError::from(reason);
                if let Some(live) = handle {
                    self.teardown(live, Some(&err)).await;
                }
                Err(err)
            }
        };

        match &result {
            Ok(()) => info!(platform = %self.plan.platform, attempts, "platform passed"),
            Err(err) => warn!(platform = %self.plan.platform, attempts, error = %err, "platform failed"),
        }
        PlatformReport {
            platform: self.plan.platform,
            attempts,
            result,
        }
    }

    async fn use_cluster(
        &self,
        handle: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let described = until_cancelled(cancel, self.client.describe(handle)).await?;
        let description = described.map_err(|err| {
            if err.is_cancellation() {
                PipelineError::Cancelled
            } else {
                PipelineError::Describe {
                    deployment: handle.deployment_name.clone(),
                    message: err.to_string(),
                }
            }
        })?;
        info!(
            platform = %self.plan.platform,
            deployment = %handle.deployment_name,
            endpoint = %description.endpoint,
            "cluster ready"
        );

        let token = until_cancelled(
            cancel,
            self.authenticator
                .login(&description.endpoint, &self.credentials),
        )
        .await??;
        let env = BodyEnv {
            platform: self.plan.platform,
            cluster_url: self.authenticator.cluster_url(&description.endpoint),
            token,
        };
        run_body(Arc::clone(&self.body), env, cancel).await
    }

    async fn teardown(&self, handle: ClusterHandle, primary: Option<&PipelineError>) {
        let deployment = handle.deployment_name.clone();
        match self.client.destroy(handle).await {
            Ok(()) => info!(platform = %self.plan.platform, %deployment, "cluster destroyed"),
            Err(err) => warn!(
                platform = %self.plan.platform,
                %deployment,
                outcome = %append_teardown_note(primary, &err),
                "teardown failed"
            ),
        }
    }
}

impl<C: LaunchClient + 'static> PlatformRunner for PlatformPipeline<C> {
    fn platform(&self) -> Platform {
        self.plan.platform
    }

    fn run(self: Box<Self>, cancel: CancellationToken) -> RunnerFuture {
        Box::pin(async move { self.execute(&cancel).await })
    }
}

/// Resolves `future` unless `cancel` fires first.
async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, PipelineError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(PipelineError::Cancelled),
        output = future => Ok(output),
    }
}

/// Runs the body on its own task so a panic is reported instead of
/// unwinding through the teardown path.
async fn run_body(
    body: Arc<dyn Body>,
    env: BodyEnv,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let mut task = tokio::spawn(async move { body.run(env).await });
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            task.abort();
            match task.await {
                Err(err) if err.is_panic() => {
                    warn!(error = %panic_message(err), "body panicked while being cancelled");
                }
                _ => {}
            }
            Err(PipelineError::Cancelled)
        }
        joined = &mut task => match joined {
            Ok(result) => result.map_err(PipelineError::Body),
            Err(err) if err.is_panic() => {
                Err(PipelineError::Body(BodyError::Panicked(panic_message(err))))
            }
            Err(_) => Err(PipelineError::Cancelled),
        },
    }
}

fn panic_message(err: JoinError) -> String {
    let payload: Box<dyn Any + Send> = match err.try_into_panic() {
        Ok(payload) => payload,
        Err(other) => return other.to_string(),
    };
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("non-string panic payload"))
}

fn append_teardown_note<E: Display>(primary: Option<&PipelineError>, teardown: &E) -> String {
    primary.map_or_else(
        || format!("teardown failed: {teardown}"),
        |err| format!("{err} (teardown also failed: {teardown})"),
    )
}
