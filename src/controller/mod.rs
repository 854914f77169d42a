//! Provision-and-recover loop for a single platform.
//!
//! The controller creates a cluster, blocks until it is usable, and on any
//! failure other than operator cancellation destroys it and starts over
//! under a fresh deployment name. A ready handle is returned to the caller,
//! who owns its teardown.

use std::fmt;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::launch::{ClusterHandle, LaunchClient, LaunchFailure, LaunchPlan, LaunchSpec};

/// States the controller moves through.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ControllerState {
    /// Nothing has happened yet.
    Idle,
    /// Blocked on `create`.
    Creating,
    /// Blocked on `wait`.
    Waiting,
    /// Tearing down a failed attempt before retrying.
    Destroying,
    /// The cluster is usable.
    Ready,
    /// The operator cancelled the run.
    Cancelled,
    /// The configured attempt ceiling was reached.
    Exhausted,
}

impl ControllerState {
    /// Returns `true` for states the controller never leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Cancelled | Self::Exhausted)
    }
}

/// Retry limits. The default retries until cancelled, with no delay.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts allowed; `None` means unbounded.
    pub max_attempts: Option<u32>,
    /// Pause between a failed attempt's teardown and the next create.
    pub retry_delay: Duration,
}

impl RetryPolicy {
    /// Unbounded retries with no delay.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_attempts: None,
            retry_delay: Duration::ZERO,
        }
    }

    /// Caps the number of attempts. Zero is treated as one.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(if max_attempts == 0 { 1 } else { max_attempts });
        self
    }

    /// Sets the delay between attempts.
    #[must_use]
    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

/// Why a controller stopped without a ready cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AbortReason {
    /// The operator cancelled the run.
    Cancelled,
    /// Every allowed attempt failed.
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Message of the last failure.
        last_error: String,
    },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::Exhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "gave up after {attempts} attempts; last error: {last_error}"
            ),
        }
    }
}

/// Terminal result of a controller run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The cluster is ready; the caller must destroy it.
    Ready(ClusterHandle),
    /// The controller stopped early.
    Aborted {
        /// Why the controller stopped.
        reason: AbortReason,
        /// Cluster left running for the caller's cleanup, if any.
        handle: Option<ClusterHandle>,
    },
}

/// Drives create → wait → (destroy → create)* for one platform.
pub struct RetryController<'a, C: LaunchClient> {
    client: &'a C,
    plan: &'a LaunchPlan,
    policy: RetryPolicy,
    cancel: CancellationToken,
    state: ControllerState,
    attempt: u32,
    creates: u32,
}

impl<C: LaunchClient> fmt::Debug for RetryController<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryController")
            .field("platform", &self.plan.platform)
            .field("policy", &self.policy)
            .field("state", &self.state)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

enum Step {
    Retry(String),
    Finish(Outcome),
}

impl<'a, C: LaunchClient> RetryController<'a, C> {
    /// Creates a controller in the [`ControllerState::Idle`] state.
    #[must_use]
    pub const fn new(
        client: &'a C,
        plan: &'a LaunchPlan,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            plan,
            policy,
            cancel,
            state: ControllerState::Idle,
            attempt: 0,
            creates: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ControllerState {
        self.state
    }

    /// Attempt number the next (or current) spec carries.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Number of creates issued so far.
    #[must_use]
    pub const fn attempts_made(&self) -> u32 {
        self.creates
    }

    /// Runs the loop to a terminal state.
    pub async fn run(&mut self) -> Outcome {
        loop {
            if self.cancel.is_cancelled() {
                return self.cancelled(None);
            }

            let spec = self.plan.spec(self.attempt);
            let step = self.attempt_once(&spec).await;
            match step {
                Step::Finish(outcome) => return outcome,
                Step::Retry(message) => {
                    if let Some(outcome) = self.advance(message).await {
                        return outcome;
                    }
                }
            }
        }
    }

    async fn attempt_once(&mut self, spec: &LaunchSpec) -> Step {
        let client = self.client;
        self.enter(ControllerState::Creating, spec);
        self.creates = self.creates.saturating_add(1);
        let handle = match client.create(spec).await {
            Ok(handle) => handle,
            Err(err) if err.is_cancellation() => {
                return Step::Finish(self.cancelled(Some(ClusterHandle::provisional(spec))));
            }
            Err(err) => {
                warn!(
                    platform = %spec.platform,
                    attempt = spec.attempt,
                    deployment = %spec.deployment_name,
                    error = %err,
                    "create failed"
                );
                self.retire(ClusterHandle::provisional(spec)).await;
                return Step::Retry(err.to_string());
            }
        };

        self.enter(ControllerState::Waiting, spec);
        let waited = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            result = client.wait(&handle) => Some(result),
        };

        match waited {
            None => Step::Finish(self.cancelled(Some(handle))),
            Some(Ok(())) => {
                self.enter(ControllerState::Ready, spec);
                Step::Finish(Outcome::Ready(handle))
            }
            Some(Err(err)) if err.is_cancellation() => Step::Finish(self.cancelled(Some(handle))),
            Some(Err(err)) => {
                warn!(
                    platform = %spec.platform,
                    attempt = spec.attempt,
                    deployment = %spec.deployment_name,
                    error = %err,
                    "cluster did not become ready"
                );
                self.retire(handle).await;
                Step::Retry(err.to_string())
            }
        }
    }

    /// Moves to the next attempt, or returns the terminal outcome when the
    /// ceiling is reached or the delay is cancelled.
    async fn advance(&mut self, last_error: String) -> Option<Outcome> {
        let attempts = self.attempt.saturating_add(1);
        if self
            .policy
            .max_attempts
            .is_some_and(|max| attempts >= max)
        {
            self.state = ControllerState::Exhausted;
            warn!(platform = %self.plan.platform, attempts, "giving up on provisioning");
            return Some(Outcome::Aborted {
                reason: AbortReason::Exhausted {
                    attempts,
                    last_error,
                },
                handle: None,
            });
        }

        self.attempt = attempts;
        if !self.policy.retry_delay.is_zero() {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Some(self.cancelled(None)),
                () = sleep(self.policy.retry_delay) => {}
            }
        }
        None
    }

    /// Best-effort teardown of a failed attempt.
    async fn retire(&mut self, handle: ClusterHandle) {
        self.state = ControllerState::Destroying;
        let client = self.client;
        let deployment = handle.deployment_name.clone();
        if let Err(err) = client.destroy(handle).await {
            warn!(
                platform = %self.plan.platform,
                %deployment,
                error = %err,
                "teardown of failed attempt also failed"
            );
        }
    }

    fn cancelled(&mut self, handle: Option<ClusterHandle>) -> Outcome {
        self.state = ControllerState::Cancelled;
        info!(
            platform = %self.plan.platform,
            attempt = self.attempt,
            "provisioning cancelled"
        );
        Outcome::Aborted {
            reason: AbortReason::Cancelled,
            handle,
        }
    }

    fn enter(&mut self, state: ControllerState, spec: &LaunchSpec) {
        self.state = state;
        info!(
            platform = %spec.platform,
            attempt = spec.attempt,
            deployment = %spec.deployment_name,
            state = ?state,
            "controller transition"
        );
    }
}
