//! Concurrent fan-out of per-platform pipelines.

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::command::SIGINT_EXIT_CODE;
use crate::launch::Platform;
use crate::pipeline::{PlatformReport, PlatformRunner};

/// Aggregated result of a fan-out run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FanOutSummary {
    /// One report per platform, ordered by platform.
    pub reports: Vec<PlatformReport>,
}

impl FanOutSummary {
    /// Returns `true` when at least one platform ran and every platform
    /// passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.reports.is_empty() && self.reports.iter().all(PlatformReport::passed)
    }

    /// Returns `true` when any platform stopped because of cancellation.
    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.reports.iter().any(PlatformReport::cancelled)
    }

    /// Process exit code: 0 when everything passed, 130 when cancelled, 1
    /// otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else if self.cancelled() {
            SIGINT_EXIT_CODE
        } else {
            1
        }
    }
}

/// Runs one task per platform and waits for all of them.
///
/// A failing platform never stops the others; only the shared
/// cancellation token does.
pub struct FanOutCoordinator {
    runners: Vec<Box<dyn PlatformRunner>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for FanOutCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutCoordinator")
            .field(
                "platforms",
                &self
                    .runners
                    .iter()
                    .map(|runner| runner.platform())
                    .collect::<Vec<_>>(),
            )
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl FanOutCoordinator {
    /// Creates a coordinator broadcasting `cancel` to every runner.
    #[must_use]
    pub const fn new(cancel: CancellationToken) -> Self {
        Self {
            runners: Vec::new(),
            cancel,
        }
    }

    /// Adds a runner.
    #[must_use]
    pub fn with_runner(mut self, runner: Box<dyn PlatformRunner>) -> Self {
        self.runners.push(runner);
        self
    }

    /// Token shared with every runner.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs every runner concurrently and collects their reports.
    pub async fn run(self) -> FanOutSummary {
        let mut tasks = JoinSet::new();
        for runner in self.runners {
            let platform: Platform = runner.platform();
            let cancel = self.cancel.clone();
            info!(%platform, "starting platform");
            tasks.spawn(async move {
                // An inner task keeps the platform known when the runner
                // panics.
                match tokio::spawn(runner.run(cancel)).await {
                    Ok(report) => report,
                    Err(err) => {
                        error!(%platform, error = %err, "platform task died");
                        PlatformReport::crashed(platform, &err)
                    }
                }
            });
        }

        let mut reports = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(err) => error!(error = %err, "coordinator task died"),
            }
        }
        reports.sort_by_key(|report| report.platform);
        FanOutSummary { reports }
    }
}
