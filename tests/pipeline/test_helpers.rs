//! Shared fixtures for pipeline BDD scenarios.

use relaunch::controller::RetryPolicy;
use relaunch::launch::Platform;
use relaunch::test_support::{BodyBehaviour, ScriptedAuthenticator, ScriptedLaunchClient};
use rstest::fixture;

#[derive(Clone, Debug)]
pub struct PipelineContext {
    pub platform: Platform,
    pub client: ScriptedLaunchClient,
    pub authenticator: ScriptedAuthenticator,
    pub body: BodyBehaviour,
    pub policy: RetryPolicy,
    pub outcome: Option<PipelineOutcome>,
}

/// What a finished pipeline reported, flattened for assertions.
#[derive(Clone, Debug)]
pub struct PipelineOutcome {
    pub passed: bool,
    pub cancelled: bool,
    pub attempts: u32,
    pub rendered: String,
    pub body_urls: Vec<String>,
}

#[fixture]
pub fn pipeline_context() -> PipelineContext {
    PipelineContext {
        platform: Platform::Linux,
        client: ScriptedLaunchClient::new(),
        authenticator: ScriptedAuthenticator::new(),
        body: BodyBehaviour::Pass,
        policy: RetryPolicy::unbounded(),
        outcome: None,
    }
}
