//! BDD step definitions for the per-platform pipeline.

use std::sync::Arc;

use relaunch::auth::Credentials;
use relaunch::pipeline::PlatformPipeline;
use relaunch::test_support::{BodyBehaviour, ScriptedBody, ScriptedStep, sample_plan};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{PipelineContext, PipelineOutcome};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn outcome_of(context: &PipelineContext) -> Result<&PipelineOutcome, StepError> {
    context
        .outcome
        .as_ref()
        .ok_or_else(|| StepError::Assertion(String::from("missing outcome")))
}

#[given("a pipeline for platform \"{platform}\"")]
fn pipeline_for_platform(mut pipeline_context: PipelineContext, platform: String) -> PipelineContext {
    pipeline_context.platform = platform
        .trim()
        .parse()
        .unwrap_or_else(|err| panic!("scenario names a known platform: {err}"));
    pipeline_context
}

#[given("the launch tool fails to become ready {failures:u32} times")]
fn wait_fails(pipeline_context: PipelineContext, failures: u32) -> PipelineContext {
    pipeline_context
        .client
        .script_wait((0..failures).map(|_| ScriptedStep::Fail));
    pipeline_context
}

#[given("the launch tool reports cancellation while waiting")]
fn wait_cancels(pipeline_context: PipelineContext) -> PipelineContext {
    pipeline_context.client.script_wait([ScriptedStep::Cancel]);
    pipeline_context
}

#[given("the launch tool cannot destroy clusters")]
fn destroy_fails(pipeline_context: PipelineContext) -> PipelineContext {
    pipeline_context.client.fail_on_destroy();
    pipeline_context
}

#[given("the body fails with \"{message}\"")]
fn body_fails(mut pipeline_context: PipelineContext, message: String) -> PipelineContext {
    pipeline_context.body = BodyBehaviour::Fail(message);
    pipeline_context
}

#[given("the pipeline allows at most {attempts:u32} attempts")]
fn attempt_ceiling(mut pipeline_context: PipelineContext, attempts: u32) -> PipelineContext {
    pipeline_context.policy = pipeline_context.policy.with_max_attempts(attempts);
    pipeline_context
}

#[when("I run the pipeline")]
fn run_pipeline(pipeline_context: PipelineContext) -> Result<PipelineContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let body = ScriptedBody::new(pipeline_context.body.clone());
    let pipeline = PlatformPipeline::new(
        pipeline_context.client.clone(),
        sample_plan(pipeline_context.platform),
        Arc::new(pipeline_context.authenticator.clone()),
        Credentials::new("bootstrapuser", "deleteme"),
        Arc::new(body.clone()),
    )
    .with_policy(pipeline_context.policy);

    let cancel = CancellationToken::new();
    let report = runtime.block_on(async { pipeline.execute(&cancel).await });

    Ok(PipelineContext {
        outcome: Some(PipelineOutcome {
            passed: report.passed(),
            cancelled: report.cancelled(),
            attempts: report.attempts,
            rendered: report.to_string(),
            body_urls: body.runs().into_iter().map(|env| env.cluster_url).collect(),
        }),
        ..pipeline_context
    })
}

#[then("the platform passes and reports {attempts:u32} attempts")]
fn platform_passes(pipeline_context: &PipelineContext, attempts: u32) -> Result<(), StepError> {
    let outcome = outcome_of(pipeline_context)?;
    if !outcome.passed {
        return Err(StepError::Assertion(format!(
            "expected pass, got: {}",
            outcome.rendered
        )));
    }
    if outcome.attempts != attempts {
        return Err(StepError::Assertion(format!(
            "expected {attempts} attempts, got {}",
            outcome.attempts
        )));
    }
    Ok(())
}

#[then("the platform is cancelled")]
fn platform_cancelled(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    let outcome = outcome_of(pipeline_context)?;
    if outcome.cancelled {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected cancellation, got: {}",
            outcome.rendered
        )))
    }
}

#[then("the platform fails with \"{message}\"")]
fn platform_fails(pipeline_context: &PipelineContext, message: String) -> Result<(), StepError> {
    let outcome = outcome_of(pipeline_context)?;
    if outcome.passed || outcome.cancelled {
        return Err(StepError::Assertion(format!(
            "expected failure, got: {}",
            outcome.rendered
        )));
    }
    if outcome.rendered.contains(message.trim()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected report to mention '{message}', got: {}",
            outcome.rendered
        )))
    }
}

#[then("the attempts used deployments \"{names}\"")]
fn attempts_used_deployments(
    pipeline_context: &PipelineContext,
    names: String,
) -> Result<(), StepError> {
    let expected: Vec<&str> = names.split(',').map(str::trim).collect();
    let created: Vec<String> = pipeline_context
        .client
        .created()
        .into_iter()
        .map(|spec| spec.deployment_name)
        .collect();
    if created == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected deployments {expected:?}, got {created:?}"
        )))
    }
}

#[then("the launch tool received {count:u32} create calls")]
fn create_calls(pipeline_context: &PipelineContext, count: u32) -> Result<(), StepError> {
    let created = pipeline_context.client.created().len();
    if created == count as usize {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} create calls, got {created}"
        )))
    }
}

#[then("the launch tool received {count:u32} destroy calls")]
fn destroy_calls(pipeline_context: &PipelineContext, count: u32) -> Result<(), StepError> {
    let destroyed = pipeline_context.client.destroy_calls();
    if destroyed == count as usize {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} destroy calls, got {destroyed}"
        )))
    }
}

#[then("the body ran once against \"{url}\"")]
fn body_ran_once(pipeline_context: &PipelineContext, url: String) -> Result<(), StepError> {
    let outcome = outcome_of(pipeline_context)?;
    if outcome.body_urls == [url.trim()] {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected one body run against {url}, got {:?}",
            outcome.body_urls
        )))
    }
}

#[then("the body never ran")]
fn body_never_ran(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    let outcome = outcome_of(pipeline_context)?;
    if outcome.body_urls.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no body runs, got {:?}",
            outcome.body_urls
        )))
    }
}
