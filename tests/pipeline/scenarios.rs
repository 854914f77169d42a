//! BDD scenarios for the per-platform pipeline.

use rstest_bdd_macros::scenario;

use super::test_helpers::{PipelineContext, pipeline_context};

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Retry provisioning until the cluster is ready"
)]
fn scenario_retry_until_ready(pipeline_context: PipelineContext) {
    let _ = pipeline_context;
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Stop retrying when the launch tool reports cancellation"
)]
fn scenario_stop_on_cancellation(pipeline_context: PipelineContext) {
    let _ = pipeline_context;
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Tear down the cluster when the body fails"
)]
fn scenario_teardown_after_body_failure(pipeline_context: PipelineContext) {
    let _ = pipeline_context;
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Teardown failure does not mask a passing body"
)]
fn scenario_teardown_failure_is_not_fatal(pipeline_context: PipelineContext) {
    let _ = pipeline_context;
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Give up after the attempt ceiling"
)]
fn scenario_attempt_ceiling(pipeline_context: PipelineContext) {
    let _ = pipeline_context;
}
