//! BDD step definitions for janitor behaviour.

use relaunch::config::parse_platforms;
use relaunch::janitor::Janitor;
use relaunch::launch::Platform;
use relaunch::launch_cli::files;
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{JanitorContext, SweepOutcome, build_config};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a work directory for platforms \"{platforms}\"")]
fn configured_janitor(mut janitor_context: JanitorContext, platforms: String) -> JanitorContext {
    let parsed = parse_platforms(platforms.split(','))
        .unwrap_or_else(|err| panic!("scenario names known platforms: {err}"));
    janitor_context.config = Some(build_config(&janitor_context.work_dir, parsed));
    janitor_context
}

#[given("a leftover deployment \"{deployment}\" for platform \"{platform}\"")]
fn leftover_deployment(
    janitor_context: JanitorContext,
    deployment: String,
    platform: String,
) -> JanitorContext {
    let platform: Platform = platform
        .trim()
        .parse()
        .unwrap_or_else(|err| panic!("scenario names a known platform: {err}"));
    let dir = janitor_context.work_dir.join(platform.as_str());
    std::fs::create_dir_all(dir.as_std_path())
        .unwrap_or_else(|err| panic!("create platform dir: {err}"));
    std::fs::write(files::info_path(&dir, deployment.trim()).as_std_path(), "{}")
        .unwrap_or_else(|err| panic!("write info file: {err}"));
    janitor_context
}

#[given("the launch tool deletes {count:u32} deployments")]
fn launch_tool_deletes(janitor_context: JanitorContext, count: u32) -> JanitorContext {
    for _ in 0..count {
        janitor_context.runner.push_success();
    }
    janitor_context
}

#[given("the launch tool fails to delete deployments")]
fn launch_tool_fails(janitor_context: JanitorContext) -> JanitorContext {
    janitor_context.runner.push_failure(1);
    janitor_context
}

#[when("I run the janitor sweep")]
fn run_sweep(mut janitor_context: JanitorContext) -> Result<JanitorContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let config = janitor_context
        .config
        .clone()
        .ok_or_else(|| StepError::Assertion(String::from("janitor is not configured")))?;
    let janitor = Janitor::new(config, janitor_context.runner.clone());
    janitor_context.outcome = Some(match runtime.block_on(janitor.sweep()) {
        Ok(summary) => SweepOutcome::Success(summary),
        Err(err) => SweepOutcome::Failure(err.to_string()),
    });
    Ok(janitor_context)
}

#[then("the janitor reports deleting {count:u32} deployments")]
fn reports_deletions(janitor_context: &JanitorContext, count: u32) -> Result<(), StepError> {
    let Some(outcome) = janitor_context.outcome.as_ref() else {
        return Err(StepError::Assertion(String::from("missing outcome")));
    };
    let SweepOutcome::Success(summary) = outcome else {
        return Err(StepError::Assertion(format!(
            "expected success, got: {outcome:?}"
        )));
    };
    if summary.deleted_deployments() == count as usize {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} deletions, got {summary:?}"
        )))
    }
}

#[then("no info files remain")]
fn no_info_files_remain(janitor_context: &JanitorContext) -> Result<(), StepError> {
    for platform in Platform::ALL {
        let remaining = files::list_deployments(&janitor_context.work_dir.join(platform.as_str()))
            .map_err(|err| StepError::Assertion(err.to_string()))?;
        if !remaining.is_empty() {
            return Err(StepError::Assertion(format!(
                "{platform} still has deployments: {remaining:?}"
            )));
        }
    }
    Ok(())
}

#[then("the janitor reports \"{deployment}\" remains")]
fn reports_not_clean(janitor_context: &JanitorContext, deployment: String) -> Result<(), StepError> {
    let Some(outcome) = janitor_context.outcome.as_ref() else {
        return Err(StepError::Assertion(String::from("missing outcome")));
    };
    let SweepOutcome::Failure(message) = outcome else {
        return Err(StepError::Assertion(String::from(
            "expected sweep to fail, got success",
        )));
    };
    if message.contains("deployments remain after janitor sweep") && message.contains(deployment.trim())
    {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected not-clean error naming {deployment}, got: {message}"
        )))
    }
}
