//! Shared fixtures for janitor BDD scenarios.

use std::sync::Arc;

use camino::Utf8PathBuf;
use relaunch::janitor::{JanitorConfig, SweepSummary};
use relaunch::launch::Platform;
use relaunch::launch_cli::DEFAULT_LAUNCH_BIN;
use relaunch::test_support::ScriptedRunner;
use rstest::fixture;
use tempfile::TempDir;

#[derive(Clone, Debug)]
pub enum SweepOutcome {
    Success(SweepSummary),
    Failure(String),
}

#[derive(Clone, Debug)]
pub struct JanitorContext {
    pub config: Option<JanitorConfig>,
    pub runner: ScriptedRunner,
    pub outcome: Option<SweepOutcome>,
    pub work_dir: Utf8PathBuf,
    pub(crate) work_tmp: Arc<TempDir>,
}

#[fixture]
pub fn janitor_context() -> JanitorContext {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let work_dir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
    JanitorContext {
        config: None,
        runner: ScriptedRunner::new(),
        outcome: None,
        work_dir,
        work_tmp: Arc::new(tmp),
    }
}

pub fn build_config(work_dir: &Utf8PathBuf, platforms: Vec<Platform>) -> JanitorConfig {
    JanitorConfig::new(work_dir.clone(), DEFAULT_LAUNCH_BIN, platforms)
        .unwrap_or_else(|err| panic!("janitor config should be valid: {err}"))
}
