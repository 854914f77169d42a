//! Unit tests for the `relaunch` CLI binary implementation.

use super::*;
use relaunch::pipeline::{PipelineError, PlatformReport};
use relaunch::test_support::EnvGuard;
use rstest::{fixture, rstest};
use tempfile::TempDir;

#[fixture]
fn config() -> PipelineConfig {
    PipelineConfig {
        launch_bin: String::from("dcos-launch"),
        template_url: String::from("https://example.test/cluster.json"),
        deployment_prefix: String::from("relaunch"),
        provider: String::from("aws"),
        region: String::from("us-west-2"),
        key_name: None,
        branch: String::from("main"),
        build_id: Some(String::from("42")),
        work_dir: String::from(".relaunch"),
        platforms: String::from("linux,windows"),
        auth_uid: String::from("bootstrapuser"),
        auth_password: String::from("deleteme"),
        auth_scheme: String::from("https"),
        login_path: String::from("/acs/api/v1/auth/login"),
        accept_invalid_certs: true,
        login_timeout_secs: 30,
        max_attempts: None,
        retry_delay_secs: 0,
    }
}

#[rstest]
#[case(vec![])]
#[case(vec![String::from("  ")])]
fn validate_command_args_rejects_empty_program(#[case] args: Vec<String>) {
    let err = validate_command_args(&args).expect_err("empty program should be rejected");
    assert!(matches!(err, CliError::InvalidCommand(_)), "unexpected error: {err}");
}

#[rstest]
#[case(vec![String::from("make"), String::from("test")])]
#[case(vec![String::from("sh"), String::from("-c"), String::from("make\nmake test")])]
#[case(vec![String::from("printf"), String::from("a\tb\r\n")])]
fn validate_command_args_accepts_any_argument_text(#[case] args: Vec<String>) {
    assert!(validate_command_args(&args).is_ok());
}

#[cfg(unix)]
#[tokio::test]
async fn shutdown_signal_resolves_on_terminate() {
    let received = shutdown_signal().expect("signal handlers should register");
    let status = std::process::Command::new("kill")
        .args(["-TERM", &process::id().to_string()])
        .status()
        .expect("kill should run");
    assert!(status.success(), "kill failed: {status}");

    let signal = tokio::time::timeout(std::time::Duration::from_secs(5), received)
        .await
        .expect("SIGTERM should be observed");
    assert_eq!(signal, "SIGTERM");
}

#[rstest]
fn select_platforms_defaults_to_configured_list(config: PipelineConfig) {
    let platforms = select_platforms(&config, &[]).expect("configured platforms are valid");
    assert_eq!(platforms, vec![Platform::Linux, Platform::Windows]);
}

#[rstest]
fn select_platforms_prefers_command_line(config: PipelineConfig) {
    let platforms = select_platforms(&config, &[String::from("mac"), String::from("darwin")])
        .expect("requested platforms are valid");
    assert_eq!(platforms, vec![Platform::Darwin]);
}

#[rstest]
fn select_platforms_rejects_unknown_names(config: PipelineConfig) {
    let err = select_platforms(&config, &[String::from("solaris")])
        .expect_err("unknown platform should fail");
    assert!(
        matches!(err, CliError::Config(ConfigError::Invalid(ref message)) if message.contains("solaris")),
        "unexpected error: {err}"
    );
}

#[test]
fn write_summary_prints_one_line_per_platform() {
    let summary = FanOutSummary {
        reports: vec![
            PlatformReport {
                platform: Platform::Linux,
                attempts: 1,
                result: Ok(()),
            },
            PlatformReport {
                platform: Platform::Windows,
                attempts: 2,
                result: Err(PipelineError::Cancelled),
            },
        ],
    };
    let mut buf = Vec::new();

    write_summary(&mut buf, &summary).expect("write to buffer");

    let rendered = String::from_utf8(buf).expect("utf8");
    assert_eq!(
        rendered,
        "linux: passed (1 attempt)\nwindows: failed (2 attempts): cancelled\nrelaunch: cancelled\n"
    );
}

#[test]
fn write_error_writes_cli_error() {
    let mut buf = Vec::new();
    let err = CliError::InvalidCommand(String::from("build command is empty"));
    write_error(&mut buf, &err);
    let rendered = String::from_utf8(buf).expect("utf8");
    assert!(
        rendered.contains("invalid command argument: build command is empty"),
        "rendered: {rendered}"
    );
}

#[tokio::test]
async fn run_command_reports_missing_template_before_provisioning() {
    let _guard = EnvGuard::set_vars(&[
        ("RELAUNCH_TEMPLATE_URL", ""),
        ("RELAUNCH_AUTH_PASSWORD", "deleteme"),
    ])
    .await;

    let result = run_command(RunCommand {
        platforms: Vec::new(),
        command: vec![String::from("make")],
    })
    .await;

    assert!(
        matches!(result, Err(CliError::Config(_))),
        "expected configuration error, got {result:?}"
    );
}

#[tokio::test]
async fn teardown_of_empty_work_dir_succeeds() {
    let tmp = TempDir::new().expect("tempdir");
    let work_dir = tmp.path().to_string_lossy().into_owned();
    let _guard = EnvGuard::set_vars(&[
        ("RELAUNCH_WORK_DIR", work_dir.as_str()),
        ("RELAUNCH_PLATFORMS", "linux"),
    ])
    .await;

    let result = teardown_command(TeardownCommand {
        platforms: Vec::new(),
    })
    .await;

    assert!(matches!(result, Ok(0)), "unexpected result: {result:?}");
}
