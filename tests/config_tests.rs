//! Unit tests for pipeline configuration loading and validation.

use std::time::Duration;

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use relaunch::config::{ConfigError, PipelineConfig, parse_platforms};
use relaunch::launch::Platform;
use relaunch::test_support::EnvGuard;
use rstest::*;
use tempfile::TempDir;

#[fixture]
fn valid_config() -> PipelineConfig {
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
        platforms: String::from("linux,darwin,windows"),
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
fn valid_config_passes_validation(valid_config: PipelineConfig) {
    assert_eq!(valid_config.validate(), Ok(()));
}

/// Every required field names both its environment variable and its TOML
/// key when missing.
#[rstest]
#[case::launch_bin("RELAUNCH_LAUNCH_BIN", "launch_bin")]
#[case::template_url("RELAUNCH_TEMPLATE_URL", "template_url")]
#[case::deployment_prefix("RELAUNCH_DEPLOYMENT_PREFIX", "deployment_prefix")]
#[case::provider("RELAUNCH_PROVIDER", "provider")]
#[case::region("RELAUNCH_REGION", "region")]
#[case::branch("RELAUNCH_BRANCH", "branch")]
#[case::work_dir("RELAUNCH_WORK_DIR", "work_dir")]
#[case::auth_uid("RELAUNCH_AUTH_UID", "auth_uid")]
#[case::auth_password("RELAUNCH_AUTH_PASSWORD", "auth_password")]
fn missing_field_errors_are_actionable(
    valid_config: PipelineConfig,
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_config;
    let field = match toml_key {
        "launch_bin" => &mut cfg.launch_bin,
        "template_url" => &mut cfg.template_url,
        "deployment_prefix" => &mut cfg.deployment_prefix,
        "provider" => &mut cfg.provider,
        "region" => &mut cfg.region,
        "branch" => &mut cfg.branch,
        "work_dir" => &mut cfg.work_dir,
        "auth_uid" => &mut cfg.auth_uid,
        "auth_password" => &mut cfg.auth_password,
        other => panic!("unexpected field {other}"),
    };
    *field = String::from("   ");

    let error = cfg.validate().expect_err("blank field should fail");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error:?}");
    };
    assert!(message.contains(env_var), "error should mention env var: {message}");
    assert!(message.contains(toml_key), "error should mention TOML key: {message}");
    assert!(
        message.contains("relaunch.toml"),
        "error should mention config file: {message}"
    );
}

#[rstest]
fn validation_rejects_unknown_scheme(valid_config: PipelineConfig) {
    let cfg = PipelineConfig {
        auth_scheme: String::from("ftp"),
        ..valid_config
    };

    let error = cfg.validate().expect_err("ftp is not a login scheme");
    assert!(
        matches!(error, ConfigError::Invalid(ref message) if message.contains("ftp")),
        "unexpected error: {error}"
    );
}

#[rstest]
fn validation_rejects_unknown_platform(valid_config: PipelineConfig) {
    let cfg = PipelineConfig {
        platforms: String::from("linux,plan9"),
        ..valid_config
    };

    let error = cfg.validate().expect_err("plan9 is not a platform");
    assert!(
        matches!(error, ConfigError::Invalid(ref message) if message.contains("plan9")),
        "unexpected error: {error}"
    );
}

#[rstest]
#[case("linux", vec![Platform::Linux])]
#[case(" windows , linux ", vec![Platform::Windows, Platform::Linux])]
#[case("mac,darwin,linux,linux", vec![Platform::Darwin, Platform::Linux])]
fn parse_platforms_keeps_first_seen_order(#[case] raw: &str, #[case] expected: Vec<Platform>) {
    let platforms = parse_platforms(raw.split(',')).expect("platform list is valid");
    assert_eq!(platforms, expected);
}

#[rstest]
#[case("")]
#[case(" , ,")]
fn parse_platforms_rejects_empty_lists(#[case] raw: &str) {
    let error = parse_platforms(raw.split(',')).expect_err("empty list should fail");
    assert!(
        matches!(error, ConfigError::Invalid(ref message) if message.contains("RELAUNCH_PLATFORMS")),
        "unexpected error: {error}"
    );
}

#[rstest]
fn plan_for_carries_ci_coordinates(valid_config: PipelineConfig) {
    let plan = valid_config
        .plan_for(Platform::Windows, "42")
        .expect("plan should build");

    let spec = plan.spec(3);
    assert_eq!(spec.platform, Platform::Windows);
    assert_eq!(spec.attempt, 3);
    assert_eq!(spec.deployment_name, "relaunch-windows-main-42-3");
}

#[rstest]
fn plan_for_rejects_blank_template(valid_config: PipelineConfig) {
    let cfg = PipelineConfig {
        template_url: String::new(),
        ..valid_config
    };

    let error = cfg
        .plan_for(Platform::Linux, "42")
        .expect_err("template is required");
    assert!(matches!(error, ConfigError::Invalid(_)), "unexpected error: {error}");
}

#[rstest]
fn retry_policy_defaults_to_unbounded(valid_config: PipelineConfig) {
    let policy = valid_config.retry_policy();
    assert_eq!(policy.max_attempts, None);
    assert_eq!(policy.retry_delay, Duration::ZERO);
}

#[rstest]
fn retry_policy_honours_ceiling_and_delay(valid_config: PipelineConfig) {
    let cfg = PipelineConfig {
        max_attempts: Some(4),
        retry_delay_secs: 30,
        ..valid_config
    };

    let policy = cfg.retry_policy();
    assert_eq!(policy.max_attempts, Some(4));
    assert_eq!(policy.retry_delay, Duration::from_secs(30));
}

#[rstest]
fn login_timeout_follows_configured_seconds(valid_config: PipelineConfig) {
    let cfg = PipelineConfig {
        login_timeout_secs: 5,
        ..valid_config
    };
    assert_eq!(cfg.login_timeout(), Duration::from_secs(5));
}

#[rstest]
fn validation_rejects_zero_login_timeout(valid_config: PipelineConfig) {
    let cfg = PipelineConfig {
        login_timeout_secs: 0,
        ..valid_config
    };

    let error = cfg.validate().expect_err("a zero timeout would fail every login");
    assert!(
        matches!(error, ConfigError::Invalid(ref message) if message.contains("RELAUNCH_LOGIN_TIMEOUT_SECS")),
        "unexpected error: {error}"
    );
}

#[rstest]
fn work_dir_for_nests_platform_directory(valid_config: PipelineConfig) {
    assert_eq!(
        valid_config.work_dir_for(Platform::Darwin),
        Utf8PathBuf::from(".relaunch/darwin")
    );
}

#[rstest]
fn resolved_build_id_prefers_configured_value(valid_config: PipelineConfig) {
    assert_eq!(valid_config.resolved_build_id(), "42");
}

#[rstest]
fn resolved_build_id_generates_local_identifier(valid_config: PipelineConfig) {
    let cfg = PipelineConfig {
        build_id: Some(String::from("  ")),
        ..valid_config
    };

    let first = cfg.resolved_build_id();
    let second = cfg.resolved_build_id();
    assert!(first.starts_with("local-"), "unexpected build id: {first}");
    assert_ne!(first, second, "generated ids should be unique");
}

#[rstest]
fn credentials_trim_user_id(valid_config: PipelineConfig) {
    let cfg = PipelineConfig {
        auth_uid: String::from("  ci-user "),
        ..valid_config
    };
    assert_eq!(cfg.credentials().uid, "ci-user");
}

#[tokio::test]
async fn load_merges_config_file_and_environment() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let tmp_root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
    Dir::open_ambient_dir(&tmp_root, ambient_authority())
        .unwrap_or_else(|err| panic!("open temp dir: {err}"))
        .write(
            "relaunch.toml",
            concat!(
                "template_url = \"https://example.test/from-file.json\"\n",
                "branch = \"release\"\n",
                "platforms = \"linux\"\n",
                "max_attempts = 5\n",
            ),
        )
        .unwrap_or_else(|err| panic!("write config: {err}"));
    let config_path = tmp_root.join("relaunch.toml");

    let _guard = EnvGuard::set_vars(&[
        ("RELAUNCH_CONFIG_PATH", config_path.as_str()),
        ("RELAUNCH_REGION", "eu-central-1"),
        ("RELAUNCH_AUTH_PASSWORD", "from-env"),
    ])
    .await;

    let cfg = PipelineConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("config should load: {err}"));

    assert_eq!(cfg.template_url, "https://example.test/from-file.json");
    assert_eq!(cfg.branch, "release");
    assert_eq!(cfg.region, "eu-central-1");
    assert_eq!(cfg.auth_password, "from-env");
    assert_eq!(cfg.max_attempts, Some(5));
    assert_eq!(cfg.provider, "aws", "unset fields keep their defaults");
    assert_eq!(cfg.login_timeout_secs, 30);
    assert_eq!(cfg.platforms().ok(), Some(vec![Platform::Linux]));
}
