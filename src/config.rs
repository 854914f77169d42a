//! Configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::auth::{Credentials, DEFAULT_LOGIN_PATH, DEFAULT_SCHEME};
use crate::controller::RetryPolicy;
use crate::launch::{LaunchPlan, Platform};
use crate::launch_cli::DEFAULT_LAUNCH_BIN;

/// Pipeline settings merged from defaults, `relaunch.toml`, and `RELAUNCH_*`
/// environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "RELAUNCH",
    discovery(
        app_name = "relaunch",
        env_var = "RELAUNCH_CONFIG_PATH",
        config_file_name = "relaunch.toml",
        dotfile_name = ".relaunch.toml",
        project_file_name = "relaunch.toml"
    )
)]
pub struct PipelineConfig {
    /// Path to the cluster launch executable.
    #[ortho_config(default = DEFAULT_LAUNCH_BIN.to_owned())]
    pub launch_bin: String,
    /// Template reference handed to the launch tool. Required.
    #[ortho_config(default = String::new())]
    pub template_url: String,
    /// Prefix for deployment names.
    #[ortho_config(default = "relaunch".to_owned())]
    pub deployment_prefix: String,
    /// Cloud provider understood by the launch tool.
    #[ortho_config(default = "aws".to_owned())]
    pub provider: String,
    /// Provider region.
    #[ortho_config(default = "us-west-2".to_owned())]
    pub region: String,
    /// Pre-registered SSH key name. When absent the launch tool generates
    /// one.
    pub key_name: Option<String>,
    /// Source branch under test.
    #[ortho_config(default = "local".to_owned())]
    pub branch: String,
    /// CI build identifier. A random one is generated when absent.
    pub build_id: Option<String>,
    /// Directory holding per-platform launch configs and info files.
    #[ortho_config(default = ".relaunch".to_owned())]
    pub work_dir: String,
    /// Comma-separated platforms to provision.
    #[ortho_config(default = "linux,darwin,windows".to_owned())]
    pub platforms: String,
    /// Login user id.
    #[ortho_config(default = "bootstrapuser".to_owned())]
    pub auth_uid: String,
    /// Login password. Required.
    #[ortho_config(default = String::new())]
    pub auth_password: String,
    /// URL scheme for the cluster endpoint.
    #[ortho_config(default = DEFAULT_SCHEME.to_owned())]
    pub auth_scheme: String,
    /// Login path on the cluster endpoint.
    #[ortho_config(default = DEFAULT_LOGIN_PATH.to_owned())]
    pub login_path: String,
    /// Whether self-signed cluster certificates are accepted.
    #[ortho_config(default = true)]
    pub accept_invalid_certs: bool,
    /// Seconds before a login request is abandoned.
    #[ortho_config(default = 30)]
    pub login_timeout_secs: u64,
    /// Attempt ceiling per platform. Unbounded when absent.
    pub max_attempts: Option<u32>,
    /// Seconds to wait between a failed attempt and the next create.
    #[ortho_config(default = 0)]
    pub retry_delay_secs: u64,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl PipelineConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to relaunch.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without parsing CLI arguments. Values merge
    /// defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("relaunch")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that supply each value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when a value cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, metadata) in [
            (
                &self.launch_bin,
                FieldMetadata::new("launch executable", "RELAUNCH_LAUNCH_BIN", "launch_bin"),
            ),
            (
                &self.template_url,
                FieldMetadata::new("cluster template URL", "RELAUNCH_TEMPLATE_URL", "template_url"),
            ),
            (
                &self.deployment_prefix,
                FieldMetadata::new(
                    "deployment name prefix",
                    "RELAUNCH_DEPLOYMENT_PREFIX",
                    "deployment_prefix",
                ),
            ),
            (
                &self.provider,
                FieldMetadata::new("cloud provider", "RELAUNCH_PROVIDER", "provider"),
            ),
            (
                &self.region,
                FieldMetadata::new("provider region", "RELAUNCH_REGION", "region"),
            ),
            (
                &self.branch,
                FieldMetadata::new("source branch", "RELAUNCH_BRANCH", "branch"),
            ),
            (
                &self.work_dir,
                FieldMetadata::new("work directory", "RELAUNCH_WORK_DIR", "work_dir"),
            ),
            (
                &self.auth_uid,
                FieldMetadata::new("login user id", "RELAUNCH_AUTH_UID", "auth_uid"),
            ),
            (
                &self.auth_password,
                FieldMetadata::new("login password", "RELAUNCH_AUTH_PASSWORD", "auth_password"),
            ),
        ] {
            Self::require_field(value, &metadata)?;
        }

        if self.login_timeout_secs == 0 {
            return Err(ConfigError::Invalid(String::from(
                "login_timeout_secs must be positive: set RELAUNCH_LOGIN_TIMEOUT_SECS or add login_timeout_secs to relaunch.toml",
            )));
        }
        if !matches!(self.auth_scheme.trim(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "auth_scheme must be http or https, got '{}'",
                self.auth_scheme
            )));
        }
        self.platforms()?;
        Ok(())
    }

    /// Parses the configured platform list, dropping duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unknown or missing platforms.
    pub fn platforms(&self) -> Result<Vec<Platform>, ConfigError> {
        parse_platforms(self.platforms.split(','))
    }

    /// CI build identifier, generating a random one when none is configured.
    #[must_use]
    pub fn resolved_build_id(&self) -> String {
        self.build_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map_or_else(
                || format!("local-{}", uuid::Uuid::new_v4().simple()),
                str::to_owned,
            )
    }

    /// Builds the launch plan for `platform`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the plan fails validation.
    pub fn plan_for(&self, platform: Platform, build_id: &str) -> Result<LaunchPlan, ConfigError> {
        LaunchPlan::builder(platform)
            .prefix(&self.deployment_prefix)
            .branch(&self.branch)
            .build_id(build_id)
            .template_url(&self.template_url)
            .provider(&self.provider)
            .region(&self.region)
            .key_name(self.key_name.clone())
            .build()
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Login credentials.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.auth_uid.trim(), self.auth_password.as_str())
    }

    /// Bound on a single login request.
    #[must_use]
    pub const fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    /// Retry policy derived from `max_attempts` and `retry_delay_secs`.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy =
            RetryPolicy::unbounded().with_retry_delay(Duration::from_secs(self.retry_delay_secs));
        match self.max_attempts {
            Some(max) => policy.with_max_attempts(max),
            None => policy,
        }
    }

    /// Work directory root.
    #[must_use]
    pub fn work_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.work_dir.trim())
    }

    /// Work subdirectory owned by `platform`'s pipeline.
    #[must_use]
    pub fn work_dir_for(&self, platform: Platform) -> Utf8PathBuf {
        self.work_dir().join(platform.as_str())
    }
}

/// Parses platform names, ignoring blanks and duplicates while keeping the
/// first-seen order.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] for an unknown name or an empty list.
pub fn parse_platforms<'a, I>(names: I) -> Result<Vec<Platform>, ConfigError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut platforms = Vec::new();
    for name in names.into_iter().map(str::trim).filter(|name| !name.is_empty()) {
        let platform: Platform = name
            .parse()
            .map_err(|err: crate::launch::LaunchError| ConfigError::Invalid(err.to_string()))?;
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }
    if platforms.is_empty() {
        return Err(ConfigError::Invalid(String::from(
            "no platforms configured: set RELAUNCH_PLATFORMS or add platforms to relaunch.toml",
        )));
    }
    Ok(platforms)
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configured value cannot be used.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
