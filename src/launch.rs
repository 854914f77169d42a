//! Launch client abstraction for provisioning disposable test clusters.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use thiserror::Error;

/// Upper bound on deployment names; cloud stack names reject longer values.
pub const MAX_DEPLOYMENT_NAME_LEN: usize = 63;

/// Target operating system a cluster is provisioned for.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Platform {
    /// Linux builders.
    Linux,
    /// macOS builders.
    Darwin,
    /// Windows builders.
    Windows,
}

impl Platform {
    /// Every supported platform, in reporting order.
    pub const ALL: [Self; 3] = [Self::Linux, Self::Darwin, Self::Windows];

    /// Lowercase identifier used in deployment names and directories.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = LaunchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "darwin" | "mac" | "macos" => Ok(Self::Darwin),
            "windows" | "win" => Ok(Self::Windows),
            other => Err(LaunchError::UnknownPlatform(other.to_owned())),
        }
    }
}

/// Everything needed to derive a [`LaunchSpec`] for any attempt.
///
/// A plan is fixed for the lifetime of a retry controller; only the attempt
/// number varies between the specs it produces.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchPlan {
    /// Platform the cluster serves.
    pub platform: Platform,
    /// Prefix for deployment names (for example `relaunch`).
    pub prefix: String,
    /// Source branch under test.
    pub branch: String,
    /// CI build identifier.
    pub build_id: String,
    /// Template reference handed to the launch tool.
    pub template_url: String,
    /// Cloud provider understood by the launch tool.
    pub provider: String,
    /// Provider region.
    pub region: String,
    /// Optional pre-registered SSH key name; the launch tool generates one
    /// when absent.
    pub key_name: Option<String>,
}

impl LaunchPlan {
    /// Starts a builder for a [`LaunchPlan`].
    #[must_use]
    pub fn builder(platform: Platform) -> LaunchPlanBuilder {
        LaunchPlanBuilder::new(platform)
    }

    /// Validates the plan, returning the first empty field.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Validation`] when any required field is empty.
    pub fn validate(&self) -> Result<(), LaunchError> {
        for (field, value) in [
            ("prefix", &self.prefix),
            ("branch", &self.branch),
            ("build_id", &self.build_id),
            ("template_url", &self.template_url),
            ("provider", &self.provider),
            ("region", &self.region),
        ] {
            if value.trim().is_empty() {
                return Err(LaunchError::Validation(field.to_owned()));
            }
        }
        Ok(())
    }

    /// Builds the immutable spec for `attempt`.
    #[must_use]
    pub fn spec(&self, attempt: u32) -> LaunchSpec {
        LaunchSpec {
            platform: self.platform,
            deployment_name: deployment_name(
                &self.prefix,
                self.platform,
                &self.branch,
                &self.build_id,
                attempt,
            ),
            attempt,
            template_url: self.template_url.clone(),
            provider: self.provider.clone(),
            region: self.region.clone(),
            key_name: self.key_name.clone(),
        }
    }
}

/// Builder for [`LaunchPlan`] that trims inputs and validates on build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchPlanBuilder {
    platform: Platform,
    prefix: String,
    branch: String,
    build_id: String,
    template_url: String,
    provider: String,
    region: String,
    key_name: Option<String>,
}

impl LaunchPlanBuilder {
    /// Creates an empty builder for `platform`.
    #[must_use]
    pub const fn new(platform: Platform) -> Self {
        Self {
            platform,
            prefix: String::new(),
            branch: String::new(),
            build_id: String::new(),
            template_url: String::new(),
            provider: String::new(),
            region: String::new(),
            key_name: None,
        }
    }

    /// Sets the deployment name prefix.
    #[must_use]
    pub fn prefix(mut self, value: impl Into<String>) -> Self {
        self.prefix = value.into();
        self
    }

    /// Sets the branch.
    #[must_use]
    pub fn branch(mut self, value: impl Into<String>) -> Self {
        self.branch = value.into();
        self
    }

    /// Sets the build identifier.
    #[must_use]
    pub fn build_id(mut self, value: impl Into<String>) -> Self {
        self.build_id = value.into();
        self
    }

    /// Sets the template reference.
    #[must_use]
    pub fn template_url(mut self, value: impl Into<String>) -> Self {
        self.template_url = value.into();
        self
    }

    /// Sets the provider.
    #[must_use]
    pub fn provider(mut self, value: impl Into<String>) -> Self {
        self.provider = value.into();
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn region(mut self, value: impl Into<String>) -> Self {
        self.region = value.into();
        self
    }

    /// Sets the optional key name. Blank values are treated as absent.
    #[must_use]
    pub fn key_name(mut self, value: Option<String>) -> Self {
        self.key_name = value;
        self
    }

    /// Builds and validates the [`LaunchPlan`].
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Validation`] when a required field is empty.
    pub fn build(self) -> Result<LaunchPlan, LaunchError> {
        let plan = LaunchPlan {
            platform: self.platform,
            prefix: self.prefix.trim().to_owned(),
            branch: self.branch.trim().to_owned(),
            build_id: self.build_id.trim().to_owned(),
            template_url: self.template_url.trim().to_owned(),
            provider: self.provider.trim().to_owned(),
            region: self.region.trim().to_owned(),
            key_name: self
                .key_name
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
        };
        plan.validate()?;
        Ok(plan)
    }
}

/// Immutable description of one provisioning attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchSpec {
    /// Platform the cluster serves.
    pub platform: Platform,
    /// Unique deployment name for this attempt.
    pub deployment_name: String,
    /// Attempt number embedded in the deployment name.
    pub attempt: u32,
    /// Template reference handed to the launch tool.
    pub template_url: String,
    /// Cloud provider understood by the launch tool.
    pub provider: String,
    /// Provider region.
    pub region: String,
    /// Optional SSH key name.
    pub key_name: Option<String>,
}

/// Handle identifying a (possibly partially) provisioned cluster.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ClusterHandle {
    /// Deployment name the launch tool knows the cluster by.
    pub deployment_name: String,
    /// Platform the cluster serves.
    pub platform: Platform,
}

impl ClusterHandle {
    /// Handle for whatever `create(spec)` may have left behind, used to
    /// clean up after a failed create.
    #[must_use]
    pub fn provisional(spec: &LaunchSpec) -> Self {
        Self {
            deployment_name: spec.deployment_name.clone(),
            platform: spec.platform,
        }
    }
}

/// Metadata reported by `describe` for a ready cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterDescription {
    /// Address the cluster's API and login endpoint are reachable on.
    pub endpoint: String,
    /// Private address of the same host, when reported.
    pub private_address: Option<String>,
}

/// Errors raised while building launch inputs.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum LaunchError {
    /// Raised when a plan is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
    /// Raised when a platform identifier is not recognised.
    #[error("unknown platform '{0}' (expected linux, darwin, or windows)")]
    UnknownPlatform(String),
}

/// Errors surfaced by a launch client.
pub trait LaunchFailure: std::error::Error + Send + Sync + 'static {
    /// Returns `true` when the failure is an operator cancellation rather
    /// than a retryable provisioning failure.
    fn is_cancellation(&self) -> bool;
}

/// Future returned by launch client operations.
pub type LaunchFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Interface to the external cluster-launch tool.
pub trait LaunchClient: Send + Sync {
    /// Client specific error type.
    type Error: LaunchFailure;

    /// Starts provisioning a cluster for `spec`.
    fn create<'a>(&'a self, spec: &'a LaunchSpec)
    -> LaunchFuture<'a, ClusterHandle, Self::Error>;

    /// Blocks until the cluster is usable or provisioning fails.
    fn wait<'a>(&'a self, handle: &'a ClusterHandle) -> LaunchFuture<'a, (), Self::Error>;

    /// Reports addresses for a ready cluster.
    fn describe<'a>(
        &'a self,
        handle: &'a ClusterHandle,
    ) -> LaunchFuture<'a, ClusterDescription, Self::Error>;

    /// Deletes the cluster and any local bookkeeping for it.
    fn destroy(&self, handle: ClusterHandle) -> LaunchFuture<'_, (), Self::Error>;
}

/// Builds `{prefix}-{platform}-{branch}-{build_id}-{attempt}`, lowercased,
/// restricted to `[a-z0-9-]`, and bounded by [`MAX_DEPLOYMENT_NAME_LEN`].
///
/// The branch is shortened first; the attempt suffix is always kept.
#[must_use]
pub fn deployment_name(
    prefix: &str,
    platform: Platform,
    branch: &str,
    build_id: &str,
    attempt: u32,
) -> String {
    let head = sanitise(prefix);
    let build = sanitise(build_id);
    let suffix = attempt.to_string();
    let fixed = [head.as_str(), platform.as_str(), build.as_str(), &suffix]
        .iter()
        .filter(|part| !part.is_empty())
        .map(|part| part.len() + 1)
        .sum::<usize>();

    let mut branch_part = sanitise(branch);
    branch_part.truncate(MAX_DEPLOYMENT_NAME_LEN.saturating_sub(fixed));
    trim_trailing_dashes(&mut branch_part);

    let mut stem = [head.as_str(), platform.as_str(), &branch_part, build.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let stem_budget = MAX_DEPLOYMENT_NAME_LEN.saturating_sub(suffix.len() + 1);
    if stem.len() > stem_budget {
        stem.truncate(stem_budget);
        trim_trailing_dashes(&mut stem);
    }

    format!("{stem}-{suffix}")
}

fn sanitise(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for ch in component.chars() {
        let mapped = if ch.is_ascii_alphanumeric() {
            ch.to_ascii_lowercase()
        } else {
            '-'
        };
        if mapped == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(mapped);
    }
    trim_trailing_dashes(&mut out);
    out
}

fn trim_trailing_dashes(value: &mut String) {
    while value.ends_with('-') {
        value.pop();
    }
}
