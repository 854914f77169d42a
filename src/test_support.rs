//! Test support utilities shared across unit and integration tests.
//!
//! Every double records what it was asked to do and replays scripted
//! results in FIFO order. When a script runs dry the double succeeds.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::auth::{AuthError, AuthFuture, Authenticator, BearerToken, Credentials};
use crate::body::{Body, BodyEnv, BodyError, BodyFuture};
use crate::command::{CommandError, CommandFuture, CommandOutput, CommandRequest, CommandRunner};
use crate::launch::{
    ClusterDescription, ClusterHandle, LaunchClient, LaunchFailure, LaunchFuture, LaunchPlan,
    LaunchSpec, Platform,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Unlike the other doubles, an empty script is an error so that tests
/// notice unexpected invocations.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandRequest>>>,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandRequest> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes a response for a process killed by `signal`.
    pub fn push_signal(&self, signal: i32) {
        lock(&self.responses).push_back(CommandOutput {
            code: None,
            signal: Some(signal),
            stdout: String::new(),
            stderr: String::new(),
        });
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            signal: None,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, request: &'a CommandRequest) -> CommandFuture<'a> {
        Box::pin(async move {
            lock(&self.invocations).push(request.clone());
            lock(&self.responses)
                .pop_front()
                .ok_or_else(|| CommandError::Spawn {
                    program: request.program.clone(),
                    message: String::from("no scripted response available"),
                })
        })
    }
}

/// Returns the arguments of `request` as UTF-8 strings.
#[must_use]
pub fn args_of(request: &CommandRequest) -> Vec<String> {
    request
        .args
        .iter()
        .map(|arg: &OsString| arg.to_string_lossy().into_owned())
        .collect()
}

/// Produces a minimal payload matching the launch tool's `describe` output.
#[must_use]
pub fn describe_json(public_ip: &str, private_ip: &str) -> String {
    format!(
        "{{\"masters\":[{{\"public_ip\":\"{public_ip}\",\"private_ip\":\"{private_ip}\"}}],\"private_agents\":[],\"public_agents\":[]}}"
    )
}

/// Builds a valid plan for `platform` with fixed CI coordinates.
///
/// # Panics
///
/// Never in practice; the fixed inputs always validate.
#[must_use]
pub fn sample_plan(platform: Platform) -> LaunchPlan {
    LaunchPlan::builder(platform)
        .prefix("relaunch")
        .branch("main")
        .build_id("42")
        .template_url("https://example.test/templates/cluster.json")
        .provider("aws")
        .region("us-west-2")
        .build()
        .unwrap_or_else(|err| panic!("sample plan should validate: {err}"))
}

/// Scripted result of one launch client call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScriptedStep {
    /// The call succeeds.
    Succeed,
    /// The call fails with a retryable error.
    Fail,
    /// The call fails with a cancellation error.
    Cancel,
    /// The call never completes.
    Hang,
}

/// Errors produced by [`ScriptedLaunchClient`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedLaunchError {
    /// Scripted create failure.
    #[error("create failure")]
    Create,
    /// Scripted wait failure.
    #[error("wait failure")]
    Wait,
    /// Scripted describe failure.
    #[error("describe failure")]
    Describe,
    /// Scripted destroy failure.
    #[error("destroy failure")]
    Destroy,
    /// Scripted operator cancellation.
    #[error("interrupted")]
    Cancelled,
}

impl LaunchFailure for ScriptedLaunchError {
    fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Debug, Default)]
struct LaunchScript {
    create: VecDeque<ScriptedStep>,
    wait: VecDeque<ScriptedStep>,
    describe: VecDeque<ScriptedStep>,
    fail_on_destroy: bool,
    created: Vec<LaunchSpec>,
    waited: Vec<ClusterHandle>,
    described: Vec<ClusterHandle>,
    destroyed: Vec<ClusterHandle>,
}

/// Launch client double that replays scripted steps and records calls.
#[derive(Clone, Debug, Default)]
pub struct ScriptedLaunchClient {
    script: Arc<Mutex<LaunchScript>>,
}

impl ScriptedLaunchClient {
    /// Creates a client whose calls all succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues results for successive `create` calls.
    pub fn script_create(&self, steps: impl IntoIterator<Item = ScriptedStep>) {
        lock(&self.script).create.extend(steps);
    }

    /// Queues results for successive `wait` calls.
    pub fn script_wait(&self, steps: impl IntoIterator<Item = ScriptedStep>) {
        lock(&self.script).wait.extend(steps);
    }

    /// Queues results for successive `describe` calls.
    pub fn script_describe(&self, steps: impl IntoIterator<Item = ScriptedStep>) {
        lock(&self.script).describe.extend(steps);
    }

    /// Makes every `destroy` call fail (after being recorded).
    pub fn fail_on_destroy(&self) {
        lock(&self.script).fail_on_destroy = true;
    }

    /// Specs passed to `create`, in call order.
    #[must_use]
    pub fn created(&self) -> Vec<LaunchSpec> {
        lock(&self.script).created.clone()
    }

    /// Handles passed to `wait`, in call order.
    #[must_use]
    pub fn waited(&self) -> Vec<ClusterHandle> {
        lock(&self.script).waited.clone()
    }

    /// Handles passed to `describe`, in call order.
    #[must_use]
    pub fn described(&self) -> Vec<ClusterHandle> {
        lock(&self.script).described.clone()
    }

    /// Handles passed to `destroy`, in call order.
    #[must_use]
    pub fn destroyed(&self) -> Vec<ClusterHandle> {
        lock(&self.script).destroyed.clone()
    }

    /// Number of `destroy` calls.
    #[must_use]
    pub fn destroy_calls(&self) -> usize {
        lock(&self.script).destroyed.len()
    }
}

async fn play(step: ScriptedStep, failure: ScriptedLaunchError) -> Result<(), ScriptedLaunchError> {
    match step {
        ScriptedStep::Succeed => Ok(()),
        ScriptedStep::Fail => Err(failure),
        ScriptedStep::Cancel => Err(ScriptedLaunchError::Cancelled),
        ScriptedStep::Hang => std::future::pending().await,
    }
}

impl LaunchClient for ScriptedLaunchClient {
    type Error = ScriptedLaunchError;

    fn create<'a>(&'a self, spec: &'a LaunchSpec) -> LaunchFuture<'a, ClusterHandle, Self::Error> {
        Box::pin(async move {
            let step = {
                let mut script = lock(&self.script);
                script.created.push(spec.clone());
                script.create.pop_front().unwrap_or(ScriptedStep::Succeed)
            };
            play(step, ScriptedLaunchError::Create).await?;
            Ok(ClusterHandle::provisional(spec))
        })
    }

    fn wait<'a>(&'a self, handle: &'a ClusterHandle) -> LaunchFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let step = {
                let mut script = lock(&self.script);
                script.waited.push(handle.clone());
                script.wait.pop_front().unwrap_or(ScriptedStep::Succeed)
            };
            play(step, ScriptedLaunchError::Wait).await
        })
    }

    fn describe<'a>(
        &'a self,
        handle: &'a ClusterHandle,
    ) -> LaunchFuture<'a, ClusterDescription, Self::Error> {
        Box::pin(async move {
            let step = {
                let mut script = lock(&self.script);
                script.described.push(handle.clone());
                script.describe.pop_front().unwrap_or(ScriptedStep::Succeed)
            };
            play(step, ScriptedLaunchError::Describe).await?;
            Ok(ClusterDescription {
                endpoint: String::from("10.0.0.1"),
                private_address: Some(String::from("172.16.0.1")),
            })
        })
    }

    fn destroy(&self, handle: ClusterHandle) -> LaunchFuture<'_, (), Self::Error> {
        Box::pin(async move {
            let mut script = lock(&self.script);
            script.destroyed.push(handle);
            if script.fail_on_destroy {
                return Err(ScriptedLaunchError::Destroy);
            }
            Ok(())
        })
    }
}

/// Authenticator double that records logins.
#[derive(Clone, Debug, Default)]
pub struct ScriptedAuthenticator {
    reject: Arc<Mutex<bool>>,
    hang: Arc<Mutex<bool>>,
    logins: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAuthenticator {
    /// Creates an authenticator that issues `token-<endpoint>`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every login fail.
    pub fn reject(&self) {
        *lock(&self.reject) = true;
    }

    /// Makes every login wait forever, like an endpoint that never answers.
    pub fn hang(&self) {
        *lock(&self.hang) = true;
    }

    /// Endpoints logged in to, in call order.
    #[must_use]
    pub fn logins(&self) -> Vec<String> {
        lock(&self.logins).clone()
    }
}

impl Authenticator for ScriptedAuthenticator {
    fn login<'a>(&'a self, endpoint: &'a str, _credentials: &'a Credentials) -> AuthFuture<'a> {
        Box::pin(async move {
            lock(&self.logins).push(endpoint.to_owned());
            let hang = *lock(&self.hang);
            if hang {
                return std::future::pending().await;
            }
            if *lock(&self.reject) {
                return Err(AuthError::Rejected {
                    url: self.cluster_url(endpoint),
                    status: 401,
                    body: String::from("scripted rejection"),
                });
            }
            Ok(BearerToken::new(format!("token-{endpoint}")))
        })
    }

    fn cluster_url(&self, endpoint: &str) -> String {
        format!("https://{endpoint}")
    }
}

/// Scripted behaviour of a [`ScriptedBody`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BodyBehaviour {
    /// The body passes.
    Pass,
    /// The body fails with [`BodyError::Other`] carrying the message.
    Fail(String),
    /// The body panics with the message.
    Panic(String),
    /// The body never completes.
    Hang,
}

/// Body double that records the environments it ran with.
#[derive(Clone, Debug)]
pub struct ScriptedBody {
    behaviour: BodyBehaviour,
    runs: Arc<Mutex<Vec<BodyEnv>>>,
}

impl ScriptedBody {
    /// Creates a body with the given behaviour.
    #[must_use]
    pub fn new(behaviour: BodyBehaviour) -> Self {
        Self {
            behaviour,
            runs: Arc::default(),
        }
    }

    /// Environments the body was run with.
    #[must_use]
    pub fn runs(&self) -> Vec<BodyEnv> {
        lock(&self.runs).clone()
    }
}

impl Body for ScriptedBody {
    fn run(&self, env: BodyEnv) -> BodyFuture<'_> {
        Box::pin(async move {
            lock(&self.runs).push(env);
            match &self.behaviour {
                BodyBehaviour::Pass => Ok(()),
                BodyBehaviour::Fail(message) => Err(BodyError::Other(message.clone())),
                BodyBehaviour::Panic(message) => panic!("{message}"),
                BodyBehaviour::Hang => std::future::pending().await,
            }
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
