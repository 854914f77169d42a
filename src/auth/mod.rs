//! Bearer token login against a freshly provisioned cluster.
//!
//! Clusters expose an HTTP login endpoint that exchanges a uid/password
//! pair for a token. Ephemeral clusters serve self-signed certificates, so
//! certificate verification can be disabled.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default login path on the cluster.
pub const DEFAULT_LOGIN_PATH: &str = "/acs/api/v1/auth/login";

/// Default scheme used to reach the cluster.
pub const DEFAULT_SCHEME: &str = "https";

/// Default bound on a whole login request, connect to last body byte.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Login credentials. The password is never printed.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    /// Account identifier.
    pub uid: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials from the two strings.
    #[must_use]
    pub fn new(uid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("uid", &self.uid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bearer token issued by the cluster. The value is never printed.
#[derive(Clone, Eq, PartialEq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wraps a raw token.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw token for handing to the body.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Errors raised while logging in.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AuthError {
    /// Raised when the HTTP client cannot be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    /// Raised when the request cannot be sent or the body cannot be read.
    #[error("login request to {url} failed: {message}")]
    Transport {
        /// Login URL.
        url: String,
        /// Transport error message.
        message: String,
    },
    /// Raised when the endpoint rejects the login.
    #[error("login to {url} rejected with status {status}: {body}")]
    Rejected {
        /// Login URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, trimmed.
        body: String,
    },
    /// Raised when the response lacks a usable token.
    #[error("login response from {url} did not contain a token: {message}")]
    MalformedResponse {
        /// Login URL.
        url: String,
        /// Parser error message.
        message: String,
    },
}

/// Future returned by authenticators.
pub type AuthFuture<'a> = Pin<Box<dyn Future<Output = Result<BearerToken, AuthError>> + Send + 'a>>;

/// Exchanges credentials for a bearer token at a cluster endpoint.
pub trait Authenticator: Send + Sync {
    /// Logs in at `endpoint` (a host or host:port).
    fn login<'a>(&'a self, endpoint: &'a str, credentials: &'a Credentials) -> AuthFuture<'a>;

    /// Base URL the body should use to reach the cluster at `endpoint`.
    fn cluster_url(&self, endpoint: &str) -> String;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    uid: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// [`Authenticator`] that performs the login over HTTP with `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpAuthenticator {
    client: reqwest::Client,
    scheme: String,
    login_path: String,
}

impl HttpAuthenticator {
    /// Builds an authenticator whose requests fail with
    /// [`AuthError::Transport`] once `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Client`] when the TLS backend cannot be
    /// initialised.
    pub fn new(
        scheme: impl Into<String>,
        login_path: impl Into<String>,
        accept_invalid_certs: bool,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .timeout(timeout)
            .build()
            .map_err(|err| AuthError::Client(err.to_string()))?;
        let path = login_path.into();
        let normalised_path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Ok(Self {
            client,
            scheme: scheme.into(),
            login_path: normalised_path,
        })
    }

    /// Full login URL for `endpoint`.
    #[must_use]
    pub fn login_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.cluster_url(endpoint), self.login_path)
    }
}

impl Authenticator for HttpAuthenticator {
    fn login<'a>(&'a self, endpoint: &'a str, credentials: &'a Credentials) -> AuthFuture<'a> {
        Box::pin(async move {
            let url = self.login_url(endpoint);
            debug!(%url, uid = %credentials.uid, "logging in to cluster");
            let transport = |err: reqwest::Error| AuthError::Transport {
                url: url.clone(),
                message: err.to_string(),
            };

            let response = self
                .client
                .post(&url)
                .json(&LoginRequest {
                    uid: &credentials.uid,
                    password: &credentials.password,
                })
                .send()
                .await
                .map_err(transport)?;

            let status = response.status();
            let body = response.bytes().await.map_err(transport)?;
            if !status.is_success() {
                return Err(AuthError::Rejected {
                    url,
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&body).trim().to_owned(),
                });
            }

            let parsed: LoginResponse =
                serde_json::from_slice(&body).map_err(|err| AuthError::MalformedResponse {
                    url: url.clone(),
                    message: err.to_string(),
                })?;
            if parsed.token.trim().is_empty() {
                return Err(AuthError::MalformedResponse {
                    url,
                    message: String::from("token is empty"),
                });
            }
            Ok(BearerToken::new(parsed.token))
        })
    }

    fn cluster_url(&self, endpoint: &str) -> String {
        format!("{}://{endpoint}", self.scheme)
    }
}
