use std::time::Duration;

use axum::body::Bytes;
use axum::http::header::{ACCEPT, AUTHORIZATION, COOKIE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::credentials::Credentials;

const LOGIN_PATH: &str = "/api/auth/login";
const LOGOUT_PATH: &str = "/api/auth/logout";
const REISSUE_PATH: &str = "/api/auth/reissue";
const STATUS_PATH: &str = "/api/auth/status";
const SIGNUP_PATH: &str = "/api/auth/signup";

/// Failure to get any response out of the upstream backend.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request timed out")]
    Timeout,
    #[error("upstream unreachable: {0}")]
    Connect(#[source] reqwest::Error),
    #[error("upstream request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("invalid upstream URL: {0}")]
    Url(#[from] url::ParseError),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e)
        } else {
            Self::Transport(e)
        }
    }
}

/// Credentials the browser sent that the relay passes through untouched.
#[derive(Default, Clone)]
pub(crate) struct Forwarded {
    cookie: Option<HeaderValue>,
    authorization: Option<HeaderValue>,
}

impl Forwarded {
    /// Split `Cookie` fields (as sent over HTTP/2) are joined into one.
    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            cookie: joined_cookie(headers),
            authorization: headers.get(AUTHORIZATION).cloned(),
        }
    }

    /// Only the session cookie travels; a bearer token is not needed upstream.
    pub(crate) fn cookie_only(self) -> Self {
        Self {
            authorization: None,
            ..self
        }
    }
}

fn joined_cookie(headers: &HeaderMap) -> Option<HeaderValue> {
    let mut fields = headers.get_all(COOKIE).iter();
    let first = fields.next()?;
    let rest: Vec<&HeaderValue> = fields.collect();
    if rest.is_empty() {
        return Some(first.clone());
    }

    let mut joined = first.as_bytes().to_vec();
    for value in rest {
        joined.extend_from_slice(b"; ");
        joined.extend_from_slice(value.as_bytes());
    }
    match HeaderValue::from_bytes(&joined) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "could not join Cookie fields, forwarding the first");
            Some(first.clone())
        }
    }
}

impl std::fmt::Debug for Forwarded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarded")
            .field("cookie", &self.cookie.is_some())
            .field("authorization", &self.authorization.is_some())
            .finish()
    }
}

/// Fully buffered upstream response.
#[derive(Debug)]
pub(crate) struct UpstreamResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl UpstreamResponse {
    pub(crate) fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub(crate) fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client for the upstream auth backend.
///
/// Every call carries the configured timeout and is attempted once.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    base_url: Url,
    timeout: Duration,
    http: reqwest::Client,
}

impl UpstreamClient {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(10),
            http: reqwest::Client::new(),
        }
    }

    /// Override the per-call timeout (default 10 seconds).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) async fn login(
        &self,
        credentials: &Credentials,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.send(Method::POST, LOGIN_PATH, &Forwarded::default(), Some(credentials))
            .await
    }

    pub(crate) async fn signup(
        &self,
        credentials: &Credentials,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.send(Method::POST, SIGNUP_PATH, &Forwarded::default(), Some(credentials))
            .await
    }

    pub(crate) async fn logout(
        &self,
        forwarded: &Forwarded,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.send(Method::POST, LOGOUT_PATH, forwarded, None).await
    }

    pub(crate) async fn reissue(
        &self,
        forwarded: &Forwarded,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.send(Method::POST, REISSUE_PATH, forwarded, None).await
    }

    pub(crate) async fn status(
        &self,
        forwarded: &Forwarded,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.send(Method::GET, STATUS_PATH, forwarded, None).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        forwarded: &Forwarded,
        body: Option<&Credentials>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.base_url.join(path)?;
        tracing::debug!(%method, %url, forwarded = ?forwarded, "calling upstream");

        let mut request = self
            .http
            .request(method, url)
            .timeout(self.timeout)
            .header(ACCEPT, "application/json");

        if let Some(cookie) = &forwarded.cookie {
            request = request.header(COOKIE, cookie.clone());
        }
        if let Some(authorization) = &forwarded.authorization {
            request = request.header(AUTHORIZATION, authorization.clone());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        tracing::debug!(%status, path, "upstream responded");
        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
