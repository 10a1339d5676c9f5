use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Response, StatusCode};
use serde::Serialize;
use url::Url;

use super::config::ClientConfig;
use super::request::ApiRequest;
use crate::credentials::{self, Credentials};
use crate::error::Error;
use crate::single_flight::SingleFlight;
use crate::token_store::TokenStore;
use crate::types::{AccessToken, ApiMessage, Identity, LoginResponse, SignupResponse, StatusResponse};

const REFRESH_KEY: &str = "refresh";

type LoginRedirect = Arc<dyn Fn(&str) + Send + Sync>;

/// Result of one shared refresh run, as seen by every caller that joined it.
#[derive(Clone)]
struct RefreshOutcome {
    refreshed: bool,
    redirect_claimed: Arc<AtomicBool>,
}

impl RefreshOutcome {
    fn new(refreshed: bool) -> Self {
        Self {
            refreshed,
            redirect_claimed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `true` for exactly one caller of a failed run.
    fn claim_redirect(&self) -> bool {
        !self.redirect_claimed.swap(true, Ordering::AcqRel)
    }
}

/// Outcome of asking the status relay who we are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    /// Upstream confirmed the session; the payload may name the user.
    Authenticated(Option<Identity>),
    /// Upstream answered `401`.
    Unauthenticated,
    /// Any other status.
    Failed(u16),
}

/// Client for the relay routes and for protected API calls.
///
/// Keeps the cookie jar (refresh credential) and the [`TokenStore`] (access
/// credential). Cloning is cheap and shares both, along with the in-flight
/// refresh.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    http: reqwest::Client,
    tokens: TokenStore,
    refresh: SingleFlight<RefreshOutcome>,
    login_redirect: Option<LoginRedirect>,
}

impl ApiClient {
    /// Create a client with its own token store and cookie jar.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .build()?;
        Ok(Self::from_parts(config, http, TokenStore::new(), None))
    }

    fn from_parts(
        config: ClientConfig,
        http: reqwest::Client,
        tokens: TokenStore,
        login_redirect: Option<LoginRedirect>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                http,
                tokens,
                refresh: SingleFlight::new(),
                login_redirect,
            }),
        }
    }

    /// Use a caller-owned token store.
    #[must_use]
    pub fn with_token_store(self, tokens: TokenStore) -> Self {
        self.rebuild(tokens, self.inner.login_redirect.clone())
    }

    /// Called with the login page location when a refresh fails.
    #[must_use]
    pub fn with_login_redirect(self, redirect: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.rebuild(self.inner.tokens.clone(), Some(Arc::new(redirect)))
    }

    fn rebuild(&self, tokens: TokenStore, login_redirect: Option<LoginRedirect>) -> Self {
        Self::from_parts(
            self.inner.config.clone(),
            self.inner.http.clone(),
            tokens,
            login_redirect,
        )
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // ── Request wrapper ────────────────────────────────────────────

    /// Send a request, refreshing the access token once on `401`.
    ///
    /// A `401` is answered by at most one refresh and one replay, bounded by
    /// the request's [`RetryBudget`](super::RetryBudget). When the refresh
    /// fails every waiting caller gets [`Error::SessionExpired`] and the login
    /// redirect hook runs once for that refresh. A `401` on the replay itself
    /// is returned to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure,
    /// [`Error::SessionExpired`] when the session cannot be renewed, and
    /// [`Error::CrossOrigin`] when the path resolves outside the relay origin.
    pub async fn request(&self, mut req: ApiRequest) -> Result<Response, Error> {
        loop {
            let sent_token = if req.skip_auth {
                None
            } else {
                self.inner.tokens.get()
            };

            let response = self.send(&req, sent_token.as_ref()).await?;

            if response.status() != StatusCode::UNAUTHORIZED || req.skip_auth {
                return Ok(response);
            }
            let Some(remaining) = req.retry.spend() else {
                return Ok(response);
            };

            let current = self.inner.tokens.get();
            if current.is_some() && current != sent_token {
                tracing::debug!(path = %req.path, "token replaced while in flight, replaying");
            } else {
                tracing::info!(path = %req.path, "401 received, refreshing access token");
                let outcome = self.shared_refresh().await;
                if !outcome.refreshed {
                    if outcome.claim_redirect() {
                        self.redirect_to_login(&req.path);
                    }
                    return Err(Error::SessionExpired);
                }
            }

            req.retry = remaining;
        }
    }

    pub async fn get(&self, path: &str) -> Result<Response, Error> {
        self.request(ApiRequest::get(path)).await
    }

    pub async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response, Error> {
        self.request(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response, Error> {
        self.request(ApiRequest::put(path).json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response, Error> {
        self.request(ApiRequest::delete(path)).await
    }

    async fn send(&self, req: &ApiRequest, token: Option<&AccessToken>) -> Result<Response, Error> {
        let url = self.inner.config.url(&req.path)?;
        self.send_to(url, req, token).await
    }

    async fn send_to(
        &self,
        url: Url,
        req: &ApiRequest,
        token: Option<&AccessToken>,
    ) -> Result<Response, Error> {
        let mut builder = self
            .inner
            .http
            .request(req.method.clone(), url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .headers(req.headers.clone());

        if let Some(token) = token {
            builder = builder.bearer_auth(token.as_str());
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }

    fn redirect_to_login(&self, from: &str) {
        let location = self.inner.config.login_redirect(from);
        tracing::warn!(location = %location, "session expired, login required");
        if let Some(redirect) = &self.inner.login_redirect {
            redirect(&location);
        }
    }

    // ── Refresh ────────────────────────────────────────────────────

    /// Exchange the refresh cookie for a new access token.
    ///
    /// Concurrent callers share one network call. Returns `false` and clears
    /// the token store when the relay refuses or cannot be reached.
    pub async fn refresh(&self) -> bool {
        self.shared_refresh().await.refreshed
    }

    async fn shared_refresh(&self) -> RefreshOutcome {
        let url = match self.inner.config.auth_url("refresh") {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "invalid refresh URL");
                return RefreshOutcome::new(false);
            }
        };
        let http = self.inner.http.clone();
        let tokens = self.inner.tokens.clone();

        self.inner
            .refresh
            .run(REFRESH_KEY, move || async move {
                RefreshOutcome::new(perform_refresh(http, url, tokens).await)
            })
            .await
    }

    // ── Relay calls ────────────────────────────────────────────────

    /// Log in through the relay and keep the returned access token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidForm`] before any network call when the form is
    /// malformed, [`Error::Rejected`] when the relay refuses, or
    /// [`Error::Http`] on network failure.
    pub async fn login(&self, form: &Credentials) -> Result<Identity, Error> {
        credentials::validate_login_form(form).map_err(Error::InvalidForm)?;

        let body = Credentials::new(form.username.trim(), form.password.clone());
        let req = ApiRequest::post("").json(&body)?.skip_auth().no_retry();
        let response = self
            .send_to(self.inner.config.auth_url("login")?, &req, None)
            .await?;

        let status = response.status();
        let token = bearer_from(&response);
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(rejected("login", status, &bytes, "Login failed"));
        }

        let body: LoginResponse = serde_json::from_slice(&bytes)?;
        if !body.success {
            return Err(Error::Rejected {
                operation: "login",
                status: status.as_u16(),
                message: body.message,
            });
        }
        let identity = body.user.ok_or_else(|| Error::Rejected {
            operation: "login",
            status: status.as_u16(),
            message: "Login response did not include a user".into(),
        })?;

        match token {
            Some(token) => self.inner.tokens.set(token),
            None => tracing::warn!("login succeeded without an access token"),
        }

        tracing::info!(user_id = %identity.id, "logged in");
        Ok(identity)
    }

    /// Log out through the relay. The token store is cleared either way.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] when the relay cannot be reached.
    pub async fn logout(&self) -> Result<(), Error> {
        let token = self.inner.tokens.get();
        let req = ApiRequest::post("").no_retry();
        let result = match self.inner.config.auth_url("logout") {
            Ok(url) => self.send_to(url, &req, token.as_ref()).await.map(|_| ()),
            Err(e) => Err(e),
        };
        self.inner.tokens.clear();
        result
    }

    /// Ask the relay whether the current session is valid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure.
    pub async fn status(&self) -> Result<AuthStatus, Error> {
        let token = self.inner.tokens.get();
        let req = ApiRequest::get("").no_retry();
        let response = self
            .send_to(self.inner.config.auth_url("status")?, &req, token.as_ref())
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(AuthStatus::Unauthenticated);
        }
        if !status.is_success() {
            return Ok(AuthStatus::Failed(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        let identity = match serde_json::from_slice::<StatusResponse>(&bytes) {
            Ok(body) => body.dto.map(Identity::from),
            Err(e) => {
                tracing::warn!(error = %e, "status body was not JSON");
                None
            }
        };
        Ok(AuthStatus::Authenticated(identity))
    }

    /// Create an account through the relay.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rejected`] when validation or upstream refuses, or
    /// [`Error::Http`] on network failure.
    pub async fn signup(&self, form: &Credentials) -> Result<SignupResponse, Error> {
        let req = ApiRequest::post("").json(form)?.skip_auth().no_retry();
        let response = self
            .send_to(self.inner.config.auth_url("signup")?, &req, None)
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(rejected("signup", status, &bytes, "Failed to create account"));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

async fn perform_refresh(http: reqwest::Client, url: Url, tokens: TokenStore) -> bool {
    match http.post(url).send().await {
        Ok(response) if response.status().is_success() => {
            if let Some(token) = bearer_from(&response) {
                tokens.set(token);
                tracing::info!("access token refreshed");
                return true;
            }
            tracing::warn!("refresh succeeded without an access token");
        }
        Ok(response) => {
            tracing::info!(status = %response.status(), "token refresh rejected");
        }
        Err(e) => {
            tracing::warn!(error = %e, "token refresh failed");
        }
    }
    tokens.clear();
    false
}

fn bearer_from(response: &Response) -> Option<AccessToken> {
    response
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(AccessToken::from_authorization)
}

fn rejected(operation: &'static str, status: StatusCode, body: &[u8], fallback: &str) -> Error {
    let message = serde_json::from_slice::<ApiMessage>(body)
        .ok()
        .map(|m| m.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| fallback.to_string());
    Error::Rejected {
        operation,
        status: status.as_u16(),
        message,
    }
}
