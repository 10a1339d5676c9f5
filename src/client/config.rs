use std::time::Duration;

use url::Url;

use crate::error::Error;

const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Settings for [`ApiClient`](super::ApiClient).
///
/// `base_url` is the origin serving the relay routes (the front end's own
/// origin), not the upstream backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) base_url: Url,
    pub(crate) timeout: Duration,
    pub(crate) auth_path: String,
    pub(crate) login_path: String,
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(15),
            auth_path: "/api/auth".into(),
            login_path: "/auth/login".into(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `FRONTEND_BASE_URL`: relay origin (default `http://localhost:3000`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `FRONTEND_BASE_URL` is not a valid URL.
    pub fn from_env() -> Result<Self, Error> {
        let raw = std::env::var("FRONTEND_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let base_url: Url = raw
            .parse()
            .map_err(|e| Error::Config(format!("FRONTEND_BASE_URL: {e}")))?;
        Ok(Self::new(base_url))
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.auth_path = path.into();
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a path against the base URL.
    ///
    /// The result always shares the base URL's origin, since requests built
    /// from it may carry the access token.
    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        let url = self
            .base_url
            .join(&format!("/{}", path.trim_start_matches('/')))?;
        if url.origin() != self.base_url.origin() {
            return Err(Error::CrossOrigin(url.origin().ascii_serialization()));
        }
        Ok(url)
    }

    /// Resolve one of the relay's auth routes, e.g. `auth_url("refresh")`.
    pub(crate) fn auth_url(&self, route: &str) -> Result<Url, Error> {
        self.url(&format!("{}/{route}", self.auth_path.trim_end_matches('/')))
    }

    /// Login page location, carrying the path the user was on.
    pub(crate) fn login_redirect(&self, from: &str) -> String {
        format!("{}?redirect={}", self.login_path, urlencoding::encode(from))
    }
}
