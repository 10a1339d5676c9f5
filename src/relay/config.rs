use std::time::Duration;

use url::Url;

use super::error::RelayError;
use super::upstream::UpstreamClient;

const PLAINTEXT_BACKEND: &str = "http://localhost:8080";
const TLS_BACKEND: &str = "https://localhost:8443";

/// Shared relay settings used by both config and runtime state.
#[derive(Debug, Clone)]
pub(crate) struct RelaySettings {
    pub(crate) auth_path: String,
    pub(crate) access_cookie_name: String,
}

impl RelaySettings {
    fn defaults() -> Self {
        Self {
            auth_path: "/api/auth".into(),
            access_cookie_name: "access_token".into(),
        }
    }
}

/// Credential relay configuration.
///
/// The upstream client is a constructor parameter; everything else has a
/// default and a `with_*` override. Use [`from_env()`](RelayConfig::from_env)
/// for convention-based setup.
#[derive(Debug)]
pub struct RelayConfig {
    pub(super) upstream: UpstreamClient,
    pub(super) settings: RelaySettings,
}

impl RelayConfig {
    #[must_use]
    pub fn new(upstream: UpstreamClient) -> Self {
        Self {
            upstream,
            settings: RelaySettings::defaults(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `BACKEND_URL`: upstream base URL. Defaults to `http://localhost:8080`,
    ///   or `https://localhost:8443` when `BACKEND_TLS` is `"1"` or `"true"`
    /// - `RELAY_AUTH_PATH`: prefix the auth routes are mounted under (default `/api/auth`)
    /// - `RELAY_TIMEOUT_SECS`: upstream call timeout in seconds (default 10)
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if a variable is set but malformed.
    pub fn from_env() -> Result<Self, RelayError> {
        let backend_tls = matches!(
            std::env::var("BACKEND_TLS").as_deref(),
            Ok("1") | Ok("true"),
        );
        let default_backend = if backend_tls { TLS_BACKEND } else { PLAINTEXT_BACKEND };

        let url_str = std::env::var("BACKEND_URL").unwrap_or_else(|_| default_backend.into());
        let base_url: Url = url_str
            .parse()
            .map_err(|e| RelayError::Config(format!("BACKEND_URL: {e}")))?;

        let mut upstream = UpstreamClient::new(base_url);
        if let Ok(secs) = std::env::var("RELAY_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| RelayError::Config(format!("RELAY_TIMEOUT_SECS: {e}")))?;
            upstream = upstream.with_timeout(Duration::from_secs(secs));
        }

        let mut config = Self::new(upstream);
        if let Ok(path) = std::env::var("RELAY_AUTH_PATH") {
            config = config.with_auth_path(path);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_access_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.access_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    #[must_use]
    pub fn auth_path(&self) -> &str {
        &self.settings.auth_path
    }
}
