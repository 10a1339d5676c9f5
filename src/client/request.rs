use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

use crate::error::Error;

/// How many refresh-then-replay cycles a request may still perform.
///
/// Spending the budget yields the smaller budget the replay runs with, so a
/// replay can never trigger another refresh once it reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget(u8);

impl RetryBudget {
    pub const NONE: Self = Self(0);
    pub const ONCE: Self = Self(1);

    /// Use one retry, returning the budget left for the replay.
    #[must_use]
    pub fn spend(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }

    #[must_use]
    pub fn remaining(self) -> u8 {
        self.0
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::ONCE
    }
}

/// A replayable request description for [`ApiClient::request`](super::ApiClient::request).
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<serde_json::Value>,
    pub(crate) skip_auth: bool,
    pub(crate) retry: RetryBudget,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            skip_auth: false,
            retry: RetryBudget::default(),
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `body` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Send without the stored access token; a `401` is returned as-is.
    #[must_use]
    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    /// Never refresh-and-replay this request.
    #[must_use]
    pub fn no_retry(self) -> Self {
        self.with_retry(RetryBudget::NONE)
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryBudget) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}
