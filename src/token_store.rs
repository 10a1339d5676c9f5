use std::sync::{Arc, PoisonError, RwLock};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use crate::types::AccessToken;

/// In-memory holder of the current access credential.
///
/// Cloning yields another handle to the same slot; [`TokenStore::new`] creates
/// an independent one. The value is replaced as a whole under the lock, so a
/// reader sees either the old or the new token, never a mix.
#[derive(Clone, Default)]
pub struct TokenStore {
    slot: Arc<RwLock<Option<AccessToken>>>,
}

impl TokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: AccessToken) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
        tracing::debug!("access token set");
    }

    #[must_use]
    pub fn get(&self) -> Option<AccessToken> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::debug!("access token cleared");
    }

    #[must_use]
    pub fn has_token(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// `Authorization: Bearer <token>` when a token is held, otherwise empty.
    #[must_use]
    pub fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.get() {
            match HeaderValue::from_str(&token.authorization_value()) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("access token is not a valid header value"),
            }
        }
        headers
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_token", &self.has_token())
            .finish()
    }
}
