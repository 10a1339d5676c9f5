use tokio::sync::watch;

use super::store::IdentityStore;
use crate::client::{ApiClient, AuthStatus};
use crate::types::Identity;

/// Observable authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// `true` only while [`Session::bootstrap`] runs.
    pub is_loading: bool,
    pub user: Option<Identity>,
}

impl SessionState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            is_loading: true,
            user: None,
        }
    }
}

/// Process-wide holder of the authenticated identity.
///
/// State changes are published on a `watch` channel; UI code subscribes with
/// [`Session::subscribe`].
pub struct Session<S> {
    client: ApiClient,
    store: S,
    state: watch::Sender<SessionState>,
}

/// Clears `is_loading` when bootstrap ends, including by cancellation.
struct LoadingGuard<'a>(&'a watch::Sender<SessionState>);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|s| s.is_loading = false);
    }
}

impl<S: IdentityStore> Session<S> {
    #[must_use]
    pub fn new(client: ApiClient, store: S) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            client,
            store,
            state,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    #[must_use]
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Restore the session at startup.
    ///
    /// The stored identity is published at once so the UI does not flash
    /// anonymous, then the status relay decides. A `401` gets exactly one
    /// reissue followed by exactly one more status check.
    pub async fn bootstrap(&self) -> SessionState {
        self.state.send_modify(|s| s.is_loading = true);
        let guard = LoadingGuard(&self.state);

        let stored = self.load_stored().await;
        if let Some(identity) = &stored {
            tracing::debug!(user_id = %identity.id, "restored stored identity");
            self.state.send_modify(|s| s.user = Some(identity.clone()));
        }

        match self.confirm(stored).await {
            Some(identity) => self.set_user(identity).await,
            None => self.clear_user().await,
        }

        drop(guard);
        self.state()
    }

    /// Record a completed login. Does not touch the network.
    pub async fn login(&self, identity: Identity) {
        tracing::info!(user_id = %identity.id, "session started");
        self.set_user(identity).await;
    }

    /// Log out through the relay, then forget the identity regardless of the
    /// outcome.
    pub async fn logout(&self) {
        if let Err(e) = self.client.logout().await {
            tracing::warn!(error = %e, "logout relay failed, clearing session locally");
        }
        self.clear_user().await;
        tracing::info!("session ended");
    }

    async fn load_stored(&self) -> Option<Identity> {
        match self.store.load().await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, "discarding stored identity");
                if let Err(e) = self.store.clear().await {
                    tracing::warn!(error = %e, "failed to clear stored identity");
                }
                None
            }
        }
    }

    async fn confirm(&self, stored: Option<Identity>) -> Option<Identity> {
        match self.client.status().await {
            Ok(AuthStatus::Authenticated(from_server)) => from_server.or(stored),
            Ok(AuthStatus::Unauthenticated) => {
                tracing::info!("status rejected, attempting reissue");
                if !self.client.refresh().await {
                    tracing::info!("reissue failed");
                    return None;
                }
                match self.client.status().await {
                    Ok(AuthStatus::Authenticated(from_server)) => from_server.or(stored),
                    Ok(other) => {
                        tracing::info!(status = ?other, "status still rejected after reissue");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "status check failed after reissue");
                        None
                    }
                }
            }
            Ok(AuthStatus::Failed(status)) => {
                tracing::warn!(status, "status check failed");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "status check failed");
                None
            }
        }
    }

    async fn set_user(&self, identity: Identity) {
        if let Err(e) = self.store.save(&identity).await {
            tracing::warn!(error = %e, "failed to persist identity");
        }
        self.state.send_modify(|s| s.user = Some(identity));
    }

    async fn clear_user(&self) {
        self.state.send_modify(|s| s.user = None);
        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "failed to clear stored identity");
        }
    }
}
