use std::sync::Arc;

use super::config::RelaySettings;
use super::upstream::UpstreamClient;

/// Shared state for relay route handlers.
#[derive(Clone)]
pub(super) struct RelayState {
    pub(super) upstream: Arc<UpstreamClient>,
    pub(super) settings: RelaySettings,
}
