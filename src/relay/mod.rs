//! Server-side credential relay for Axum.
//!
//! Sits between the browser and the upstream auth backend. Browser cookies
//! and bearer tokens are forwarded upstream untouched; upstream `Set-Cookie`
//! headers come back verbatim and the upstream bearer is re-emitted as the
//! client-facing `Authorization` header. Every failure renders as
//! `{"success": false, "message": ...}` with a declared status.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use scout_auth::relay::{RelayConfig, relay_routes};
//!
//! // 1. Configure from environment
//! let config = RelayConfig::from_env()?;
//!
//! // 2. Mount the relay routes under /api/auth
//! let app = axum::Router::new().merge(relay_routes(config));
//! ```

mod config;
mod cookies;
mod error;
mod routes;
mod state;
mod upstream;

pub use config::RelayConfig;
pub use error::RelayError;
pub use routes::relay_routes;
pub use upstream::{UpstreamClient, UpstreamError};
