//! Client side of the relay: the request wrapper used for every protected call.
//!
//! ```rust,ignore
//! use scout_auth::client::{ApiClient, ClientConfig};
//!
//! let client = ApiClient::new(ClientConfig::from_env()?)?
//!     .with_login_redirect(|location| navigate(location));
//!
//! let identity = client.login(&Credentials::new("alice01", "Passw0rd!")).await?;
//! let players = client.get("/api/players/7").await?;
//! ```

mod api;
mod config;
mod request;

pub use api::{ApiClient, AuthStatus};
pub use config::ClientConfig;
pub use request::{ApiRequest, RetryBudget};
