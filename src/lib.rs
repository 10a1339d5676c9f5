#![doc = include_str!("../README.md")]

pub mod credentials;
pub mod error;
pub mod types;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "client")]
pub mod session;
#[cfg(feature = "client")]
pub mod single_flight;
#[cfg(feature = "client")]
pub mod token_store;

#[cfg(feature = "relay")]
pub mod relay;

// Re-exports for convenient access
pub use credentials::{Credentials, LoginFormErrors, validate_login_form};
pub use error::Error;
pub use types::{AccessToken, ApiMessage, Identity, UserId};

#[cfg(feature = "client")]
pub use client::{ApiClient, ApiRequest, AuthStatus, ClientConfig, RetryBudget};
#[cfg(feature = "client")]
pub use session::{FileIdentityStore, IdentityStore, MemoryIdentityStore, Session, SessionState};
#[cfg(feature = "client")]
pub use single_flight::SingleFlight;
#[cfg(feature = "client")]
pub use token_store::TokenStore;

#[cfg(feature = "relay")]
pub use relay::{RelayConfig, RelayError, UpstreamClient, relay_routes};
