//! Process-wide session state: who is logged in, and how that is restored.
//!
//! ```rust,ignore
//! let session = Session::new(client.clone(), FileIdentityStore::new(profile_dir));
//! let mut changes = session.subscribe();
//!
//! session.bootstrap().await;
//! if !session.is_authenticated() {
//!     let identity = client.login(&form).await?;
//!     session.login(identity).await;
//! }
//! ```

mod controller;
mod store;

pub use controller::{Session, SessionState};
pub use store::{FileIdentityStore, IDENTITY_KEY, IdentityStore, MemoryIdentityStore};
