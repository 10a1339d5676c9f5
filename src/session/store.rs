use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::Error;
use crate::types::Identity;

/// Key under which the identity is persisted.
pub const IDENTITY_KEY: &str = "user";

/// Durable client-side storage for the authenticated [`Identity`].
///
/// Only the identity is stored here. Access tokens never are.
///
/// # Example
///
/// ```rust,ignore
/// impl IdentityStore for BrowserStorage {
///     async fn load(&self) -> Result<Option<Identity>, Error> {
///         self.get_item("user").map(|raw| serde_json::from_str(&raw)).transpose()
///             .map_err(|e| Error::Storage(e.to_string()))
///     }
///     // save / clear ...
/// }
/// ```
pub trait IdentityStore: Send + Sync + 'static {
    /// Read the stored identity.
    ///
    /// A stored value that cannot be decoded is an [`Error::Storage`].
    fn load(&self) -> impl Future<Output = Result<Option<Identity>, Error>> + Send;

    /// Replace the stored identity.
    fn save(&self, identity: &Identity) -> impl Future<Output = Result<(), Error>> + Send;

    /// Remove the stored identity. Removing nothing is not an error.
    fn clear(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Process-local store holding the serialized identity, like browser storage.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    raw: Mutex<Option<String>>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw value as-is, bypassing serialization.
    pub fn set_raw(&self, raw: impl Into<String>) {
        *self.raw.lock().unwrap_or_else(PoisonError::into_inner) = Some(raw.into());
    }

    #[must_use]
    pub fn raw(&self) -> Option<String> {
        self.raw.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl IdentityStore for MemoryIdentityStore {
    async fn load(&self) -> Result<Option<Identity>, Error> {
        self.raw()
            .map(|raw| decode(&raw))
            .transpose()
    }

    async fn save(&self, identity: &Identity) -> Result<(), Error> {
        self.set_raw(serde_json::to_string(identity)?);
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        *self.raw.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Stores the identity as JSON in `<dir>/user.json`.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    dir: PathBuf,
}

impl FileIdentityStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{IDENTITY_KEY}.json"))
    }
}

impl IdentityStore for FileIdentityStore {
    async fn load(&self) -> Result<Option<Identity>, Error> {
        match tokio::fs::read_to_string(self.path()).await {
            Ok(raw) => decode(&raw).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(&self.path(), e)),
        }
    }

    async fn save(&self, identity: &Identity) -> Result<(), Error> {
        let json = serde_json::to_vec(identity)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage_error(&self.dir, e))?;

        // Write then rename so a crash never leaves a half-written file.
        let tmp = self.dir.join(format!("{IDENTITY_KEY}.json.tmp"));
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| storage_error(&tmp, e))?;
        tokio::fs::rename(&tmp, self.path())
            .await
            .map_err(|e| storage_error(&self.path(), e))
    }

    async fn clear(&self) -> Result<(), Error> {
        match tokio::fs::remove_file(self.path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(&self.path(), e)),
        }
    }
}

fn decode(raw: &str) -> Result<Identity, Error> {
    serde_json::from_str(raw).map_err(|e| Error::Storage(format!("stored identity is corrupt: {e}")))
}

fn storage_error(path: &Path, e: std::io::Error) -> Error {
    Error::Storage(format!("{}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryIdentityStore::new();
        assert_eq!(store.load().await.unwrap(), None);

        let identity = Identity::new(7, "alice01");
        store.save(&identity).await.unwrap();
        assert_eq!(store.raw().unwrap(), r#"{"id":7,"username":"alice01"}"#);
        assert_eq!(store.load().await.unwrap(), Some(identity));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_reports_corruption() {
        let store = MemoryIdentityStore::new();
        store.set_raw("{not json");
        assert!(matches!(store.load().await, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path().join("profile"));
        assert_eq!(store.load().await.unwrap(), None);

        let identity = Identity::new(7, "alice01");
        store.save(&identity).await.unwrap();
        assert!(store.path().ends_with("user.json"));
        assert_eq!(store.load().await.unwrap(), Some(identity));

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path());
        tokio::fs::write(store.path(), "garbage").await.unwrap();
        assert!(matches!(store.load().await, Err(Error::Storage(_))));
    }
}
