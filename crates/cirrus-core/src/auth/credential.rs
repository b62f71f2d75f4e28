//! Credential storage.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::session::write_atomic;

/// An OAuth2 credential pair with its absolute expiry instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Short-lived bearer token
    pub access_token: String,
    /// Long-lived token used to obtain new access tokens
    pub refresh_token: String,
    /// Instant at which `access_token` stops being accepted
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Whether the access token is expired, or will be within `leeway`.
    #[must_use]
    pub fn is_expired_within(&self, leeway: Duration) -> bool {
        self.expires_at <= Utc::now() + leeway
    }
}

/// Persistent home of the long-lived credential.
///
/// [`persist`](CredentialStore::persist) doubles as the refresh callback:
/// the authenticated transport invokes it exactly when the access-token
/// value changes, and treats a persist failure as a failure of the
/// surrounding call so a refreshed credential is never silently dropped.
pub trait CredentialStore: Send + Sync {
    /// Load the stored credential, if any.
    fn load(&self) -> Result<Option<Credential>>;

    /// Replace the stored credential.
    fn persist(&self, credential: &Credential) -> Result<()>;

    /// Remove the stored credential. Idempotent.
    fn clear(&self) -> Result<()>;
}

/// [`CredentialStore`] backed by `credential.json` in the config directory.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Create a store at the default credential path.
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: Config::credential_path(),
        }
    }

    /// Create a store at a custom path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Default for FileCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Internal(format!("failed to read credential file: {e}")))?;

        let credential = serde_json::from_str(&contents)
            .map_err(|e| Error::Internal(format!("failed to parse credential file: {e}")))?;

        Ok(Some(credential))
    }

    fn persist(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Internal(format!("failed to create config directory: {e}")))?;
        }

        let json = serde_json::to_string_pretty(credential)
            .map_err(|e| Error::Internal(format!("failed to serialize credential: {e}")))?;

        write_atomic(&self.path, json.as_bytes())?;

        tracing::debug!(path = %self.path.display(), "Persisted credential");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Internal(format!(
                "failed to remove credential file: {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_expiry_leeway() {
        let credential = Credential {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            expires_at: Utc::now() + Duration::minutes(2),
        };

        assert!(!credential.is_expired_within(Duration::zero()));
        assert!(credential.is_expired_within(Duration::minutes(5)));
    }

    #[test]
    fn test_file_store_roundtrip() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = FileCredentialStore::with_path(temp_dir.path().join("credential.json"));

        assert!(store.load().expect("load empty").is_none());

        let credential = Credential {
            access_token: "at-1".to_string(),
            refresh_token: "rt-1".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        store.persist(&credential).expect("persist");

        let loaded = store.load().expect("load").expect("present");
        assert_eq!(loaded, credential);

        store.clear().expect("clear");
        store.clear().expect("clear again");
        assert!(store.load().expect("load cleared").is_none());
    }
}
