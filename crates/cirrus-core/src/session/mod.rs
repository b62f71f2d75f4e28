//! Resumable-transfer session persistence.
//!
//! A [`TransferSession`] records a server-issued, pre-authorized transfer
//! URL so an interrupted upload or download can resume in a later
//! invocation. Records are keyed by a content hash of the
//! `localPath:remotePath` pair, live under the `sessions` subdirectory of
//! the config directory, and are guarded by per-record advisory locks so
//! two concurrently launched invocations can never corrupt each other's
//! state.
//!
//! ## On-disk layout
//!
//! ```text
//! sessions/
//!   3f5a...e2.json   # the record (pretty-printed JSON)
//!   3f5a...e2.lock   # zero-content advisory lock companion
//! ```

pub mod lockfile;

pub use lockfile::LockGuard;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{Error, Result};

/// File extension for session records.
pub const RECORD_FILE_EXTENSION: &str = "json";

/// File extension for lock companions.
pub const LOCK_FILE_EXTENSION: &str = "lock";

/// Direction of a resumable transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    /// Local file to remote path
    Upload,
    /// Remote path to local file
    Download,
}

/// A persisted resumable-transfer session.
///
/// `completed_bytes` is a diagnostic progress hint only: resumption never
/// trusts it, because only the server knows which bytes were durably
/// received. It is refreshed after each confirmed chunk so `cirrus
/// sessions` can show meaningful progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSession {
    /// Local file path
    pub local_path: PathBuf,
    /// Remote path relative to the drive root
    pub remote_path: String,
    /// Transfer direction
    pub direction: TransferDirection,
    /// Pre-authorized upload or download URL
    pub transfer_url: String,
    /// Instant after which the server discards the session
    pub expires_at: DateTime<Utc>,
    /// Bytes confirmed so far (diagnostic only)
    pub completed_bytes: u64,
}

impl TransferSession {
    /// Whether the server-side session has already expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Durable, multi-process-safe storage of [`TransferSession`] records.
pub struct SessionStore {
    sessions_dir: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at the default sessions directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_dir(Config::sessions_dir())
    }

    /// Create a store rooted at a custom directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_dir(sessions_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&sessions_dir).map_err(|e| {
            Error::Internal(format!(
                "failed to create sessions directory {}: {e}",
                sessions_dir.display()
            ))
        })?;

        Ok(Self { sessions_dir })
    }

    /// Deterministic record path for a (local, remote) transfer identity.
    ///
    /// The filename is the lowercase-hex SHA-256 of `"{local}:{remote}"`,
    /// so the same pair always maps to the same file and unrelated pairs
    /// never collide in practice.
    #[must_use]
    pub fn record_path(&self, local: &Path, remote: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(local.display().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(remote.as_bytes());
        let digest = hasher.finalize();

        let mut name = String::with_capacity(digest.len() * 2);
        for byte in digest {
            name.push_str(&format!("{byte:02x}"));
        }

        self.sessions_dir
            .join(name)
            .with_extension(RECORD_FILE_EXTENSION)
    }

    fn lock_path(record_path: &Path) -> PathBuf {
        record_path.with_extension(LOCK_FILE_EXTENSION)
    }

    /// Persist a session record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Locked`] if another process holds the record's
    /// lock, and [`Error::Internal`] for I/O failures.
    pub fn save(&self, session: &TransferSession) -> Result<()> {
        let path = self.record_path(&session.local_path, &session.remote_path);
        let _guard = lockfile::acquire(&Self::lock_path(&path))?;

        let json = serde_json::to_string_pretty(session)
            .map_err(|e| Error::Internal(format!("failed to serialize session record: {e}")))?;

        write_atomic(&path, json.as_bytes())?;

        tracing::debug!(
            local = %session.local_path.display(),
            remote = %session.remote_path,
            path = %path.display(),
            "Saved session record"
        );

        Ok(())
    }

    /// Load the session record for a transfer identity.
    ///
    /// Returns `Ok(None)` if no record exists. An expired record is
    /// deleted as a side effect and reported as `None`; callers cannot
    /// distinguish "never existed" from "expired and cleaned up."
    ///
    /// # Errors
    ///
    /// Returns [`Error::Locked`] on lock contention and
    /// [`Error::Internal`] for I/O or parse failures.
    pub fn load(&self, local: &Path, remote: &str) -> Result<Option<TransferSession>> {
        let path = self.record_path(local, remote);
        let _guard = lockfile::acquire(&Self::lock_path(&path))?;

        if !path.exists() {
            return Ok(None);
        }

        let session = read_record(&path)?;

        if session.is_expired() {
            std::fs::remove_file(&path).map_err(|e| {
                Error::Internal(format!(
                    "failed to remove expired session record {}: {e}",
                    path.display()
                ))
            })?;
            tracing::debug!(
                path = %path.display(),
                expired_at = %session.expires_at,
                "Removed expired session record"
            );
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Delete the session record for a transfer identity.
    ///
    /// Idempotent: deleting an absent record succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Locked`] on lock contention and
    /// [`Error::Internal`] for I/O failures.
    pub fn delete(&self, local: &Path, remote: &str) -> Result<()> {
        let path = self.record_path(local, remote);
        let lock_path = Self::lock_path(&path);

        {
            let _guard = lockfile::acquire(&lock_path)?;

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Deleted session record");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::Internal(format!(
                        "failed to delete session record {}: {e}",
                        path.display()
                    )));
                }
            }
        }

        // Lock released; the companion itself is disposable.
        let _ = std::fs::remove_file(&lock_path);

        Ok(())
    }

    /// List all live session records, most recently expiring first.
    ///
    /// Records that cannot be parsed are skipped; records held by another
    /// process are skipped rather than blocked on.
    ///
    /// # Errors
    ///
    /// Returns an error if the sessions directory cannot be read.
    pub fn list(&self) -> Result<Vec<TransferSession>> {
        let mut sessions = Vec::new();

        let entries = std::fs::read_dir(&self.sessions_dir).map_err(|e| {
            Error::Internal(format!(
                "failed to read sessions directory {}: {e}",
                self.sessions_dir.display()
            ))
        })?;

        for entry in entries {
            let path = entry
                .map_err(|e| Error::Internal(format!("failed to read directory entry: {e}")))?
                .path();

            if path
                .extension()
                .is_none_or(|ext| ext != RECORD_FILE_EXTENSION)
            {
                continue;
            }

            // Same lock discipline as load; a record an active transfer
            // holds is skipped, never waited on.
            let _guard = match lockfile::acquire(&Self::lock_path(&path)) {
                Ok(guard) => guard,
                Err(Error::Locked(_)) => {
                    tracing::debug!(path = %path.display(), "Skipping session record held by another process");
                    continue;
                }
                Err(e) => return Err(e),
            };

            match read_record(&path) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable session record");
                }
            }
        }

        sessions.sort_by(|a, b| b.expires_at.cmp(&a.expires_at));

        Ok(sessions)
    }

    /// Get the sessions directory path.
    #[must_use]
    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }
}

fn read_record(path: &Path) -> Result<TransferSession> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::Internal(format!(
            "failed to read session record {}: {e}",
            path.display()
        ))
    })?;

    serde_json::from_str(&contents).map_err(|e| {
        Error::Internal(format!(
            "failed to parse session record {}: {e}",
            path.display()
        ))
    })
}

/// Write via a temp file and rename so a crash mid-write never leaves a
/// truncated record behind.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    std::fs::write(&temp_path, contents).map_err(|e| {
        Error::Internal(format!(
            "failed to write {}: {e}",
            temp_path.display()
        ))
    })?;

    std::fs::rename(&temp_path, path).map_err(|e| {
        Error::Internal(format!(
            "failed to replace {}: {e}",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn test_session(dir: &Path) -> TransferSession {
        TransferSession {
            local_path: dir.join("report.pdf"),
            remote_path: "Documents/report.pdf".to_string(),
            direction: TransferDirection::Upload,
            transfer_url: "https://upload.example.com/session/abc123".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            completed_bytes: 0,
        }
    }

    #[test]
    fn test_record_path_is_deterministic() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = SessionStore::with_dir(temp_dir.path().to_path_buf()).expect("create store");

        let a = store.record_path(Path::new("/tmp/a.txt"), "Documents/a.txt");
        let b = store.record_path(Path::new("/tmp/a.txt"), "Documents/a.txt");
        let c = store.record_path(Path::new("/tmp/a.txt"), "Documents/b.txt");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.extension().is_some_and(|ext| ext == "json"));

        let stem = a.file_stem().and_then(|s| s.to_str()).expect("stem");
        assert_eq!(stem.len(), 64);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_expired_record_cleaned_up_on_load() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = SessionStore::with_dir(temp_dir.path().to_path_buf()).expect("create store");

        let mut session = test_session(temp_dir.path());
        session.expires_at = Utc::now() - Duration::minutes(5);
        store.save(&session).expect("save");

        let record = store.record_path(&session.local_path, &session.remote_path);
        assert!(record.exists());

        let loaded = store
            .load(&session.local_path, &session.remote_path)
            .expect("load");
        assert!(loaded.is_none());
        assert!(!record.exists(), "expired record should be deleted");
    }

    #[test]
    fn test_delete_is_idempotent() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = SessionStore::with_dir(temp_dir.path().to_path_buf()).expect("create store");

        let session = test_session(temp_dir.path());
        store.save(&session).expect("save");

        store
            .delete(&session.local_path, &session.remote_path)
            .expect("first delete");
        store
            .delete(&session.local_path, &session.remote_path)
            .expect("second delete");
        store
            .delete(Path::new("/never/saved"), "nothing")
            .expect("delete absent");
    }
}
