//! Resumable chunked download.
//!
//! Mirrors the upload engine with byte-range GETs against a
//! pre-authorized download URL. Bytes land in a `.partial` companion file
//! whose length is the resume offset; the file is renamed into place only
//! after the final range arrives, so an interrupted download never leaves
//! a truncated destination behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use reqwest::{Method, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::http::RequestExecutor;
use crate::session::{SessionStore, TransferDirection, TransferSession};

use super::{
    encode_remote_path, progress_channel, total_from_content_range, DownloadSessionResponse,
    TransferOutcome, TransferProgress,
};

/// Chunked download engine.
pub struct DownloadEngine {
    /// Authenticated executor for session creation
    api: Arc<RequestExecutor>,
    /// Unauthenticated executor for the pre-authorized download URL
    chunks: Arc<RequestExecutor>,
    store: Arc<SessionStore>,
    base_url: String,
    chunk_size: u64,
    cancel: CancellationToken,
    progress_tx: watch::Sender<TransferProgress>,
    progress_rx: watch::Receiver<TransferProgress>,
}

impl DownloadEngine {
    /// Create a download engine.
    pub fn new(
        api: Arc<RequestExecutor>,
        chunks: Arc<RequestExecutor>,
        store: Arc<SessionStore>,
        base_url: String,
        chunk_size: u64,
    ) -> Self {
        let (progress_tx, progress_rx) = progress_channel();
        Self {
            api,
            chunks,
            store,
            base_url,
            chunk_size,
            cancel: CancellationToken::new(),
            progress_tx,
            progress_rx,
        }
    }

    /// Get a progress receiver for display purposes.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<TransferProgress> {
        self.progress_rx.clone()
    }

    /// Token that callers cancel to interrupt the transfer between chunks.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Download `remote` into `local`, resuming a prior partial download.
    ///
    /// # Errors
    ///
    /// Propagates classified request errors, session-store failures, and
    /// local I/O failures.
    pub async fn start_or_resume(
        &self,
        remote: &str,
        local: &Path,
    ) -> Result<TransferOutcome> {
        let partial_path = partial_path(local);
        // The partial file's length is the resume offset; for downloads
        // the local disk, not the session record, knows what survived.
        let mut offset = match tokio::fs::metadata(&partial_path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let mut session = match self.store.load(local, remote)? {
            Some(session) => session,
            None => self.create_session(local, remote).await?,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&partial_path)
            .await
            .map_err(|e| {
                Error::Internal(format!("cannot open {}: {e}", partial_path.display()))
            })?;

        self.progress_tx.send_replace(TransferProgress {
            total_bytes: 0,
            transferred_bytes: offset,
        });

        let mut total: Option<u64> = None;
        let mut recreated = false;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(
                    remote,
                    local = %local.display(),
                    offset,
                    "Download interrupted, session retained"
                );
                return Ok(TransferOutcome::Interrupted);
            }

            let mut end = offset + self.chunk_size - 1;
            if let Some(total) = total {
                if offset >= total {
                    break;
                }
                end = end.min(total - 1);
            }

            let headers = vec![("Range".to_string(), format!("bytes={offset}-{end}"))];
            let response = match self
                .chunks
                .execute(Method::GET, &session.transfer_url, &headers, None)
                .await
            {
                Ok(response) => response,
                Err(e) if url_is_dead(&e) && !recreated => {
                    // Pre-authorized URLs are short-lived; mint a new one
                    // and keep the bytes already on disk.
                    tracing::warn!(remote, error = %e, "Download URL rejected, requesting a new one");
                    self.store.delete(local, remote)?;
                    session = self.create_session(local, remote).await?;
                    recreated = true;
                    continue;
                }
                Err(e) => {
                    return Err(e.context(format!(
                        "download of bytes {offset}-{end} failed, re-run the command to resume"
                    )));
                }
            };

            if response.status == StatusCode::OK && offset > 0 {
                return Err(Error::OperationFailed(
                    "server ignored the range request on resume".to_string(),
                ));
            }

            if response.status == StatusCode::PARTIAL_CONTENT {
                let header = response.header("Content-Range").ok_or_else(|| {
                    Error::DecodingFailed("206 response without Content-Range".to_string())
                })?;
                total = Some(total_from_content_range(header)?);
            }

            // An empty 200 body at offset zero is a zero-byte file; an
            // empty 206 means the server is misbehaving.
            let chunk: Bytes = response.body;
            if chunk.is_empty() && response.status == StatusCode::PARTIAL_CONTENT {
                return Err(Error::OperationFailed(
                    "server returned an empty range".to_string(),
                ));
            }

            file.write_all(&chunk)
                .await
                .map_err(|e| {
                    Error::Internal(format!("cannot write {}: {e}", partial_path.display()))
                })?;
            offset += chunk.len() as u64;

            session.completed_bytes = offset;
            self.store.save(&session)?;

            self.progress_tx.send_replace(TransferProgress {
                total_bytes: total.unwrap_or(offset),
                transferred_bytes: offset,
            });

            tracing::debug!(remote, offset, "Range received");

            // A plain 200 carried the whole remaining content.
            if response.status == StatusCode::OK {
                break;
            }
        }

        file.sync_all()
            .await
            .map_err(|e| Error::Internal(format!("cannot sync {}: {e}", partial_path.display())))?;
        drop(file);

        tokio::fs::rename(&partial_path, local).await.map_err(|e| {
            Error::Internal(format!(
                "cannot move {} into place: {e}",
                partial_path.display()
            ))
        })?;

        self.store.delete(local, remote)?;
        tracing::info!(remote, local = %local.display(), bytes = offset, "Download completed");

        Ok(TransferOutcome::Completed)
    }

    async fn create_session(&self, local: &Path, remote: &str) -> Result<TransferSession> {
        let url = format!(
            "{}/drive/root:/{}:/createDownloadSession",
            self.base_url,
            encode_remote_path(remote)
        );
        let response = self
            .api
            .execute(Method::POST, &url, &[], None)
            .await
            .map_err(|e| e.context(format!("creating download session for {remote}")))?;

        let created: DownloadSessionResponse = response
            .json()
            .map_err(|e: Error| e.context("download session response"))?;

        let session = TransferSession {
            local_path: local.to_path_buf(),
            remote_path: remote.to_string(),
            direction: TransferDirection::Download,
            transfer_url: created.download_url,
            expires_at: created.expiration_date_time,
            completed_bytes: 0,
        };
        self.store.save(&session)?;

        tracing::info!(remote, expires_at = %session.expires_at, "Download session created");
        Ok(session)
    }
}

/// Path of the in-progress companion file: `report.pdf.partial`.
fn partial_path(local: &Path) -> PathBuf {
    let mut name = local.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// Whether a range-GET error means the pre-authorized URL is no longer
/// honored.
fn url_is_dead(err: &Error) -> bool {
    matches!(
        err,
        Error::ResourceNotFound(_) | Error::TokenExpired(_) | Error::AccessDenied(_)
    )
}
