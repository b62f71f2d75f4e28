//! Resumable chunked upload.
//!
//! State machine: no session → create session → uploading → completed,
//! with uploading → interrupted (record retained) → uploading on the next
//! run. On resume the engine never trusts the locally recorded offset; it
//! asks the server which byte the session expects next, because only the
//! server knows what was durably received.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::Method;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::http::RequestExecutor;
use crate::session::{SessionStore, TransferDirection, TransferSession};

use super::{
    content_range, encode_remote_path, next_expected_start, progress_channel, TransferOutcome,
    TransferProgress, UploadSessionResponse, UploadSessionStatus,
};

/// Chunked upload engine.
pub struct UploadEngine {
    /// Authenticated executor for session creation
    api: Arc<RequestExecutor>,
    /// Unauthenticated executor for the session URL itself; the URL is a
    /// time-limited credential and the server rejects a bearer token on it
    chunks: Arc<RequestExecutor>,
    store: Arc<SessionStore>,
    base_url: String,
    chunk_size: u64,
    cancel: CancellationToken,
    progress_tx: watch::Sender<TransferProgress>,
    progress_rx: watch::Receiver<TransferProgress>,
}

impl UploadEngine {
    /// Create an upload engine.
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

    /// Upload `local` to `remote`, resuming a prior session if one exists.
    ///
    /// On success the session record is deleted. On chunk failure the
    /// record is deliberately retained and the error tells the user to
    /// re-run the command.
    ///
    /// # Errors
    ///
    /// Propagates classified request errors, session-store failures, and
    /// local I/O failures.
    pub async fn start_or_resume(
        &self,
        local: &Path,
        remote: &str,
    ) -> Result<TransferOutcome> {
        let metadata = tokio::fs::metadata(local)
            .await
            .map_err(|e| Error::Internal(format!("cannot read {}: {e}", local.display())))?;
        let total = metadata.len();
        if total == 0 {
            return Err(Error::InvalidRequest(format!(
                "{} is empty, chunked upload needs at least one byte",
                local.display()
            )));
        }

        let (session, offset) = self.resolve_session(local, remote, total).await?;

        let mut file = tokio::fs::File::open(local)
            .await
            .map_err(|e| Error::Internal(format!("cannot open {}: {e}", local.display())))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| Error::Internal(format!("cannot seek {}: {e}", local.display())))?;

        self.progress_tx.send_replace(TransferProgress {
            total_bytes: total,
            transferred_bytes: offset,
        });

        let mut session = session;
        let mut offset = offset;
        while offset < total {
            if self.cancel.is_cancelled() {
                tracing::info!(
                    local = %local.display(),
                    remote,
                    offset,
                    "Upload interrupted, session retained"
                );
                return Ok(TransferOutcome::Interrupted);
            }

            let end = (offset + self.chunk_size - 1).min(total - 1);
            let len = end - offset + 1;

            let mut buffer = vec![0u8; usize::try_from(len).map_err(|_| {
                Error::Internal(format!("chunk of {len} bytes exceeds addressable memory"))
            })?];
            file.read_exact(&mut buffer)
                .await
                .map_err(|e| Error::Internal(format!("cannot read {}: {e}", local.display())))?;

            let headers = vec![
                (
                    "Content-Range".to_string(),
                    content_range(offset, end, total),
                ),
                ("Content-Length".to_string(), len.to_string()),
            ];

            // 202 acknowledges an intermediate chunk; the final chunk
            // comes back 201 (new item) or 200 (overwrite).
            self.chunks
                .execute(
                    Method::PUT,
                    &session.transfer_url,
                    &headers,
                    Some(Bytes::from(buffer)),
                )
                .await
                .map_err(|e| {
                    e.context(format!(
                        "upload of bytes {offset}-{end} failed, re-run the command to resume"
                    ))
                })?;

            offset = end + 1;
            session.completed_bytes = offset;
            self.store.save(&session)?;

            self.progress_tx.send_replace(TransferProgress {
                total_bytes: total,
                transferred_bytes: offset,
            });

            tracing::debug!(remote, offset, total, "Chunk acknowledged");
        }

        self.store.delete(local, remote)?;
        tracing::info!(local = %local.display(), remote, total, "Upload completed");

        Ok(TransferOutcome::Completed)
    }

    /// Find a resumable session and its authoritative resume offset, or
    /// create a fresh session starting at zero.
    async fn resolve_session(
        &self,
        local: &Path,
        remote: &str,
        total: u64,
    ) -> Result<(TransferSession, u64)> {
        if let Some(existing) = self.store.load(local, remote)? {
            match self.query_status(&existing.transfer_url).await {
                Ok(status) => {
                    if let Some(next) = next_expected_start(&status.next_expected_ranges) {
                        let mut session = existing;
                        // The status query may extend the session lifetime;
                        // keep the record's expiry in step so cleanup never
                        // purges a session the server still honors.
                        if let Some(expires) = status.expiration_date_time {
                            if expires != session.expires_at {
                                session.expires_at = expires;
                                self.store.save(&session)?;
                            }
                        }
                        tracing::info!(
                            remote,
                            resume_from = next,
                            "Resuming upload from server-reported offset"
                        );
                        return Ok((session, next));
                    }
                    // The server expects nothing more but we never saw the
                    // final acknowledgment; restart to get a clean result.
                    tracing::warn!(remote, "Stale upload session, starting fresh");
                    self.store.delete(local, remote)?;
                }
                Err(e) if session_is_dead(&e) => {
                    tracing::warn!(remote, error = %e, "Upload session rejected by server, starting fresh");
                    self.store.delete(local, remote)?;
                }
                Err(e) => return Err(e.context("querying upload session status")),
            }
        }

        let url = format!(
            "{}/drive/root:/{}:/createUploadSession",
            self.base_url,
            encode_remote_path(remote)
        );
        let response = self
            .api
            .execute(
                Method::POST,
                &url,
                &[(
                    "Content-Type".to_string(),
                    "application/json".to_string(),
                )],
                Some(Bytes::from_static(b"{}")),
            )
            .await
            .map_err(|e| e.context(format!("creating upload session for {remote}")))?;

        let created: UploadSessionResponse = response
            .json()
            .map_err(|e: Error| e.context("upload session response"))?;

        let session = TransferSession {
            local_path: local.to_path_buf(),
            remote_path: remote.to_string(),
            direction: TransferDirection::Upload,
            transfer_url: created.upload_url,
            expires_at: created.expiration_date_time,
            completed_bytes: 0,
        };
        self.store.save(&session)?;

        tracing::info!(remote, total, expires_at = %session.expires_at, "Upload session created");
        Ok((session, 0))
    }

    async fn query_status(&self, session_url: &str) -> Result<UploadSessionStatus> {
        let response = self
            .chunks
            .execute(Method::GET, session_url, &[], None)
            .await?;
        response.json()
    }
}

/// Whether a status-query error means the server no longer honors the
/// session, as opposed to a transient failure worth propagating.
fn session_is_dead(err: &Error) -> bool {
    matches!(
        err,
        Error::ResourceNotFound(_)
            | Error::InvalidRequest(_)
            | Error::TokenExpired(_)
            | Error::AccessDenied(_)
    )
}
