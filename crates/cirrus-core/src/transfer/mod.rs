//! Chunked, resumable transfer engine.
//!
//! Uploads and downloads move data in fixed-size chunks against
//! pre-authorized session URLs, persisting a session record between
//! chunks so an interrupted transfer resumes in a later invocation.
//! Chunks are sent strictly in increasing, contiguous order with one in
//! flight at a time; the server, not the local record, is the source of
//! truth for how many bytes it has durably received.

pub mod download;
pub mod upload;

pub use download::DownloadEngine;
pub use upload::UploadEngine;

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use tokio::sync::watch;

use crate::error::{Error, Result};

/// Terminal outcome of one engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// All bytes acknowledged; the session record has been deleted.
    Completed,
    /// Cancellation observed between chunks; the session record is
    /// retained so the next invocation resumes.
    Interrupted,
}

/// Byte-level progress of a running transfer.
///
/// `transferred_bytes` only ever increases within one invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferProgress {
    /// Total size of the file being transferred
    pub total_bytes: u64,
    /// Bytes confirmed so far (includes bytes confirmed in prior runs)
    pub transferred_bytes: u64,
}

impl TransferProgress {
    /// Progress as a percentage (0.0 - 100.0).
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.transferred_bytes as f64 / self.total_bytes as f64) * 100.0
    }
}

/// Shared progress channel used by both engines.
pub(crate) fn progress_channel() -> (watch::Sender<TransferProgress>, watch::Receiver<TransferProgress>) {
    watch::channel(TransferProgress::default())
}

/// Upload session creation response (shape fixed by the server).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSessionResponse {
    /// Pre-authorized upload URL
    pub upload_url: String,
    /// Server-side session expiry
    pub expiration_date_time: DateTime<Utc>,
}

/// Upload session status, queried on resume.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSessionStatus {
    /// Refreshed server-side session expiry
    #[serde(default)]
    pub expiration_date_time: Option<DateTime<Utc>>,
    /// Byte ranges the server has not yet received, e.g. `["327680-"]`
    #[serde(default)]
    pub next_expected_ranges: Vec<String>,
}

/// Download session creation response (shape fixed by the server).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSessionResponse {
    /// Pre-authorized download URL
    pub download_url: String,
    /// Server-side URL expiry
    pub expiration_date_time: DateTime<Utc>,
}

/// Unreserved characters stay literal inside a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a remote path segment by segment, keeping the `/`
/// separators. Names containing `#`, `?`, or spaces would otherwise
/// truncate the request URL and swallow the `:/create…Session` action.
pub(crate) fn encode_remote_path(remote: &str) -> String {
    remote
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Partition `total` bytes into chunks of `chunk_size`.
///
/// Returns inclusive `(start, end)` offsets: disjoint, contiguous,
/// strictly increasing, covering exactly `total` bytes.
#[must_use]
pub fn chunk_ranges(total: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    assert!(chunk_size > 0, "chunk size must be positive");

    let mut ranges = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + chunk_size - 1).min(total - 1);
        ranges.push((start, end));
        start = end + 1;
    }
    ranges
}

/// Format a `Content-Range` header value for an upload chunk.
#[must_use]
pub fn content_range(start: u64, end: u64, total: u64) -> String {
    format!("bytes {start}-{end}/{total}")
}

/// Parse the resume offset out of the server's next-expected ranges.
///
/// Ranges look like `"327680-"` or `"327680-655359"`; the first range's
/// start is the next byte the server wants. `None` means the server is
/// not expecting any more bytes.
#[must_use]
pub fn next_expected_start(ranges: &[String]) -> Option<u64> {
    let first = ranges.first()?;
    let start = first.split('-').next()?;
    start.parse().ok()
}

/// Parse the total length out of a `Content-Range: bytes 0-999/5000`
/// response header.
pub(crate) fn total_from_content_range(value: &str) -> Result<u64> {
    value
        .rsplit('/')
        .next()
        .and_then(|total| total.parse().ok())
        .ok_or_else(|| {
            Error::DecodingFailed(format!("malformed Content-Range header: {value}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_partition() {
        let ranges = chunk_ranges(800_000, 320_000);
        assert_eq!(
            ranges,
            vec![(0, 319_999), (320_000, 639_999), (640_000, 799_999)]
        );

        // Contiguous, increasing, and summing to the file size.
        let mut expected_start = 0;
        let mut covered = 0;
        for (start, end) in &ranges {
            assert_eq!(*start, expected_start);
            assert!(end >= start);
            covered += end - start + 1;
            expected_start = end + 1;
        }
        assert_eq!(covered, 800_000);
    }

    #[test]
    fn test_chunk_partition_exact_multiple() {
        let ranges = chunk_ranges(640_000, 320_000);
        assert_eq!(ranges, vec![(0, 319_999), (320_000, 639_999)]);
    }

    #[test]
    fn test_chunk_partition_single() {
        assert_eq!(chunk_ranges(100, 320_000), vec![(0, 99)]);
        assert!(chunk_ranges(0, 320_000).is_empty());
    }

    #[test]
    fn test_content_range_format() {
        assert_eq!(content_range(0, 319_999, 800_000), "bytes 0-319999/800000");
    }

    #[test]
    fn test_next_expected_start() {
        assert_eq!(next_expected_start(&["327680-".to_string()]), Some(327_680));
        assert_eq!(
            next_expected_start(&["100-200".to_string(), "300-".to_string()]),
            Some(100)
        );
        assert_eq!(next_expected_start(&[]), None);
    }

    #[test]
    fn test_encode_remote_path() {
        assert_eq!(
            encode_remote_path("Backups/large.bin"),
            "Backups/large.bin"
        );
        assert_eq!(
            encode_remote_path("My Docs/notes#v2.txt"),
            "My%20Docs/notes%23v2.txt"
        );
        assert_eq!(encode_remote_path("a/what?.txt"), "a/what%3F.txt");
    }

    #[test]
    fn test_total_from_content_range() {
        assert_eq!(
            total_from_content_range("bytes 0-999/5000").expect("parse"),
            5000
        );
        assert!(total_from_content_range("bogus").is_err());
    }
}
