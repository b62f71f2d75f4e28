//! # Cirrus Core Library
//!
//! `cirrus-core` provides the core functionality for Cirrus, a
//! command-line client for cloud file storage built around a resilient
//! transfer core.
//!
//! ## Features
//!
//! - **Resumable transfers**: Chunked uploads and downloads driven by
//!   on-disk session records that survive interruption and restarts
//! - **Crash-safe session state**: Hash-named, advisory-locked records
//!   that two concurrent invocations can never corrupt
//! - **Self-refreshing auth**: Transparent OAuth2 token refresh with a
//!   fail-closed persistence callback
//! - **Classified failures**: A closed error taxonomy with bounded
//!   retry/backoff for the retryable categories
//!
//! ## Modules
//!
//! - [`auth`] - Credentials, token refresh, and device-code login
//! - [`client`] - High-level client facade
//! - [`config`] - Configuration management
//! - [`http`] - Transport seam and retrying request executor
//! - [`session`] - Resumable-transfer session persistence
//! - [`transfer`] - Chunked upload/download engines
//!
//! ## Example
//!
//! ```rust,ignore
//! use cirrus_core::client::Client;
//! use cirrus_core::config::Config;
//!
//! let client = Client::new(Config::load()?)?;
//! let engine = client.upload_engine();
//! engine.start_or_resume("report.pdf".as_ref(), "Documents/report.pdf").await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod transfer;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server-mandated upload fragment granularity (320 KiB); chunk sizes
/// must be a multiple of this.
pub const UPLOAD_FRAGMENT_GRANULARITY: u64 = 327_680;

/// Default chunk size for transfers (10 fragments, ~3.1 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * UPLOAD_FRAGMENT_GRANULARITY;
