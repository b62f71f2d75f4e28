//! CLI command definitions and handlers.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use anyhow::Context;
use cirrus_core::client::Client;

pub mod download;
pub mod login;
pub mod logout;
pub mod sessions;
pub mod upload;

/// Load configuration with graceful fallback to defaults.
///
/// If the config file doesn't exist or can't be parsed, commands fall
/// back to defaults rather than refusing to run.
pub fn load_config() -> cirrus_core::config::Config {
    cirrus_core::config::Config::load().unwrap_or_default()
}

/// Build a fully wired client from the user's configuration.
pub fn build_client() -> anyhow::Result<Client> {
    Client::new(load_config()).context("Failed to initialize client")
}

/// Cirrus - Cloud file storage from the command line
#[derive(Parser)]
#[command(name = "cirrus")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Sign in with a device code
    Login(LoginArgs),

    /// Sign out and forget stored credentials
    Logout,

    /// Upload a local file, resuming if interrupted
    Upload(UploadArgs),

    /// Download a remote file, resuming if interrupted
    Download(DownloadArgs),

    /// List resumable transfer sessions
    Sessions,
}

/// Arguments for the login command
#[derive(clap::Args)]
pub struct LoginArgs {
    /// Check whether a pending login has completed instead of starting
    /// a new one
    #[arg(long)]
    pub check: bool,
}

/// Arguments for the upload command
#[derive(clap::Args)]
pub struct UploadArgs {
    /// Local file to upload
    pub local: PathBuf,

    /// Destination path relative to the drive root
    pub remote: String,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the download command
#[derive(clap::Args)]
pub struct DownloadArgs {
    /// Remote path relative to the drive root
    pub remote: String,

    /// Local destination file
    pub local: PathBuf,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}
