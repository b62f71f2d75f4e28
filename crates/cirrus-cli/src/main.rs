//! Cirrus CLI - Cloud file storage from the command line
//!
//! Cirrus uploads and downloads files against a cloud storage account,
//! resuming interrupted transfers where they left off.
//!
//! ## Quick Start
//!
//! ```bash
//! # Sign in (finish in the browser, then check)
//! cirrus login
//! cirrus login --check
//!
//! # Transfer files
//! cirrus upload ./video.mp4 Videos/video.mp4
//! cirrus download Videos/video.mp4 ./video.mp4
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Login(args) => commands::login::run(args).await,
        Command::Logout => commands::logout::run(),
        Command::Upload(args) => commands::upload::run(args).await,
        Command::Download(args) => commands::download::run(args).await,
        Command::Sessions => commands::sessions::run(),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,cirrus=info,cirrus_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
