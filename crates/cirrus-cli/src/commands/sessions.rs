//! Sessions command implementation.

use anyhow::{Context, Result};

use cirrus_core::session::TransferDirection;

use crate::ui::format_size;

/// Run the sessions command.
pub fn run() -> Result<()> {
    let client = super::build_client()?;

    let sessions = client
        .sessions()
        .context("Failed to list transfer sessions")?;

    if sessions.is_empty() {
        println!("No resumable transfers.");
        return Ok(());
    }

    for session in sessions {
        match session.direction {
            TransferDirection::Upload => println!(
                "  upload  {}  ->  {}",
                session.local_path.display(),
                session.remote_path
            ),
            TransferDirection::Download => println!(
                "download  {}  ->  {}",
                session.remote_path,
                session.local_path.display()
            ),
        }
        println!(
            "          {} transferred, expires {}",
            format_size(session.completed_bytes),
            session.expires_at.format("%Y-%m-%d %H:%M UTC")
        );
    }

    Ok(())
}
