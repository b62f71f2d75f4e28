//! Logout command implementation.

use anyhow::{Context, Result};

/// Run the logout command.
pub fn run() -> Result<()> {
    let client = super::build_client()?;

    client.logout().context("Failed to log out")?;
    println!("Signed out.");

    Ok(())
}
