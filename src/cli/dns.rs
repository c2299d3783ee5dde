// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! DNS recovery commands

use anyhow::{Context, Result};
use decoy::sysdns;

/// Force every network interface back to automatic DNS. Recovery for a
/// previous session that exited without restoring.
pub fn reset() -> Result<()> {
    let manager = sysdns::Manager::new();
    manager
        .reset_all_to_auto()
        .context("failed to reset DNS settings")?;

    println!("All network interfaces reset to automatic DNS.");
    Ok(())
}
