// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! Administrative privilege detection and escalation
//!
//! Binding port 53/443 and rewriting resolver settings need elevation on
//! every supported platform. Escalation relaunches the current executable
//! elevated and exits this process once the elevated one finishes.

use anyhow::{bail, Context, Result};
use std::process::Command;

/// Whether the current process runs with administrative privileges
pub fn is_admin() -> bool {
    match std::env::consts::OS {
        "windows" => is_admin_windows(),
        "macos" | "linux" => is_admin_unix(),
        other => {
            tracing::warn!("Unsupported platform: {}", other);
            false
        }
    }
}

/// Whether an escalation mechanism is available at all
pub fn can_escalate() -> bool {
    match std::env::consts::OS {
        // UAC is always there to ask
        "windows" => true,
        "macos" | "linux" => Command::new("which")
            .arg("sudo")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false),
        _ => false,
    }
}

/// Relaunch the current executable elevated. On success the current
/// process exits and never returns from this call.
pub fn escalate() -> Result<()> {
    match std::env::consts::OS {
        "windows" => escalate_windows(),
        "macos" | "linux" => escalate_unix(),
        other => bail!("privilege escalation not supported on {}", other),
    }
}

fn is_admin_windows() -> bool {
    // `net session` only succeeds in an elevated shell
    Command::new("net")
        .arg("session")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn is_admin_unix() -> bool {
    Command::new("id")
        .arg("-u")
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).trim() == "0")
        .unwrap_or(false)
}

fn escalate_windows() -> Result<()> {
    let exe = std::env::current_exe().context("failed to get executable path")?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    Command::new("powershell")
        .arg("-Command")
        .arg(format!(
            "Start-Process '{}' -Verb RunAs -ArgumentList '{}'",
            exe.display(),
            args.join("' '")
        ))
        .spawn()
        .context("failed to escalate privileges")?;

    // The elevated process takes over
    std::process::exit(0);
}

fn escalate_unix() -> Result<()> {
    let exe = std::env::current_exe().context("failed to get executable path")?;

    let status = Command::new("sudo")
        .arg(&exe)
        .args(std::env::args().skip(1))
        .status()
        .context("failed to escalate privileges")?;

    if !status.success() {
        bail!("elevated process failed with {}", status);
    }

    std::process::exit(0);
}
