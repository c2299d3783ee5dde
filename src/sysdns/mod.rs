// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! System DNS configuration management
//!
//! Captures the resolver settings of every manageable network interface,
//! points them at 127.0.0.1 while the appliance runs, and puts them back on
//! shutdown. Windows and macOS are supported through their respective
//! configuration tools; everything else gets an explicit unsupported error
//! so the caller can continue without system-DNS management.

mod macos;
mod windows;

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Snapshot of per-interface resolver settings. An empty server list means
/// the interface was in automatic (DHCP) mode.
pub type DnsSnapshot = BTreeMap<String, Vec<String>>;

/// Snapshot keys that hold fallback data rather than a real network
/// service; never written back
pub const RESERVED_KEYS: [&str; 2] = ["system", "resolv.conf"];

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

struct State {
    original_dns: DnsSnapshot,
    captured: bool,
}

/// Manages system DNS settings across platforms. Capture happens at most
/// once per process; apply and restore work against that snapshot. All
/// operations serialize on an internal mutex so the lifecycle task and the
/// signal handler cannot interleave.
pub struct Manager {
    platform: &'static str,
    state: Mutex<State>,
    handlers_installed: AtomicBool,
}

impl Manager {
    pub fn new() -> Self {
        Self::for_platform(std::env::consts::OS)
    }

    fn for_platform(platform: &'static str) -> Self {
        Self {
            platform,
            state: Mutex::new(State {
                original_dns: DnsSnapshot::new(),
                captured: false,
            }),
            handlers_installed: AtomicBool::new(false),
        }
    }

    /// Read the current resolver settings of every manageable interface.
    /// A second invocation after a successful non-empty capture is a no-op.
    pub fn capture(&self) -> Result<()> {
        let mut state = self.lock();
        if state.captured {
            return Ok(());
        }

        let snapshot = match self.platform {
            "windows" => windows::capture()?,
            "macos" => macos::capture()?,
            other => bail!("unsupported platform: {}", other),
        };

        tracing::debug!(
            "Captured DNS settings for {} interface(s)",
            snapshot.len()
        );

        // An empty result leaves capture retryable (e.g. after reset_all)
        state.captured = !snapshot.is_empty();
        state.original_dns = snapshot;
        Ok(())
    }

    /// Point every captured interface at 127.0.0.1 as primary resolver.
    /// `local_port` is informational; OS resolver settings carry no port.
    pub fn apply(&self, local_port: u16) -> Result<()> {
        let state = self.lock();
        if state.original_dns.is_empty() {
            tracing::warn!("No captured DNS settings; skipping system DNS configuration");
            return Ok(());
        }

        tracing::debug!(
            "Pointing system DNS at 127.0.0.1 (local server on port {})",
            local_port
        );

        let mutated = match self.platform {
            "windows" => windows::apply(&state.original_dns)?,
            "macos" => macos::apply(&state.original_dns)?,
            other => bail!("unsupported platform: {}", other),
        };

        if mutated == 0 {
            bail!("failed to configure DNS on any network interface");
        }

        tracing::debug!("Configured DNS on {} interface(s)", mutated);
        Ok(())
    }

    /// Write the captured settings back. Safe to call any number of times;
    /// per-interface failures are warnings.
    pub fn restore(&self) -> Result<()> {
        let state = self.lock();
        if state.original_dns.is_empty() {
            return Ok(());
        }

        tracing::info!("Restoring original DNS settings...");

        match self.platform {
            "windows" => windows::restore(&state.original_dns),
            "macos" => macos::restore(&state.original_dns),
            other => bail!("unsupported platform: {}", other),
        }

        Ok(())
    }

    /// Force every enumerable interface back to automatic DNS, regardless
    /// of captured state. Recovery path for a previous run that never got
    /// to restore.
    pub fn reset_all_to_auto(&self) -> Result<()> {
        let _state = self.lock();

        tracing::info!("Resetting all network interfaces to automatic DNS...");

        let reset = match self.platform {
            "windows" => windows::reset_all()?,
            "macos" => macos::reset_all()?,
            other => bail!("unsupported platform: {}", other),
        };

        if reset == 0 {
            bail!("failed to reset any network interface");
        }

        tracing::info!("Reset {} interface(s) to automatic DNS", reset);
        Ok(())
    }

    /// Whether capture produced a usable snapshot
    pub fn has_snapshot(&self) -> bool {
        !self.lock().original_dns.is_empty()
    }

    /// The captured settings, for status display
    pub fn snapshot(&self) -> DnsSnapshot {
        self.lock().original_dns.clone()
    }

    /// Install interrupt/termination handlers that restore the captured
    /// settings and then exit the process. Installing twice is a no-op.
    pub fn install_signal_handlers(self: Arc<Self>) {
        if self.handlers_installed.swap(true, Ordering::SeqCst) {
            return;
        }

        let manager = self;
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            tracing::info!("Received interrupt signal, cleaning up...");
            if let Err(e) = manager.restore() {
                tracing::warn!("Failed to restore DNS settings: {}", e);
            }
            std::process::exit(0);
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("sysdns state lock poisoned")
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve when either SIGINT or SIGTERM arrives (ctrl-c only on platforms
/// without SIGTERM)
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Run a configuration tool to completion, collecting its output. Every
/// invocation is a short-lived child whose exit status and streams are
/// drained before this returns.
pub(crate) fn run_tool(program: &str, args: &[&str]) -> Result<String> {
    let output = std::process::Command::new(program)
        .args(args)
        .output()
        .map_err(|e| anyhow::anyhow!("failed to run {} {}: {}", program, args.join(" "), e))?;

    if !output.status.success() {
        bail!(
            "{} {} exited with {}: {}",
            program,
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
