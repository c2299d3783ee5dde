// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! Decoy - local traffic interception appliance
//!
//! Runs a selective-rewrite DNS resolver that answers a configurable set of
//! domains with a local address, points the operating system's resolver
//! settings at it, and terminates TLS for the redirected hosts on a reverse
//! proxy that forwards the decrypted traffic to a configurable upstream.

pub mod certs;
pub mod config;
pub mod constants;
pub mod lifecycle;
pub mod netutil;
pub mod privileges;
pub mod rules;
pub mod server;
pub mod sysdns;

pub use constants::*;

// Re-export commonly used types
pub use config::{AppConfig, RedirectRule};
pub use lifecycle::{Coordinator, ServiceStatus};
pub use server::{Resolver, ResolverStatus, ReverseProxy};

/// Common error type for decoy operations
pub type Result<T> = std::result::Result<T, anyhow::Error>;
