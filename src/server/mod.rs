// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! DNS resolver and HTTPS reverse proxy servers

pub mod dns;
pub mod proxy;

pub use dns::{Resolver, ResolverStatus};
pub use proxy::ReverseProxy;
