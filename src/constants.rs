// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

/// DNS ports tried in order when starting the resolver; the first port where
/// both UDP and TCP bind wins
pub const DNS_PORT_CANDIDATES: [u16; 5] = [53, 8053, 5353, 9053, 10053];

/// TTL for synthesized redirect answers, in seconds
pub const REDIRECT_TTL: u32 = 300;

/// Timeout for a single upstream DNS exchange
pub const UPSTREAM_TIMEOUT_SECS: u64 = 5;

/// Timeout for the startup self-test query
pub const SELF_TEST_TIMEOUT_SECS: u64 = 2;

/// Grace period when stopping a listener
pub const SHUTDOWN_GRACE_SECS: u64 = 5;

/// Header carrying the URL the client originally requested
pub const ORIGINAL_URL_HEADER: &str = "X-Epic-URL";

/// Largest DNS message accepted on either transport
pub const MAX_DNS_MESSAGE_SIZE: usize = 4096;

/// Request body cap on the HTTPS listener (1 GiB)
pub const PROXY_BODY_LIMIT: usize = 1024 * 1024 * 1024;

/// Default HTTPS listener port
pub const PROXY_PORT: u16 = 443;

/// Path of the configuration document
pub const CONFIG_PATH: &str = "config.json";

/// Directory holding certificate identities (`certs/<name>/{cert,key}.pem`)
pub const CERTS_DIR: &str = "certs";
