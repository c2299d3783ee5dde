// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! Socket availability probing

use anyhow::{Context, Result};
use std::net::SocketAddr;

/// Check that both UDP and TCP can bind the address. The probe sockets are
/// dropped immediately so the real listeners can take their place.
pub fn probe_udp_tcp(addr: SocketAddr) -> Result<()> {
    let udp = std::net::UdpSocket::bind(addr)
        .with_context(|| format!("failed to bind UDP port {addr}"))?;
    drop(udp);

    let tcp = std::net::TcpListener::bind(addr)
        .with_context(|| format!("failed to bind TCP port {addr}"))?;
    drop(tcp);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_succeeds_on_free_port() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        assert!(probe_udp_tcp(addr).is_ok());
    }

    #[test]
    fn test_probe_fails_on_occupied_tcp_port() {
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = holder.local_addr().unwrap();

        let err = probe_udp_tcp(addr).unwrap_err().to_string();
        assert!(err.contains("TCP"), "unexpected error: {err}");
    }

    #[test]
    fn test_probe_fails_on_occupied_udp_port() {
        let holder = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = holder.local_addr().unwrap();

        let err = probe_udp_tcp(addr).unwrap_err().to_string();
        assert!(err.contains("UDP"), "unexpected error: {err}");
    }

    #[test]
    fn test_probe_releases_sockets() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        probe_udp_tcp(addr).unwrap();

        // Probing left nothing bound; the same ephemeral request works again
        assert!(probe_udp_tcp(addr).is_ok());
    }
}
