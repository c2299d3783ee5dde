// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! Appliance lifecycle
//!
//! Brings the pieces up in dependency order - capture system DNS, start the
//! resolver with port fallback, point the OS at it, self-test, then the
//! HTTPS proxy - and guarantees the reverse teardown with DNS restoration
//! on shutdown or signal.

use anyhow::{anyhow, bail, Context, Result};
use hickory_proto::op::{Message, MessageType, Query};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, RecordType};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

use crate::certs;
use crate::config::{AppConfig, RedirectRule};
use crate::constants::{DNS_PORT_CANDIDATES, MAX_DNS_MESSAGE_SIZE, SELF_TEST_TIMEOUT_SECS};
use crate::privileges;
use crate::server::{ResolverStatus, ReverseProxy, Resolver};
use crate::sysdns;

/// Combined view of the running appliance
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub resolver: ResolverStatus,
    pub auto_manage: bool,
    pub original_dns: sysdns::DnsSnapshot,
}

/// Owns the resolver, the system-DNS manager and the reverse proxy, and
/// sequences them through startup and shutdown
pub struct Coordinator {
    config: AppConfig,
    resolver: Resolver,
    proxy: ReverseProxy,
    sysdns: Arc<sysdns::Manager>,
    modified_dns: Arc<AtomicBool>,
}

impl Coordinator {
    pub fn new(config: AppConfig) -> Self {
        let resolver = Resolver::new(config.upstream_dns(), &config.dns.redirects);
        let proxy = ReverseProxy::new(
            config.proxy.upstream_url.clone(),
            config.proxy.headers.clone(),
        );

        Self {
            config,
            resolver,
            proxy,
            sysdns: Arc::new(sysdns::Manager::new()),
            modified_dns: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run the full start sequence. Fatal errors abort; degraded-start
    /// conditions (no system-DNS management, failing self-test) log and
    /// continue.
    pub async fn start(&mut self) -> Result<()> {
        if !privileges::is_admin() {
            tracing::warn!("decoy needs to be run as admin to function properly");
            privileges::escalate().context("failed to escalate privileges")?;
        }

        self.capture_system_dns();

        let dns_port = start_with_fallback(
            &mut self.resolver,
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            &DNS_PORT_CANDIDATES,
        )
        .await?;
        tracing::info!("DNS server successfully started on port {}", dns_port);

        if dns_port == 53 {
            tracing::info!(
                "DNS server is running on standard port 53 - no system DNS configuration needed"
            );
        } else if should_manage_system(
            dns_port,
            self.config.dns.auto_manage_system,
            self.sysdns.has_snapshot(),
        ) {
            tracing::info!(
                "Configuring system DNS to use local DNS server on port {}...",
                dns_port
            );
            match self.sysdns.apply(dns_port) {
                Ok(()) => {
                    self.modified_dns.store(true, Ordering::SeqCst);
                    tracing::info!("System DNS configured successfully");
                }
                Err(e) => {
                    tracing::warn!("Failed to configure system DNS: {}", e);
                    tracing::info!(
                        "You may need to manually configure DNS to use 127.0.0.1 (server on port {})",
                        dns_port
                    );
                }
            }
        } else {
            tracing::info!(
                "DNS management disabled or unavailable - manually configure DNS to use 127.0.0.1 (server on port {})",
                dns_port
            );
        }

        if let Err(e) = self_test(dns_port, &self.config.enabled_redirects()).await {
            tracing::warn!("DNS self-test failed: {}", e);
        }

        let cert_name = self.select_certificate()?;
        let handle = certs::load_cert(&cert_name)
            .with_context(|| format!("failed to load certificate {cert_name}"))?;
        let tls = handle.server_config()?;

        let proxy_addr = SocketAddr::new(
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            self.config.proxy_port(),
        );
        self.proxy.start(proxy_addr, tls).await?;

        tracing::info!(
            "Proxy listening on port {} with cert {} and upstream {}",
            self.config.proxy_port(),
            cert_name,
            self.config.proxy.upstream_url
        );
        self.log_redirects();

        Ok(())
    }

    /// Block until an interrupt or termination signal, then tear down
    pub async fn run(&mut self) -> Result<()> {
        sysdns::wait_for_shutdown_signal().await;
        tracing::info!("Application shutting down...");
        self.shutdown().await;
        Ok(())
    }

    /// Reverse of the start sequence: proxy first, then DNS restoration,
    /// then the resolver listeners
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.proxy.stop().await {
            tracing::warn!("Failed to stop proxy: {}", e);
        }

        if self.modified_dns.load(Ordering::SeqCst) {
            if let Err(e) = self.sysdns.restore() {
                tracing::warn!("Failed to restore DNS settings: {}", e);
            }
        }

        if let Err(e) = self.resolver.stop().await {
            tracing::warn!("Failed to stop DNS server: {}", e);
        }
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            resolver: self.resolver.status(),
            auto_manage: self.config.dns.auto_manage_system,
            original_dns: self.sysdns.snapshot(),
        }
    }

    /// Capture current system DNS, with one reset-and-retry pass when the
    /// first capture finds nothing manageable (a previous run that never
    /// restored leaves interfaces pointing at localhost)
    fn capture_system_dns(&self) {
        tracing::info!("Getting current DNS settings...");

        if let Err(e) = self.sysdns.capture() {
            tracing::warn!("Failed to get current DNS settings: {}", e);
            tracing::info!("Continuing without DNS management...");
            return;
        }

        if !self.sysdns.has_snapshot() {
            tracing::warn!("No manageable network interfaces found");
            tracing::info!("Attempting to reset all DNS settings to automatic...");
            match self.sysdns.reset_all_to_auto() {
                Ok(()) => {
                    if let Err(e) = self.sysdns.capture() {
                        tracing::warn!("Still failed to get DNS settings after reset: {}", e);
                    }
                }
                Err(e) => tracing::warn!("Failed to reset DNS automatically: {}", e),
            }
        }

        if self.sysdns.has_snapshot() {
            tracing::info!("Current DNS settings saved");
            self.sysdns.clone().install_signal_handlers();
        } else {
            tracing::info!("Continuing without DNS management...");
        }
    }

    /// The certificate identity to serve: the simple-mode domain when
    /// configured, otherwise the sole identity on disk
    fn select_certificate(&self) -> Result<String> {
        if self.config.simple_mode.enabled && !self.config.simple_mode.domain.is_empty() {
            return Ok(certs::safe_cert_name(&self.config.simple_mode.domain));
        }

        let available = certs::list_certs()?;
        match available.len() {
            0 => bail!("no certificates found under certs/; create one first"),
            1 => Ok(available.into_iter().next().expect("checked length")),
            _ => bail!(
                "multiple certificates available ({}); enable simple_mode to pick one",
                available.join(", ")
            ),
        }
    }

    fn log_redirects(&self) {
        let enabled = self.config.enabled_redirects();
        if enabled.is_empty() {
            tracing::warn!("No DNS redirects configured!");
            return;
        }

        tracing::info!("Active DNS redirects:");
        for redirect in enabled {
            tracing::info!(
                "  {} -> {} ({})",
                redirect.domain,
                redirect.target,
                redirect.description
            );
        }
    }
}

/// Whether system DNS should be rewritten for this port choice. Port 53
/// needs no mutation beyond pointing clients at 127.0.0.1, which is what
/// the OS already does for its configured resolver.
fn should_manage_system(port: u16, auto_manage: bool, has_snapshot: bool) -> bool {
    port != 53 && auto_manage && has_snapshot
}

/// Try the candidate ports in order; the first address where both
/// transports bind wins
async fn start_with_fallback(
    resolver: &mut Resolver,
    host: IpAddr,
    ports: &[u16],
) -> Result<u16> {
    let mut last_err = None;

    for &port in ports {
        let addr = SocketAddr::new(host, port);
        tracing::debug!("Trying to start DNS server on port {}", port);
        match resolver.start(addr).await {
            Ok(()) => return Ok(port),
            Err(e) => {
                tracing::debug!("Port {} failed: {}", port, e);
                last_err = Some(e);
            }
        }
    }

    Err(match last_err {
        Some(e) => e.context("failed to start DNS server on any port"),
        None => anyhow!("no DNS ports to try"),
    })
}

/// Send a synthetic A query for the first enabled redirect to the freshly
/// bound resolver and check the answer matches the rule target
async fn self_test(port: u16, redirects: &[RedirectRule]) -> Result<()> {
    let Some(rule) = redirects.first() else {
        tracing::info!("No DNS redirects configured - skipping test");
        return Ok(());
    };

    // Wildcards need a concrete test subdomain
    let test_domain = match rule.domain.strip_prefix('*') {
        Some(suffix) => format!("test{suffix}"),
        None => rule.domain.clone(),
    };

    let mut query = Message::new();
    query
        .set_id((std::process::id() & 0xFFFF) as u16)
        .set_message_type(MessageType::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(
            Name::from_str(&test_domain)
                .map_err(|e| anyhow!("invalid test domain {}: {}", test_domain, e))?,
            RecordType::A,
        ));
    let query_bytes = query.to_vec().context("failed to encode test query")?;

    let exchange = async {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        socket.connect(("127.0.0.1", port)).await?;
        socket.send(&query_bytes).await?;
        let mut buf = vec![0u8; MAX_DNS_MESSAGE_SIZE];
        let len = socket.recv(&mut buf).await?;
        buf.truncate(len);
        Ok::<_, std::io::Error>(buf)
    };

    let reply = tokio::time::timeout(Duration::from_secs(SELF_TEST_TIMEOUT_SECS), exchange)
        .await
        .map_err(|_| anyhow!("DNS test timed out"))?
        .context("DNS test exchange failed")?;

    let response = Message::from_vec(&reply).context("failed to parse test response")?;
    let answer = response
        .answers()
        .first()
        .ok_or_else(|| anyhow!("no DNS answer received for test domain {}", test_domain))?;

    let expected: IpAddr = rule
        .target
        .parse()
        .map_err(|e| anyhow!("invalid rule target {}: {}", rule.target, e))?;

    match answer.data() {
        Some(RData::A(A(addr))) if IpAddr::V4(*addr) == expected => {
            tracing::debug!(
                "DNS test successful: {} redirected to {}",
                test_domain,
                addr
            );
            Ok(())
        }
        Some(RData::A(A(addr))) => Err(anyhow!(
            "unexpected DNS response: got {}, expected {}",
            addr,
            expected
        )),
        _ => Err(anyhow!("unexpected DNS response type")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(domain: &str, target: &str) -> RedirectRule {
        RedirectRule {
            domain: domain.to_string(),
            target: target.to_string(),
            description: String::new(),
            enabled: true,
        }
    }

    #[test]
    fn test_should_manage_system_skips_port_53() {
        assert!(!should_manage_system(53, true, true));
        assert!(should_manage_system(8053, true, true));
    }

    #[test]
    fn test_should_manage_system_needs_flag_and_snapshot() {
        assert!(!should_manage_system(8053, false, true));
        assert!(!should_manage_system(8053, true, false));
    }

    #[tokio::test]
    async fn test_fallback_picks_first_free_port() {
        // Occupy the first candidate so the second must win
        let _holder = std::net::TcpListener::bind("127.0.0.1:15856").unwrap();

        let mut resolver = Resolver::new("1.1.1.1:53".to_string(), &[]);
        let port = start_with_fallback(
            &mut resolver,
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            &[15856, 15857],
        )
        .await
        .unwrap();

        assert_eq!(port, 15857);
        resolver.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_fallback_fails_when_all_occupied() {
        let _holders: Vec<_> = [15858, 15859]
            .iter()
            .map(|p| std::net::TcpListener::bind(("127.0.0.1", *p)).unwrap())
            .collect();

        let mut resolver = Resolver::new("1.1.1.1:53".to_string(), &[]);
        let result = start_with_fallback(
            &mut resolver,
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            &[15858, 15859],
        )
        .await;

        assert!(result.is_err());
        // Nothing may stay bound after a failed fallback run
        crate::netutil::probe_udp_tcp("127.0.0.1:15858".parse().unwrap()).unwrap_err();
        drop(_holders);
        crate::netutil::probe_udp_tcp("127.0.0.1:15859".parse().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_self_test_against_live_resolver() {
        let mut resolver = Resolver::new(
            "1.1.1.1:53".to_string(),
            &[rule("*.ol.epicgames.com", "127.0.0.1")],
        );
        resolver.start("127.0.0.1:15860".parse().unwrap()).await.unwrap();

        self_test(15860, &[rule("*.ol.epicgames.com", "127.0.0.1")])
            .await
            .unwrap();

        // Mismatched expectation must be reported
        let err = self_test(15860, &[rule("*.ol.epicgames.com", "10.9.9.9")])
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("unexpected DNS response"));

        resolver.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_self_test_skips_without_redirects() {
        assert!(self_test(1, &[]).await.is_ok());
    }
}
