// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! Selective-rewrite DNS resolver
//!
//! Serves UDP and TCP on the same address. Questions matching a redirect
//! rule get synthesized answers pointing at the configured target; anything
//! else is forwarded verbatim to the upstream resolver and the reply is
//! relayed back unchanged.

use anyhow::{anyhow, Context, Result};
use hickory_proto::op::{Header, Message, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{RData, Record, RecordType};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::RedirectRule;
use crate::constants::{
    MAX_DNS_MESSAGE_SIZE, REDIRECT_TTL, SHUTDOWN_GRACE_SECS, UPSTREAM_TIMEOUT_SECS,
};
use crate::netutil::probe_udp_tcp;
use crate::rules::RewriteMaps;

/// Point-in-time view of the resolver, suitable for display
#[derive(Debug, Clone, Serialize)]
pub struct ResolverStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub exact_redirects: BTreeMap<String, String>,
    pub wildcard_redirects: BTreeMap<String, String>,
    pub upstream_dns: String,
    pub enabled_count: usize,
    pub total_count: usize,
}

/// Rule-derived state, rebuilt wholesale on reload. Readers clone the `Arc`
/// out of the lock, so an in-flight query keeps a consistent view while a
/// reload swaps in the next one.
struct RuleSnapshot {
    maps: RewriteMaps,
    enabled_count: usize,
    total_count: usize,
    /// Rule domains with wildcards stripped, used to pick out forwarded
    /// queries worth logging
    interesting: Vec<String>,
}

impl RuleSnapshot {
    fn build(rules: &[RedirectRule]) -> Self {
        let enabled: Vec<RedirectRule> = rules.iter().filter(|r| r.enabled).cloned().collect();
        let interesting = enabled
            .iter()
            .map(|r| {
                r.domain
                    .trim_start_matches("*.")
                    .trim_end_matches('.')
                    .to_lowercase()
            })
            .collect();

        Self {
            maps: RewriteMaps::build(&enabled),
            enabled_count: enabled.len(),
            total_count: rules.len(),
            interesting,
        }
    }
}

/// Shared state each listener task needs to answer a query
#[derive(Clone)]
struct HandlerCtx {
    upstream_dns: String,
    snapshot: Arc<RwLock<Arc<RuleSnapshot>>>,
}

impl HandlerCtx {
    fn snapshot(&self) -> Arc<RuleSnapshot> {
        self.snapshot
            .read()
            .expect("rule snapshot lock poisoned")
            .clone()
    }
}

struct Running {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    udp_task: JoinHandle<()>,
    tcp_task: JoinHandle<()>,
}

/// The DNS resolver service
pub struct Resolver {
    upstream_dns: String,
    snapshot: Arc<RwLock<Arc<RuleSnapshot>>>,
    running: Option<Running>,
}

impl Resolver {
    /// Create a resolver forwarding misses to `upstream_dns` (`host:port`),
    /// with rewrite maps built from the enabled rules in `rules`
    pub fn new(upstream_dns: String, rules: &[RedirectRule]) -> Self {
        Self {
            upstream_dns,
            snapshot: Arc::new(RwLock::new(Arc::new(RuleSnapshot::build(rules)))),
            running: None,
        }
    }

    /// Bind UDP and TCP listeners on `addr` and start serving. Either both
    /// transports come up or neither does.
    pub async fn start(&mut self, addr: SocketAddr) -> Result<()> {
        if self.running.is_some() {
            return Err(anyhow!("resolver already started"));
        }

        // Probe first so a conflict surfaces before any real socket exists
        probe_udp_tcp(addr)?;

        let udp = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("failed to bind UDP port {addr}"))?;
        let tcp = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                // Release the UDP socket before reporting the pair as failed
                drop(udp);
                return Err(e).with_context(|| format!("failed to bind TCP port {addr}"));
            }
        };

        let local_addr = udp.local_addr().context("failed to read bound address")?;
        let ctx = HandlerCtx {
            upstream_dns: self.upstream_dns.clone(),
            snapshot: self.snapshot.clone(),
        };

        let (shutdown, _) = watch::channel(false);
        let udp_task = tokio::spawn(run_udp(Arc::new(udp), ctx.clone(), shutdown.subscribe()));
        let tcp_task = tokio::spawn(run_tcp(tcp, ctx, shutdown.subscribe()));

        tracing::info!("DNS server listening on {} (UDP/TCP)", local_addr);

        self.running = Some(Running {
            local_addr,
            shutdown,
            udp_task,
            tcp_task,
        });
        Ok(())
    }

    /// Stop both listeners, waiting up to the grace period per transport.
    /// In-flight queries finish on their own; they are not cancelled.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        let _ = running.shutdown.send(true);
        let grace = Duration::from_secs(SHUTDOWN_GRACE_SECS);

        for (name, task) in [("UDP", running.udp_task), ("TCP", running.tcp_task)] {
            if tokio::time::timeout(grace, task).await.is_err() {
                tracing::warn!("{} listener did not stop within grace period", name);
            }
        }

        tracing::info!("DNS server stopped");
        Ok(())
    }

    /// Rebuild the rewrite maps from a fresh rule set. Atomic: queries see
    /// either the old maps or the new ones, never a mix.
    pub fn reload(&self, rules: &[RedirectRule]) {
        let next = Arc::new(RuleSnapshot::build(rules));
        let enabled = next.enabled_count;
        *self.snapshot.write().expect("rule snapshot lock poisoned") = next;
        tracing::info!("Reloaded {} active DNS redirects", enabled);
    }

    pub fn status(&self) -> ResolverStatus {
        let snapshot = self
            .snapshot
            .read()
            .expect("rule snapshot lock poisoned")
            .clone();
        ResolverStatus {
            running: self.running.is_some(),
            port: self.running.as_ref().map(|r| r.local_addr.port()),
            exact_redirects: snapshot.maps.exact_view(),
            wildcard_redirects: snapshot.maps.wildcard_view(),
            upstream_dns: self.upstream_dns.clone(),
            enabled_count: snapshot.enabled_count,
            total_count: snapshot.total_count,
        }
    }

    /// Address of the bound listeners, when running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }
}

async fn run_udp(socket: Arc<UdpSocket>, ctx: HandlerCtx, mut shutdown: watch::Receiver<bool>) {
    let mut buf = [0u8; MAX_DNS_MESSAGE_SIZE];

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            result = socket.recv_from(&mut buf) => {
                let (len, src) = match result {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::error!("UDP recv error: {}", e);
                        continue;
                    }
                };

                let query = buf[..len].to_vec();
                let socket = socket.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Some(response) = handle_message(&ctx, &query).await {
                        if let Err(e) = socket.send_to(&response, src).await {
                            tracing::error!("Failed to send DNS response to {}: {}", src, e);
                        }
                    }
                });
            }
        }
    }
}

async fn run_tcp(listener: TcpListener, ctx: HandlerCtx, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_tcp_connection(stream, ctx).await {
                                tracing::debug!("TCP connection from {} ended: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => tracing::error!("TCP accept error: {}", e),
                }
            }
        }
    }
}

/// Serve length-prefixed DNS messages on one TCP connection until the peer
/// closes it
async fn serve_tcp_connection(mut stream: TcpStream, ctx: HandlerCtx) -> Result<()> {
    loop {
        let mut len_buf = [0u8; 2];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        let msg_len = u16::from_be_bytes(len_buf) as usize;
        if msg_len == 0 || msg_len > MAX_DNS_MESSAGE_SIZE {
            return Err(anyhow!("invalid TCP DNS message length {}", msg_len));
        }

        let mut msg = vec![0u8; msg_len];
        stream.read_exact(&mut msg).await?;

        if let Some(response) = handle_message(&ctx, &msg).await {
            stream
                .write_all(&(response.len() as u16).to_be_bytes())
                .await?;
            stream.write_all(&response).await?;
        }
    }
}

/// Answer a single DNS message. Returns the wire-format response, or `None`
/// for garbage that should be dropped.
async fn handle_message(ctx: &HandlerCtx, query_bytes: &[u8]) -> Option<Vec<u8>> {
    let request = match Message::from_vec(query_bytes) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!("Dropping unparseable DNS message: {}", e);
            return None;
        }
    };

    let snapshot = ctx.snapshot();
    let mut response = reply_to(&request);

    // Questions are matched in order; the first one without a redirect
    // short-circuits to forwarding the whole original message.
    for query in request.queries() {
        let name = query.name().to_utf8();

        match snapshot.maps.lookup(&name) {
            Some(target) => {
                tracing::debug!(
                    "DNS query (redirecting): {} {} -> {}",
                    name,
                    query.query_type(),
                    target
                );
                synthesize_answer(&mut response, query, target);
            }
            None => {
                if snapshot
                    .interesting
                    .iter()
                    .any(|s| name.to_lowercase().contains(s))
                {
                    tracing::debug!(
                        "Forwarding to {}: {} {}",
                        ctx.upstream_dns,
                        name,
                        query.query_type()
                    );
                }
                return Some(forward_or_servfail(ctx, query_bytes, &request).await);
            }
        }
    }

    encode(response)
}

/// Start a response echoing the request's id, opcode, questions and
/// recursion-desired flag, with AA and RA set
fn reply_to(request: &Message) -> Message {
    let mut header = Header::response_from_request(request.header());
    header.set_authoritative(true);
    header.set_recursion_available(true);

    let mut response = Message::new();
    response.set_header(header);
    for query in request.queries() {
        response.add_query(query.clone());
    }
    response
}

/// Append the synthesized record for one redirected question. The answer
/// NAME is the question name as sent, case included.
fn synthesize_answer(response: &mut Message, query: &hickory_proto::op::Query, target: IpAddr) {
    let name = query.name().clone();

    match query.query_type() {
        RecordType::A => {
            if let IpAddr::V4(v4) = target {
                response.add_answer(Record::from_rdata(name, REDIRECT_TTL, RData::A(A(v4))));
            }
        }
        RecordType::AAAA => {
            let v6 = match target {
                IpAddr::V6(v6) => v6,
                IpAddr::V4(v4) if v4 == Ipv4Addr::LOCALHOST => std::net::Ipv6Addr::LOCALHOST,
                IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            };
            response.add_answer(Record::from_rdata(name, REDIRECT_TTL, RData::AAAA(AAAA(v6))));
        }
        RecordType::CNAME => {
            // Flattened: answer with the address record directly
            let rdata = match target {
                IpAddr::V4(v4) => RData::A(A(v4)),
                IpAddr::V6(v6) => RData::AAAA(AAAA(v6)),
            };
            response.add_answer(Record::from_rdata(name, REDIRECT_TTL, rdata));
        }
        _ => {
            response.set_response_code(ResponseCode::NXDomain);
        }
    }
}

/// Relay the verbatim request to the upstream resolver, falling back to a
/// SERVFAIL reply when the exchange fails
async fn forward_or_servfail(ctx: &HandlerCtx, query_bytes: &[u8], request: &Message) -> Vec<u8> {
    match forward_upstream(query_bytes, &ctx.upstream_dns).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!("Failed to query upstream DNS {}: {}", ctx.upstream_dns, e);
            let mut response = reply_to(request);
            response.set_response_code(ResponseCode::ServFail);
            encode(response).unwrap_or_default()
        }
    }
}

/// One UDP exchange with the upstream resolver: the original bytes go out
/// unchanged and the reply comes back unchanged. Replies whose transaction
/// id does not match the query are ignored until the deadline.
async fn forward_upstream(query_bytes: &[u8], upstream: &str) -> Result<Vec<u8>> {
    let exchange = async {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("failed to bind upstream socket")?;
        socket
            .connect(upstream)
            .await
            .with_context(|| format!("failed to reach upstream {upstream}"))?;
        socket
            .send(query_bytes)
            .await
            .context("failed to send upstream query")?;

        let mut buf = vec![0u8; MAX_DNS_MESSAGE_SIZE];
        loop {
            let len = socket
                .recv(&mut buf)
                .await
                .context("failed to receive upstream reply")?;
            if len >= 2 && buf[..2] == query_bytes[..2] {
                buf.truncate(len);
                return Ok(buf);
            }
            tracing::debug!("Ignoring upstream reply with mismatched transaction id");
        }
    };

    tokio::time::timeout(Duration::from_secs(UPSTREAM_TIMEOUT_SECS), exchange)
        .await
        .map_err(|_| anyhow!("upstream DNS {} timed out", upstream))?
}

fn encode(response: Message) -> Option<Vec<u8>> {
    match response.to_vec() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::error!("Failed to encode DNS response: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedirectRule;
    use hickory_proto::op::{MessageType, Query};
    use hickory_proto::rr::Name;
    use std::str::FromStr;

    fn rule(domain: &str, target: &str) -> RedirectRule {
        RedirectRule {
            domain: domain.to_string(),
            target: target.to_string(),
            description: String::new(),
            enabled: true,
        }
    }

    fn ctx(rules: &[RedirectRule], upstream: &str) -> HandlerCtx {
        HandlerCtx {
            upstream_dns: upstream.to_string(),
            snapshot: Arc::new(RwLock::new(Arc::new(RuleSnapshot::build(rules)))),
        }
    }

    fn query_bytes(id: u16, name: &str, qtype: RecordType) -> Vec<u8> {
        let mut msg = Message::new();
        msg.set_id(id)
            .set_message_type(MessageType::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(Name::from_str(name).unwrap(), qtype));
        msg.to_vec().unwrap()
    }

    #[tokio::test]
    async fn test_redirect_hit_synthesizes_a_record() {
        let ctx = ctx(&[rule("*.ol.epicgames.com", "127.0.0.1")], "1.1.1.1:53");
        let query = query_bytes(0x1234, "foo.ol.epicgames.com.", RecordType::A);

        let response = handle_message(&ctx, &query).await.unwrap();
        let msg = Message::from_vec(&response).unwrap();

        assert_eq!(msg.id(), 0x1234);
        assert!(msg.authoritative());
        assert!(msg.recursion_available());
        assert_eq!(msg.response_code(), ResponseCode::NoError);
        assert_eq!(msg.answers().len(), 1);

        let answer = &msg.answers()[0];
        assert_eq!(answer.ttl(), 300);
        assert_eq!(
            answer.data(),
            Some(&RData::A(A(Ipv4Addr::new(127, 0, 0, 1))))
        );
    }

    #[tokio::test]
    async fn test_redirect_preserves_question_case() {
        let ctx = ctx(&[rule("*.ol.epicgames.com", "127.0.0.1")], "1.1.1.1:53");
        let query = query_bytes(7, "FOO.OL.EpicGames.COM.", RecordType::A);

        let response = handle_message(&ctx, &query).await.unwrap();
        let msg = Message::from_vec(&response).unwrap();

        assert_eq!(msg.answers().len(), 1);
        assert_eq!(msg.answers()[0].name().to_utf8(), "FOO.OL.EpicGames.COM.");
    }

    #[tokio::test]
    async fn test_aaaa_for_loopback_target_is_v6_loopback() {
        let ctx = ctx(&[rule("*.ol.epicgames.com", "127.0.0.1")], "1.1.1.1:53");
        let query = query_bytes(1, "foo.ol.epicgames.com.", RecordType::AAAA);

        let response = handle_message(&ctx, &query).await.unwrap();
        let msg = Message::from_vec(&response).unwrap();

        assert_eq!(
            msg.answers()[0].data(),
            Some(&RData::AAAA(AAAA(std::net::Ipv6Addr::LOCALHOST)))
        );
    }

    #[tokio::test]
    async fn test_aaaa_for_other_v4_target_is_mapped() {
        let ctx = ctx(&[rule("x.example.com", "10.1.2.3")], "1.1.1.1:53");
        let query = query_bytes(1, "x.example.com.", RecordType::AAAA);

        let response = handle_message(&ctx, &query).await.unwrap();
        let msg = Message::from_vec(&response).unwrap();

        let expected: std::net::Ipv6Addr = Ipv4Addr::new(10, 1, 2, 3).to_ipv6_mapped();
        assert_eq!(msg.answers()[0].data(), Some(&RData::AAAA(AAAA(expected))));
    }

    #[tokio::test]
    async fn test_cname_query_flattens_to_a() {
        let ctx = ctx(&[rule("x.example.com", "127.0.0.1")], "1.1.1.1:53");
        let query = query_bytes(1, "x.example.com.", RecordType::CNAME);

        let response = handle_message(&ctx, &query).await.unwrap();
        let msg = Message::from_vec(&response).unwrap();

        assert_eq!(
            msg.answers()[0].data(),
            Some(&RData::A(A(Ipv4Addr::LOCALHOST)))
        );
        assert_eq!(msg.answers()[0].record_type(), RecordType::A);
    }

    #[tokio::test]
    async fn test_unsupported_qtype_is_nxdomain() {
        let ctx = ctx(&[rule("*.ol.epicgames.com", "127.0.0.1")], "1.1.1.1:53");
        let query = query_bytes(1, "foo.ol.epicgames.com.", RecordType::MX);

        let response = handle_message(&ctx, &query).await.unwrap();
        let msg = Message::from_vec(&response).unwrap();

        assert_eq!(msg.response_code(), ResponseCode::NXDomain);
        assert!(msg.answers().is_empty());
    }

    #[tokio::test]
    async fn test_miss_relays_upstream_reply_unchanged() {
        // Stub upstream: echoes the query back with the response bit set
        let upstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let upstream_addr = upstream.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; MAX_DNS_MESSAGE_SIZE];
            let (len, src) = upstream.recv_from(&mut buf).await.unwrap();
            buf[2] |= 0x80;
            upstream.send_to(&buf[..len], src).await.unwrap();
        });

        let ctx = ctx(
            &[rule("*.ol.epicgames.com", "127.0.0.1")],
            &upstream_addr.to_string(),
        );
        let query = query_bytes(0xBEEF, "example.org.", RecordType::A);

        let mut expected = query.clone();
        expected[2] |= 0x80;

        let response = handle_message(&ctx, &query).await.unwrap();
        assert_eq!(response, expected);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_yields_servfail() {
        // Nothing listens on this port; the refused exchange must come back
        // as SERVFAIL with the request id
        let ctx = ctx(&[], "127.0.0.1:1");
        let query = query_bytes(0x4242, "example.org.", RecordType::A);

        let response = handle_message(&ctx, &query).await.unwrap();
        let msg = Message::from_vec(&response).unwrap();

        assert_eq!(msg.id(), 0x4242);
        assert_eq!(msg.response_code(), ResponseCode::ServFail);
        assert!(msg.answers().is_empty());
    }

    #[tokio::test]
    async fn test_garbage_is_dropped() {
        let ctx = ctx(&[], "1.1.1.1:53");
        assert!(handle_message(&ctx, &[0x00, 0x01, 0x02]).await.is_none());
    }

    #[tokio::test]
    async fn test_reload_swaps_rules_atomically() {
        let resolver = Resolver::new(
            "1.1.1.1:53".to_string(),
            &[rule("a.example.com", "127.0.0.1")],
        );

        let before = resolver.status();
        assert_eq!(before.enabled_count, 1);
        assert!(before.exact_redirects.contains_key("a.example.com."));

        resolver.reload(&[rule("b.example.com", "127.0.0.1")]);

        let after = resolver.status();
        assert_eq!(after.enabled_count, 1);
        assert!(!after.exact_redirects.contains_key("a.example.com."));
        assert!(after.exact_redirects.contains_key("b.example.com."));
    }

    #[tokio::test]
    async fn test_status_counts_disabled_rules() {
        let mut disabled = rule("off.example.com", "127.0.0.1");
        disabled.enabled = false;
        let resolver = Resolver::new(
            "1.1.1.1:53".to_string(),
            &[rule("on.example.com", "127.0.0.1"), disabled],
        );

        let status = resolver.status();
        assert_eq!(status.enabled_count, 1);
        assert_eq!(status.total_count, 2);
        assert!(!status.running);
        assert!(status.exact_redirects.contains_key("on.example.com."));
        assert!(!status.exact_redirects.contains_key("off.example.com."));
    }

    #[tokio::test]
    async fn test_udp_and_tcp_listeners_answer_identically() {
        let addr: SocketAddr = "127.0.0.1:15853".parse().unwrap();
        let mut resolver = Resolver::new(
            "1.1.1.1:53".to_string(),
            &[rule("*.ol.epicgames.com", "127.0.0.1")],
        );
        resolver.start(addr).await.unwrap();

        let query = query_bytes(0x0101, "foo.ol.epicgames.com.", RecordType::A);

        // UDP
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&query, addr).await.unwrap();
        let mut buf = [0u8; MAX_DNS_MESSAGE_SIZE];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let udp_response = buf[..len].to_vec();

        // TCP, same query with length framing
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&(query.len() as u16).to_be_bytes())
            .await
            .unwrap();
        stream.write_all(&query).await.unwrap();
        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await.unwrap();
        let mut tcp_response = vec![0u8; u16::from_be_bytes(len_buf) as usize];
        stream.read_exact(&mut tcp_response).await.unwrap();

        assert_eq!(udp_response, tcp_response);

        let msg = Message::from_vec(&udp_response).unwrap();
        assert_eq!(msg.answers().len(), 1);

        resolver.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_releases_ports() {
        let addr: SocketAddr = "127.0.0.1:15854".parse().unwrap();
        let mut resolver = Resolver::new("1.1.1.1:53".to_string(), &[]);
        resolver.start(addr).await.unwrap();
        assert_eq!(resolver.local_addr(), Some(addr));

        resolver.stop().await.unwrap();
        assert!(resolver.local_addr().is_none());

        // Both transports must be bindable again
        probe_udp_tcp(addr).unwrap();
    }

    #[tokio::test]
    async fn test_start_fails_when_tcp_taken_and_releases_udp() {
        let addr: SocketAddr = "127.0.0.1:15855".parse().unwrap();
        let _holder = std::net::TcpListener::bind(addr).unwrap();

        let mut resolver = Resolver::new("1.1.1.1:53".to_string(), &[]);
        assert!(resolver.start(addr).await.is_err());

        // The UDP side must not stay bound after the failed pair
        std::net::UdpSocket::bind(addr).unwrap();
    }
}
