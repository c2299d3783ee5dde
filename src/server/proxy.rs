// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! TLS-terminating reverse proxy
//!
//! Accepts HTTPS connections with the operator-selected certificate,
//! records the URL the client was actually talking to in a header, applies
//! the configured header overlay and forwards the request to the plain-HTTP
//! upstream, streaming both bodies.

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, HOST};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_rustls::TlsAcceptor;

use crate::constants::{ORIGINAL_URL_HEADER, PROXY_BODY_LIMIT, SHUTDOWN_GRACE_SECS};

type ProxyBody = BoxBody<Bytes, hyper::Error>;

struct ProxyState {
    upstream_url: String,
    overlay: BTreeMap<String, String>,
    client: Client<HttpConnector, Limited<Incoming>>,
}

struct Running {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// The HTTPS reverse proxy service
pub struct ReverseProxy {
    upstream_url: String,
    overlay: BTreeMap<String, String>,
    running: Option<Running>,
}

impl ReverseProxy {
    /// Create a proxy forwarding to `upstream_url` (scheme://host[:port]),
    /// applying `overlay` headers to every request
    pub fn new(upstream_url: String, overlay: BTreeMap<String, String>) -> Self {
        Self {
            upstream_url,
            overlay,
            running: None,
        }
    }

    /// Bind the HTTPS listener on `addr`, serving the supplied certificate
    pub async fn start(&mut self, addr: SocketAddr, tls: rustls::ServerConfig) -> Result<()> {
        if self.running.is_some() {
            return Err(anyhow!("proxy already started"));
        }

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind HTTPS port {addr}"))?;
        let local_addr = listener.local_addr().context("failed to read bound address")?;

        let state = Arc::new(ProxyState {
            upstream_url: self.upstream_url.clone(),
            overlay: self.overlay.clone(),
            client: Client::builder(TokioExecutor::new()).build_http(),
        });

        let acceptor = TlsAcceptor::from(Arc::new(tls));
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(run_accept_loop(listener, acceptor, state, rx));

        tracing::info!("HTTPS proxy listening on {}", local_addr);

        self.running = Some(Running {
            local_addr,
            shutdown,
            task,
        });
        Ok(())
    }

    /// Stop accepting connections and give in-flight requests the grace
    /// period to finish
    pub async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.task.await {
            tracing::warn!("Proxy listener task failed during shutdown: {}", e);
        }

        tracing::info!("HTTPS proxy stopped");
        Ok(())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }
}

async fn run_accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    state: Arc<ProxyState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };

                let acceptor = acceptor.clone();
                let state = state.clone();
                connections.spawn(async move {
                    let tls_stream = match acceptor.accept(stream).await {
                        Ok(stream) => stream,
                        Err(e) => {
                            tracing::debug!("TLS handshake with {} failed: {}", peer, e);
                            return;
                        }
                    };

                    let service = service_fn(move |req| handle_request(state.clone(), req));
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(tls_stream), service)
                        .await
                    {
                        tracing::debug!("Connection from {} ended: {}", peer, e);
                    }
                });
            }
        }
    }

    // Drain in-flight connections for the grace period, then abandon them
    let grace = Duration::from_secs(SHUTDOWN_GRACE_SECS);
    let drain = async {
        while connections.join_next().await.is_some() {}
    };
    if tokio::time::timeout(grace, drain).await.is_err() {
        tracing::debug!("Abandoning connections still open after grace period");
        connections.abort_all();
    }
}

async fn handle_request(
    state: Arc<ProxyState>,
    req: Request<Incoming>,
) -> std::result::Result<Response<ProxyBody>, Infallible> {
    let original_url = original_url_value(req.headers(), req.uri());
    let target = build_target_url(&state.upstream_url, req.uri());

    tracing::debug!("{} {} -> {}", req.method(), req.uri(), target);

    let target_uri: Uri = match target.parse() {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!("Invalid upstream URL {}: {}", target, e);
            return Ok(json_error_response(&format!("invalid upstream URL: {e}")));
        }
    };

    let (mut parts, body) = req.into_parts();
    prepare_headers(&mut parts.headers, &original_url, &state.overlay);

    let mut outbound = Request::builder()
        .method(parts.method)
        .uri(target_uri)
        .body(Limited::new(body, PROXY_BODY_LIMIT))
        .expect("request from parsed parts");
    *outbound.headers_mut() = parts.headers;

    match state.client.request(outbound).await {
        Ok(response) => Ok(response.map(|body| body.boxed())),
        Err(e) => {
            tracing::error!("Upstream request failed: {}", e);
            Ok(json_error_response(&e.to_string()))
        }
    }
}

/// The value recorded in the original-URL header: an explicit client header
/// wins; otherwise a non-localhost Host yields the reconstructed inbound
/// URL; the loopback case passes the (possibly empty) header through.
fn original_url_value(headers: &HeaderMap, uri: &Uri) -> String {
    if let Some(value) = headers.get(ORIGINAL_URL_HEADER) {
        if let Ok(value) = value.to_str() {
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }

    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let hostname = host.split(':').next().unwrap_or("");

    if !host.is_empty() && hostname != "localhost" {
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        return format!("https://{host}{path_and_query}");
    }

    // Loopback: whatever the client sent, which may be nothing
    headers
        .get(ORIGINAL_URL_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Upstream target: base plus inbound path plus the query string. The `?`
/// separator goes out even when the query is empty; upstreams are expected
/// to tolerate it.
fn build_target_url(upstream_base: &str, uri: &Uri) -> String {
    format!(
        "{}{}?{}",
        upstream_base,
        uri.path(),
        uri.query().unwrap_or("")
    )
}

/// Rewrite the outbound header set: record the original URL, lay the
/// configured overlay on top (overlay wins on collision), and drop the
/// inbound Host so the client derives it from the target
fn prepare_headers(headers: &mut HeaderMap, original_url: &str, overlay: &BTreeMap<String, String>) {
    match HeaderValue::from_str(original_url) {
        Ok(value) => {
            headers.insert(ORIGINAL_URL_HEADER, value);
        }
        Err(_) => tracing::warn!("Original URL not representable as header value"),
    }

    for (name, value) in overlay {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            tracing::warn!("Skipping invalid header name {:?}", name);
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            tracing::warn!("Skipping invalid value for header {}", name);
            continue;
        };
        headers.insert(name, value);
    }

    headers.remove(HOST);
}

fn json_error_response(cause: &str) -> Response<ProxyBody> {
    let body = serde_json::json!({
        "code": 500,
        "message": "Internal Server Error",
        "error": cause,
    })
    .to_string();

    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(full_body(body))
        .expect("static error response")
}

fn full_body(data: impl Into<Bytes>) -> ProxyBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}
