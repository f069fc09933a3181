//! API reverse-proxy middleware.
//!
//! # Responsibilities
//! - Match requests by path prefix, in rule order
//! - Rewrite the path (regex patterns) and join it onto the target origin
//! - Forward method, headers and a streamed body
//! - Stream the upstream response back untouched
//! - Map upstream failures to 502 / 504
//!
//! # Design Decisions
//! - One HTTP client per rule; TLS verification is a per-rule setting
//! - Redirects are returned to the caller, never followed
//! - Hop-by-hop headers are stripped in both directions
//! - Dropping the handler future (client gone) drops the upstream request

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::ConnectInfo,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use futures_util::{future::BoxFuture, StreamExt};
use regex::Regex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use url::Url;

use crate::config::{ProxyRule, TimeoutConfig};
use crate::http::chain::{Middleware, Outcome};
use crate::observability::metrics;

/// Headers that describe a single connection and must not be forwarded.
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Errors raised while compiling proxy rules.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid proxy target '{target}': {source}")]
    Target {
        target: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid path rewrite '{pattern}': {source}")]
    Rewrite {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// A proxy rule ready to serve traffic.
#[derive(Debug)]
struct CompiledRule {
    prefix: String,
    target: Url,
    rewrites: Vec<(Regex, String)>,
    change_origin: bool,
    client: reqwest::Client,
}

impl CompiledRule {
    fn compile(rule: &ProxyRule, timeouts: &TimeoutConfig) -> Result<Self, ProxyError> {
        let target = Url::parse(&rule.target).map_err(|source| ProxyError::Target {
            target: rule.target.clone(),
            source,
        })?;

        let rewrites = rule
            .path_rewrite
            .iter()
            .map(|r| {
                Regex::new(&r.pattern)
                    .map(|re| (re, r.replacement.clone()))
                    .map_err(|source| ProxyError::Rewrite {
                        pattern: r.pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(!rule.secure)
            .no_proxy()
            .build()?;

        if !rule.secure {
            tracing::warn!(
                prefix = %rule.path_prefix,
                upstream = %target,
                "TLS certificate verification disabled for proxy target"
            );
        }

        Ok(Self {
            prefix: rule.path_prefix.clone(),
            target,
            rewrites,
            change_origin: rule.change_origin,
            client,
        })
    }

    fn matches_path(&self, path: &str) -> bool {
        prefix_matches(&self.prefix, path)
    }

    fn rewrite_path(&self, path: &str) -> String {
        let mut out = path.to_string();
        for (pattern, replacement) in &self.rewrites {
            out = pattern.replace(&out, replacement.as_str()).into_owned();
        }
        if !out.starts_with('/') {
            out.insert(0, '/');
        }
        out
    }

    /// Target URL for a request URI: target origin + rewritten path + query.
    fn upstream_url(&self, uri: &Uri) -> Result<Url, url::ParseError> {
        let path = self.rewrite_path(uri.path());
        let base = self.target.as_str().trim_end_matches('/');
        let mut url = format!("{}{}", base, path);
        if let Some(query) = uri.query() {
            url.push('?');
            url.push_str(query);
        }
        Url::parse(&url)
    }
}

/// True when `path` is `prefix` itself or lies beneath it.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" || prefix.ends_with('/') {
        return path.starts_with(prefix);
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in Connection are hop-by-hop as well.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in HOP_BY_HOP.iter().chain(named.iter()) {
        headers.remove(name);
    }
}

/// Forwards matching requests to their configured target origin.
pub struct ProxyMiddleware {
    rules: Vec<CompiledRule>,
    response_timeout: Duration,
}

impl ProxyMiddleware {
    /// Compile the rules. Order is kept: the first matching rule wins.
    pub fn new(rules: &[ProxyRule], timeouts: &TimeoutConfig) -> Result<Self, ProxyError> {
        let rules = rules
            .iter()
            .map(|r| CompiledRule::compile(r, timeouts))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules,
            response_timeout: Duration::from_secs(timeouts.proxy_secs),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn rule_for(&self, path: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.matches_path(path))
    }

    async fn forward(&self, rule: &CompiledRule, req: Request<Body>) -> Response {
        let start = Instant::now();
        let url = match rule.upstream_url(req.uri()) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(uri = %req.uri(), error = %e, "Could not build upstream URL");
                return (StatusCode::BAD_REQUEST, "Invalid proxied path").into_response();
            }
        };

        let (parts, body) = req.into_parts();
        let has_body = announces_body(&parts.headers);
        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);

        let original_host = headers.get(header::HOST).cloned();
        if rule.change_origin {
            headers.remove(header::HOST);
        }
        if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            append_forwarded_for(&mut headers, peer);
        }
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
        if let Some(host) = original_host {
            headers.insert(X_FORWARDED_HOST, host);
        }

        tracing::debug!(
            method = %parts.method,
            from = %parts.uri,
            to = %url,
            "Proxying request"
        );

        let mut builder = rule
            .client
            .request(parts.method.clone(), url.clone())
            .headers(headers);
        if has_body {
            builder = builder.body(stream_body(body));
        }

        let upstream = match tokio::time::timeout(self.response_timeout, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let status = if e.is_timeout() {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::BAD_GATEWAY
                };
                tracing::warn!(upstream = %url, error = %e, status = %status, "Upstream request failed");
                metrics::record_upstream(&rule.prefix, status.as_u16(), start);
                return (status, "Upstream request failed").into_response();
            }
            Err(_) => {
                tracing::warn!(upstream = %url, timeout = ?self.response_timeout, "Upstream timed out");
                metrics::record_upstream(&rule.prefix, 504, start);
                return (StatusCode::GATEWAY_TIMEOUT, "Upstream timed out").into_response();
            }
        };

        let status = upstream.status();
        metrics::record_upstream(&rule.prefix, status.as_u16(), start);

        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        response
    }
}

/// HTTP/1.1 requests carry a body only when a length or chunked coding is announced.
fn announces_body(headers: &HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_LENGTH)
        || headers
            .get(header::TRANSFER_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
}

/// Pump the incoming body into the upstream request chunk by chunk.
///
/// The pump stops as soon as the upstream side is dropped.
fn stream_body(body: Body) -> reqwest::Body {
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(8);
    tokio::spawn(async move {
        let mut stream = body.into_data_stream();
        while let Some(chunk) = stream.next().await {
            if tx.send(chunk.map_err(std::io::Error::other)).await.is_err() {
                break;
            }
        }
    });
    reqwest::Body::wrap_stream(ReceiverStream::new(rx))
}

fn append_forwarded_for(headers: &mut HeaderMap, peer: &SocketAddr) {
    let ip = peer.ip().to_string();
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.is_empty() => format!("{}, {}", existing, ip),
        _ => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

impl Middleware for ProxyMiddleware {
    fn name(&self) -> &str {
        "proxy"
    }

    fn matches(&self, req: &Request<Body>) -> bool {
        self.rule_for(req.uri().path()).is_some()
    }

    fn handle(&self, req: Request<Body>) -> BoxFuture<'_, Outcome> {
        Box::pin(async move {
            match self.rule_for(req.uri().path()) {
                Some(rule) => Outcome::Handled(self.forward(rule, req).await),
                None => Outcome::Pass(req),
            }
        })
    }
}
