//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    http::{HeaderMap, Request},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use devserver::config::{DevServerConfig, PathRewrite, ProxyRule};
use devserver::live_update::LiveUpdateHub;
use devserver::{DevServer, Shutdown};

/// What a mock upstream saw.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Start a mock upstream that records every request and answers
/// `200 upstream:<path>`.
pub async fn start_recording_backend() -> (SocketAddr, Arc<Mutex<Vec<Recorded>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();

    let app = Router::new().fallback(move |req: Request<axum::body::Body>| {
        let log = log.clone();
        async move {
            let (parts, body) = req.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
            let path = parts.uri.path().to_string();
            log.lock().unwrap().push(Recorded {
                method: parts.method.to_string(),
                path: path.clone(),
                query: parts.uri.query().map(str::to_string),
                headers: parts.headers,
                body,
            });
            format!("upstream:{}", path)
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, seen)
}

/// Start an upstream that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// Sets its flag when dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Start an upstream whose handler sleeps for `delay` before answering.
/// The flag flips when a handler is dropped, finished or not.
pub async fn start_slow_backend(delay: Duration) -> (SocketAddr, Arc<AtomicBool>) {
    let dropped = Arc::new(AtomicBool::new(false));
    let flag = dropped.clone();

    let app = Router::new().fallback(move || {
        let guard = DropFlag(flag.clone());
        async move {
            let _guard = guard;
            tokio::time::sleep(delay).await;
            "late"
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, dropped)
}

/// A port nothing is listening on.
pub async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// The rule from the sample config, pointed at `target`.
pub fn api_rule(target: &str) -> ProxyRule {
    ProxyRule {
        path_prefix: "/api".into(),
        target: target.into(),
        path_rewrite: vec![PathRewrite {
            pattern: "^/api".into(),
            replacement: String::new(),
        }],
        secure: false,
        change_origin: false,
    }
}

/// Defaults with the output directory at `root` and no watcher.
pub fn test_config(root: &Path) -> DevServerConfig {
    let mut config = DevServerConfig::default();
    config.listener.host = "127.0.0.1".into();
    config.assets.root = root.to_string_lossy().into_owned();
    config.assets.watch = false;
    config.timeouts.connect_secs = 2;
    config.timeouts.proxy_secs = 5;
    config
}

/// A dev server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: LiveUpdateHub,
    shutdown: Shutdown,
    handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    pub async fn start(config: DevServerConfig) -> Self {
        let hub = LiveUpdateHub::default();
        let server = DevServer::new(config, hub.clone()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = Shutdown::new();
        let rx: broadcast::Receiver<()> = shutdown.subscribe();
        let handle = tokio::spawn(server.run(listener, rx));

        Self {
            addr,
            hub,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server to stop.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server should stop promptly")
            .unwrap();
        assert!(result.is_ok());
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
