//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the middleware chain in its fixed order
//! - Create the Axum router that hands every request to the chain
//! - Wire up tracing, request IDs and the request timeout
//! - Start the output watcher in development mode
//! - Serve on the allocated listener until shutdown

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::assets::{watcher, AssetMiddleware, AssetWatcher, ArtifactStore};
use crate::config::{DevServerConfig, Mode};
use crate::http::chain::MiddlewareChain;
use crate::http::proxy::{ProxyError, ProxyMiddleware};
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::live_update::{LiveUpdateHub, LiveUpdateMiddleware};
use crate::observability::metrics;

/// Errors building the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error("failed to read build output at {root}: {source}")]
    Store {
        root: String,
        #[source]
        source: std::io::Error,
    },
}

/// Application state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<MiddlewareChain>,
}

/// The development HTTP server.
pub struct DevServer {
    router: Router,
    config: DevServerConfig,
    chain: Arc<MiddlewareChain>,
    store: Arc<ArtifactStore>,
    hub: LiveUpdateHub,
}

impl DevServer {
    /// Create a server for the given configuration.
    pub fn new(config: DevServerConfig, hub: LiveUpdateHub) -> Result<Self, ServerError> {
        let store = Arc::new(Self::open_store(&config)?);
        let chain = Arc::new(Self::build_chain(&config, store.clone(), hub.clone())?);

        tracing::info!(middlewares = ?chain.names(), "Middleware chain built");

        let router = Self::build_router(&config, AppState { chain: chain.clone() });
        Ok(Self {
            router,
            config,
            chain,
            store,
            hub,
        })
    }

    fn open_store(config: &DevServerConfig) -> Result<ArtifactStore, ServerError> {
        let root = &config.assets.root;
        if config.assets.in_memory {
            ArtifactStore::memory(root).map_err(|source| ServerError::Store {
                root: root.clone(),
                source,
            })
        } else {
            Ok(ArtifactStore::disk(root))
        }
    }

    /// Chain order: API proxy, build output, live-update channel.
    pub fn build_chain(
        config: &DevServerConfig,
        store: Arc<ArtifactStore>,
        hub: LiveUpdateHub,
    ) -> Result<MiddlewareChain, ServerError> {
        let proxy = ProxyMiddleware::new(&config.proxies, &config.timeouts)?;
        let assets = AssetMiddleware::new(&config.assets, store, config.mode);
        let live_update = (config.mode == Mode::Development && config.live_update.enabled)
            .then(|| LiveUpdateMiddleware::new(&config.live_update, hub));

        Ok(MiddlewareChain::builder()
            .with_optional((!proxy.is_empty()).then_some(proxy))
            .with(assets)
            .with_optional(live_update)
            .build())
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &DevServerConfig, state: AppState) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(state)
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(config.timeouts.request_secs),
            ))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id(request),
                )
            }))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// The router, for serving without a listener (tests).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn chain(&self) -> &MiddlewareChain {
        &self.chain
    }

    pub fn hub(&self) -> &LiveUpdateHub {
        &self.hub
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &DevServerConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, mode = %self.config.mode, "HTTP server starting");

        if let Err(e) = watcher::prime(&self.store, &self.hub).await {
            tracing::warn!(error = %e, "Could not read initial build output");
        }

        // Dropping the watcher stops it, so it lives as long as the server.
        let _watcher = if self.config.mode == Mode::Development && self.config.assets.watch {
            let debounce = Duration::from_millis(self.config.assets.debounce_ms);
            match AssetWatcher::new(self.store.clone(), self.hub.clone(), debounce).run() {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::warn!(error = %e, "Output watcher unavailable; live updates disabled");
                    None
                }
            }
        } else {
            None
        };

        let hub = self.hub.clone();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!(clients = hub.client_count(), "Shutdown signal received");
                hub.close();
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Hands every request to the chain.
async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let (response, handler) = state.chain.dispatch(request).await;
    metrics::record_request(handler.unwrap_or("none"), response.status().as_u16(), start);
    response
}
