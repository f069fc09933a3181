//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TcpListener (from net::port)
//!     → server.rs (Axum setup, tracing, request IDs, timeout)
//!     → chain.rs (ordered middlewares, first answer wins)
//!         → proxy.rs (API reverse proxy)
//!         → assets (build output)
//!         → live_update (SSE channel)
//!     → 404 when the chain is exhausted
//! ```

pub mod chain;
pub mod proxy;
pub mod request;
pub mod server;

pub use chain::{Middleware, MiddlewareChain, Outcome};
pub use proxy::{ProxyError, ProxyMiddleware};
pub use request::X_REQUEST_ID;
pub use server::{DevServer, ServerError};
