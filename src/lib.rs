//! Frontend development server library.

pub mod assets;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod live_update;
pub mod net;
pub mod observability;

pub use config::schema::DevServerConfig;
pub use http::DevServer;
pub use lifecycle::Shutdown;
