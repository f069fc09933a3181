//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! devserver.toml (optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, operator warnings)
//!     → CLI overrides (port, host, mode)
//!     → DevServerConfig (validated, immutable)
//!     → handed to the allocator and the middleware chain
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the chain is built from it once
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::AssetsConfig;
pub use schema::DevServerConfig;
pub use schema::ListenerConfig;
pub use schema::LiveUpdateConfig;
pub use schema::Mode;
pub use schema::PathRewrite;
pub use schema::ProxyRule;
pub use schema::TimeoutConfig;
