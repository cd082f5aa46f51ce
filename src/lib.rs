//! Breaker gateway library.
//!
//! A request-routing gateway whose routes can be guarded by named circuit
//! breakers that send traffic to a fallback destination while a downstream
//! is failing.

pub mod admin;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
