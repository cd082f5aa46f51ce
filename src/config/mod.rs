//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, route and breaker compilation)
//!     → GatewayConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps in a new route table; live breakers are kept
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Breaker defaults and the breaker cap are read once at startup

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, LoadError};
pub use schema::{
    AdminConfig, BreakerDefaults, BreakerSpec, GatewayConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, RouteConfig, SecurityConfig, StructuredBreaker, TimeoutConfig,
};
pub use validation::{compile_routes, validate_config, ValidationError};
