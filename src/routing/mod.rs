//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)          forward:/path
//!     → router.rs (route lookup)  ←────────────┘
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched Route or None
//!
//! Route Compilation (at startup and on reload):
//!     RouteSpec[]
//!     → Compile matchers and breaker filters
//!     → Sort by priority, then prefix length
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled up front, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins

pub mod matcher;
pub mod router;

pub use router::{Route, RouteSpec, Router};
