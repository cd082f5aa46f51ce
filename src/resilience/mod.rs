//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Route config:
//!     shortcut.rs (positional args) or structured table
//!     → policy.rs (BreakerPolicy)
//!
//! Request on a guarded route:
//!     → filter.rs (look up breaker, ask for a permit)
//!     → registry.rs (lazy per-name breaker creation)
//!     → circuit_breaker.rs (CLOSED / OPEN / HALF_OPEN state machine)
//!     → timeouts.rs (slow-call deadline on the downstream call)
//!     → window.rs (count-based outcome window, failure rate)
//!     → On failure or rejection: fallback destination
//! ```
//!
//! # Design Decisions
//! - One breaker per name, shared by every route that names it
//! - Breaker state is in memory only; reloads keep it, restarts drop it
//! - Every downstream call has a deadline; overrunning it counts as a failure
//! - Breaker locks are never held across I/O

pub mod circuit_breaker;
pub mod filter;
pub mod policy;
pub mod registry;
pub mod shortcut;
pub mod timeouts;
pub mod window;

pub use circuit_breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CallPermit, CircuitBreaker};
pub use filter::{BreakerBinding, CircuitBreakerFilter, FallbackReason, FilterContext, FilterError};
pub use policy::{BreakerOverrides, BreakerPolicy, ConfigError};
pub use registry::{BreakerRegistry, RegistryError};
pub use window::Outcome;
