//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Route definitions mapping requests to origins.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Process-wide circuit breaker defaults.
    pub circuit_breaker: BreakerDefaults,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,

    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Route configuration mapping requests to an origin.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Host header to match (exact match).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,

    /// Origin to forward to (`http://host[:port][/path]`).
    pub uri: String,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    /// Optional circuit breaker guarding this route.
    #[serde(default)]
    pub circuit_breaker: Option<BreakerSpec>,
}

/// Circuit breaker settings for one route.
///
/// Either the positional shortcut string
/// (`name,fallbackUri[,statusCodes[,failureRateThreshold[,waitIntervalInOpenState]]]`)
/// or a table with the same fields.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum BreakerSpec {
    Shortcut(String),
    Structured(StructuredBreaker),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StructuredBreaker {
    pub name: String,

    pub fallback_uri: String,

    /// Entries use the same syntax as the shortcut field (`"500"`, `"404:500"`, `"BAD_GATEWAY"`).
    #[serde(default)]
    pub status_codes: Vec<String>,

    pub failure_rate_threshold: Option<f32>,

    /// Bare integers are milliseconds; otherwise a humantime literal such as `"2m"`.
    pub wait_interval_in_open_state: Option<String>,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Idle connection timeout in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            idle_secs: 60,
        }
    }
}

/// Defaults applied to every breaker unless its policy or a customization overrides them.
///
/// Read once at startup; a reload does not change the defaults of the live registry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerDefaults {
    /// Failure percentage in (0, 100] above which a closed breaker opens.
    pub failure_rate_threshold: f32,

    /// Time an open breaker rejects calls before allowing trial calls.
    pub wait_duration_open_secs: u64,

    /// Number of outcomes kept in the closed-state window.
    pub sliding_window_size: usize,

    /// Outcomes required before the failure rate is evaluated.
    pub minimum_number_of_calls: usize,

    /// Trial calls allowed while half-open.
    pub permitted_calls_in_half_open: usize,

    /// Downstream calls running longer than this are abandoned and counted as failures.
    pub slow_call_threshold_ms: u64,

    /// Cap on distinct breaker names (unbounded when unset).
    pub max_breakers: Option<usize>,
}

impl Default for BreakerDefaults {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            wait_duration_open_secs: 60,
            sliding_window_size: 100,
            minimum_number_of_calls: 100,
            permitted_calls_in_half_open: 10,
            slow_call_threshold_ms: 1000,
            max_breakers: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Plain,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Request hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum buffered request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
