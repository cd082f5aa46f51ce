//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Compile route entries, including their breaker policies and fallbacks
//! - Validate value ranges (timeouts > 0, addresses parse, thresholds in range)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system; a route with a bad breaker
//!   definition is never activated

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{BreakerDefaults, BreakerSpec, GatewayConfig, RouteConfig};
use crate::dispatch::{Destination, DestinationError};
use crate::resilience::filter::BreakerBinding;
use crate::resilience::policy::{BreakerPolicy, ConfigError};
use crate::resilience::shortcut::{expand_status_codes, parse_duration, parse_shortcut};
use crate::routing::RouteSpec;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} `{value}` is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("circuit_breaker.{field}: {reason}")]
    InvalidDefault { field: &'static str, reason: String },

    #[error("duplicate route name `{0}`")]
    DuplicateRoute(String),

    #[error("route `{route}`: path_prefix `{prefix}` must start with '/'")]
    InvalidPathPrefix { route: String, prefix: String },

    #[error("route `{route}`: {source}")]
    InvalidUri {
        route: String,
        #[source]
        source: DestinationError,
    },

    #[error("route `{route}`: uri `{uri}` must be an http origin")]
    ForwardRouteUri { route: String, uri: String },

    #[error("route `{route}`: circuit breaker: {source}")]
    Breaker {
        route: String,
        #[source]
        source: ConfigError,
    },

    #[error("route `{route}`: circuit breaker fallback: {source}")]
    Fallback {
        route: String,
        #[source]
        source: DestinationError,
    },
}

/// Validate the whole configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }

    for (field, value) in [
        ("connect_secs", config.timeouts.connect_secs),
        ("request_secs", config.timeouts.request_secs),
        ("idle_secs", config.timeouts.idle_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(field));
        }
    }

    errors.extend(validate_defaults(&config.circuit_breaker));

    if let Err(route_errors) = compile_routes(&config.routes) {
        errors.extend(route_errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn validate_defaults(defaults: &BreakerDefaults) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut invalid = |field: &'static str, reason: &str| {
        errors.push(ValidationError::InvalidDefault {
            field,
            reason: reason.to_string(),
        })
    };

    let threshold = defaults.failure_rate_threshold;
    if !(threshold.is_finite() && threshold > 0.0 && threshold <= 100.0) {
        invalid("failure_rate_threshold", "must be in (0, 100]");
    }
    if defaults.wait_duration_open_secs == 0 {
        invalid("wait_duration_open_secs", "must be greater than zero");
    }
    if defaults.sliding_window_size == 0 {
        invalid("sliding_window_size", "must be greater than zero");
    }
    if defaults.permitted_calls_in_half_open == 0 {
        invalid("permitted_calls_in_half_open", "must be greater than zero");
    }
    if defaults.slow_call_threshold_ms == 0 {
        invalid("slow_call_threshold_ms", "must be greater than zero");
    }
    if defaults.max_breakers == Some(0) {
        invalid("max_breakers", "must be greater than zero when set");
    }
    errors
}

/// Turn route entries into compiled route specs, collecting every error.
pub fn compile_routes(routes: &[RouteConfig]) -> Result<Vec<RouteSpec>, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();
    let mut specs = Vec::with_capacity(routes.len());

    for route in routes {
        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }
        match compile_route(route) {
            Ok(spec) => specs.push(spec),
            Err(route_errors) => errors.extend(route_errors),
        }
    }

    if errors.is_empty() {
        Ok(specs)
    } else {
        Err(errors)
    }
}

fn compile_route(route: &RouteConfig) -> Result<RouteSpec, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let name = || route.name.clone();

    if let Some(prefix) = &route.path_prefix {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::InvalidPathPrefix {
                route: name(),
                prefix: prefix.clone(),
            });
        }
    }

    let destination = match route.uri.parse::<Destination>() {
        Ok(Destination::Forward(_)) => {
            errors.push(ValidationError::ForwardRouteUri {
                route: name(),
                uri: route.uri.clone(),
            });
            None
        }
        Ok(destination) => Some(destination),
        Err(source) => {
            errors.push(ValidationError::InvalidUri { route: name(), source });
            None
        }
    };

    let breaker = match route.circuit_breaker.as_ref().map(breaker_policy) {
        None => None,
        Some(Err(source)) => {
            errors.push(ValidationError::Breaker { route: name(), source });
            None
        }
        Some(Ok(policy)) => match BreakerBinding::new(policy) {
            Ok(binding) => Some(binding),
            Err(source) => {
                errors.push(ValidationError::Fallback { route: name(), source });
                None
            }
        },
    };

    match destination {
        Some(destination) if errors.is_empty() => Ok(RouteSpec {
            name: route.name.clone(),
            host: route.host.clone(),
            path_prefix: route.path_prefix.clone(),
            priority: route.priority,
            destination,
            breaker,
        }),
        _ => Err(errors),
    }
}

/// Build the policy for either config form.
pub fn breaker_policy(spec: &BreakerSpec) -> Result<BreakerPolicy, ConfigError> {
    match spec {
        BreakerSpec::Shortcut(shortcut) => parse_shortcut(shortcut),
        BreakerSpec::Structured(table) => {
            let mut policy = BreakerPolicy::new(&table.name, &table.fallback_uri)?
                .with_status_codes(expand_status_codes(&table.status_codes));
            if let Some(threshold) = table.failure_rate_threshold {
                policy = policy.with_failure_rate_threshold(threshold)?;
            }
            if let Some(wait) = &table.wait_interval_in_open_state {
                policy = policy.with_wait_duration_open(parse_duration(wait)?)?;
            }
            Ok(policy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::StructuredBreaker;
    use std::time::Duration;

    fn route(name: &str, uri: &str, breaker: Option<&str>) -> RouteConfig {
        RouteConfig {
            name: name.to_string(),
            host: None,
            path_prefix: Some(format!("/{name}")),
            uri: uri.to_string(),
            priority: 0,
            circuit_breaker: breaker.map(|s| BreakerSpec::Shortcut(s.to_string())),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_compile_valid_routes() {
        let specs = compile_routes(&[
            route("orders", "http://127.0.0.1:3000", Some("ordersCb,forward:/fallback,500:502,33,2m")),
            route("fallback", "http://127.0.0.1:3001/static", None),
        ])
        .unwrap();

        assert_eq!(specs.len(), 2);
        let binding = specs[0].breaker.as_ref().unwrap();
        assert_eq!(binding.policy.name(), "ordersCb");
        assert_eq!(binding.fallback, Destination::Forward("/fallback".into()));
        assert_eq!(binding.policy.wait_duration_open(), Some(Duration::from_secs(120)));
        assert!(specs[1].breaker.is_none());
    }

    #[test]
    fn test_collects_all_route_errors() {
        let errors = compile_routes(&[
            route("a", "forward:/elsewhere", None),
            route("b", "http://127.0.0.1:3000", Some("cb,forward:/fallback,500,150")),
            route("c", "http://127.0.0.1:3000", Some("cb,fallback")),
            route("a", "https://example.com", None),
        ])
        .unwrap_err();

        assert!(errors.contains(&ValidationError::ForwardRouteUri {
            route: "a".into(),
            uri: "forward:/elsewhere".into(),
        }));
        assert!(errors.contains(&ValidationError::Breaker {
            route: "b".into(),
            source: ConfigError::InvalidNumber { value: "150".into() },
        }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::Fallback { route, .. } if route == "c")));
        assert!(errors.contains(&ValidationError::DuplicateRoute("a".into())));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidUri { route, .. } if route == "a")));
    }

    #[test]
    fn test_structured_breaker() {
        let policy = breaker_policy(&BreakerSpec::Structured(StructuredBreaker {
            name: "usersCb".into(),
            fallback_uri: "forward:/fallback".into(),
            status_codes: vec!["404:500".into(), "BAD_GATEWAY".into()],
            failure_rate_threshold: Some(25.0),
            wait_interval_in_open_state: Some("1500".into()),
        }))
        .unwrap();

        assert_eq!(policy.matched_status_codes().len(), 3);
        assert_eq!(policy.failure_rate_threshold(), Some(25.0));
        assert_eq!(policy.wait_duration_open(), Some(Duration::from_millis(1500)));

        let missing = breaker_policy(&BreakerSpec::Structured(StructuredBreaker {
            name: " ".into(),
            fallback_uri: "forward:/fallback".into(),
            status_codes: Vec::new(),
            failure_rate_threshold: None,
            wait_interval_in_open_state: None,
        }));
        assert_eq!(missing.unwrap_err(), ConfigError::MissingField("name"));
    }

    #[test]
    fn test_rejects_bad_globals() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.timeouts.request_secs = 0;
        config.circuit_breaker.failure_rate_threshold = 0.0;
        config.circuit_breaker.max_breakers = Some(0);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroTimeout("request_secs")));
    }
}
