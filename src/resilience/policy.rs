//! Per-route breaker policy.
//!
//! A `BreakerPolicy` is the validated, immutable description of one breaker as
//! authored on a route. It is built once at route activation and shared by every
//! request on that route.

use std::collections::BTreeSet;
use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Errors raised while turning route configuration into a policy.
///
/// These only ever surface at route activation; a route carrying one is not activated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid failure rate threshold `{value}`: expected a number in (0, 100]")]
    InvalidNumber { value: String },

    #[error("invalid duration `{value}`")]
    InvalidDuration { value: String },

    #[error("too many fields: expected at most {max}, got {got}")]
    TooManyFields { max: usize, got: usize },
}

/// Threshold / wait-duration overrides applied on top of registry defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BreakerOverrides {
    failure_rate_threshold: Option<f32>,
    wait_duration_open: Option<Duration>,
}

impl BreakerOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_rate_threshold(mut self, threshold: f32) -> Result<Self, ConfigError> {
        self.failure_rate_threshold = Some(check_threshold(threshold)?);
        Ok(self)
    }

    pub fn with_wait_duration_open(mut self, wait: Duration) -> Result<Self, ConfigError> {
        self.wait_duration_open = Some(check_wait(wait)?);
        Ok(self)
    }

    pub fn failure_rate_threshold(&self) -> Option<f32> {
        self.failure_rate_threshold
    }

    pub fn wait_duration_open(&self) -> Option<Duration> {
        self.wait_duration_open
    }

    /// True when at least one field overrides the defaults.
    pub fn is_empty(&self) -> bool {
        self.failure_rate_threshold.is_none() && self.wait_duration_open.is_none()
    }

    /// Overlay `other` on `self`; fields set in `other` win.
    pub fn merge(self, other: &BreakerOverrides) -> Self {
        Self {
            failure_rate_threshold: other.failure_rate_threshold.or(self.failure_rate_threshold),
            wait_duration_open: other.wait_duration_open.or(self.wait_duration_open),
        }
    }
}

/// Immutable breaker description for one route.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerPolicy {
    name: String,
    fallback_destination: String,
    matched_status_codes: BTreeSet<String>,
    overrides: BreakerOverrides,
}

impl BreakerPolicy {
    /// Create a policy with the two mandatory fields. Blank values are rejected.
    pub fn new(
        name: impl Into<String>,
        fallback_destination: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::MissingField("name"));
        }
        let fallback_destination = fallback_destination.into().trim().to_string();
        if fallback_destination.is_empty() {
            return Err(ConfigError::MissingField("fallbackUri"));
        }

        Ok(Self {
            name,
            fallback_destination,
            matched_status_codes: BTreeSet::new(),
            overrides: BreakerOverrides::default(),
        })
    }

    pub fn with_status_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.matched_status_codes.extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn with_failure_rate_threshold(mut self, threshold: f32) -> Result<Self, ConfigError> {
        self.overrides = self.overrides.with_failure_rate_threshold(threshold)?;
        Ok(self)
    }

    pub fn with_wait_duration_open(mut self, wait: Duration) -> Result<Self, ConfigError> {
        self.overrides = self.overrides.with_wait_duration_open(wait)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fallback_destination(&self) -> &str {
        &self.fallback_destination
    }

    pub fn matched_status_codes(&self) -> &BTreeSet<String> {
        &self.matched_status_codes
    }

    pub fn failure_rate_threshold(&self) -> Option<f32> {
        self.overrides.failure_rate_threshold()
    }

    pub fn wait_duration_open(&self) -> Option<Duration> {
        self.overrides.wait_duration_open()
    }

    pub fn overrides(&self) -> &BreakerOverrides {
        &self.overrides
    }

    /// Whether a response status counts as a breaker failure.
    ///
    /// Entries match either the numeric code (`"500"`) or the upper-snake
    /// reason phrase (`"INTERNAL_SERVER_ERROR"`).
    pub fn matches_status(&self, status: StatusCode) -> bool {
        if self.matched_status_codes.is_empty() {
            return false;
        }
        if self.matched_status_codes.contains(status.as_str()) {
            return true;
        }
        status
            .canonical_reason()
            .map(reason_name)
            .is_some_and(|name| self.matched_status_codes.contains(&name))
    }
}

fn reason_name(reason: &str) -> String {
    reason
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

fn check_threshold(threshold: f32) -> Result<f32, ConfigError> {
    if threshold.is_finite() && threshold > 0.0 && threshold <= 100.0 {
        Ok(threshold)
    } else {
        Err(ConfigError::InvalidNumber {
            value: threshold.to_string(),
        })
    }
}

fn check_wait(wait: Duration) -> Result<Duration, ConfigError> {
    if wait.is_zero() {
        return Err(ConfigError::InvalidDuration {
            value: format!("{wait:?}"),
        });
    }
    Ok(wait)
}
