//! Per-request circuit breaker filter.
//!
//! # Responsibilities
//! - Resolve the route's breaker from the registry
//! - Ask for a permit; route straight to the fallback when denied
//! - Run the guarded call under the slow-call deadline and classify the result
//! - Route failures to the fallback destination
//!
//! # Design Decisions
//! - Breaker locks are never held across the upstream or fallback call
//! - Rejections are counted in metrics but never enter the sliding window
//! - Downstream failures never reach the caller as errors; they resolve to the
//!   fallback response, or a gateway 503 if the fallback itself fails
//! - The fallback reason is attached to the response as an extension

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Request, Response, StatusCode};
use thiserror::Error;

use crate::dispatch::{clone_request, Destination, DestinationError, DispatchError, Dispatcher};
use crate::http::response::gateway_error;
use crate::observability::metrics;
use crate::resilience::policy::BreakerPolicy;
use crate::resilience::registry::{BreakerRegistry, RegistryError};
use crate::resilience::timeouts::with_deadline;
use crate::resilience::window::Outcome;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Why a request was served by the fallback destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// Breaker open, or half-open without trial permits.
    Rejected,
    /// Connection or protocol failure talking to the downstream.
    Transport,
    /// Downstream exceeded the slow-call threshold.
    Timeout,
    /// Downstream answered with a matched status code.
    Status(StatusCode),
}

impl FallbackReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackReason::Rejected => "rejected",
            FallbackReason::Transport => "transport",
            FallbackReason::Timeout => "timeout",
            FallbackReason::Status(_) => "status_code",
        }
    }

    fn outcome(self) -> Outcome {
        match self {
            FallbackReason::Timeout => Outcome::Slow,
            _ => Outcome::Failure,
        }
    }
}

/// A route's breaker policy with its fallback destination resolved.
#[derive(Debug, Clone)]
pub struct BreakerBinding {
    pub policy: Arc<BreakerPolicy>,
    pub fallback: Destination,
}

impl BreakerBinding {
    pub fn new(policy: BreakerPolicy) -> Result<Self, DestinationError> {
        let fallback = policy.fallback_destination().parse()?;
        Ok(Self {
            policy: Arc::new(policy),
            fallback,
        })
    }
}

/// Shared pieces every route filter is built from.
#[derive(Clone)]
pub struct FilterContext {
    pub registry: Arc<BreakerRegistry>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub slow_call_threshold: Duration,
}

impl FilterContext {
    pub fn build(&self, binding: BreakerBinding) -> CircuitBreakerFilter {
        CircuitBreakerFilter {
            policy: binding.policy,
            fallback: binding.fallback,
            registry: Arc::clone(&self.registry),
            dispatcher: Arc::clone(&self.dispatcher),
            slow_call_threshold: self.slow_call_threshold,
        }
    }
}

/// Breaker guard for one route.
pub struct CircuitBreakerFilter {
    policy: Arc<BreakerPolicy>,
    fallback: Destination,
    registry: Arc<BreakerRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
    slow_call_threshold: Duration,
}

impl fmt::Debug for CircuitBreakerFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerFilter")
            .field("breaker", &self.policy.name())
            .field("fallback", &self.fallback)
            .field("slow_call_threshold", &self.slow_call_threshold)
            .finish()
    }
}

impl CircuitBreakerFilter {
    pub fn policy(&self) -> &BreakerPolicy {
        &self.policy
    }

    pub fn fallback(&self) -> &Destination {
        &self.fallback
    }

    /// Run `request` against `downstream` under the route's breaker.
    pub async fn handle(
        &self,
        request: Request<Bytes>,
        downstream: &Destination,
    ) -> Result<Response<Body>, FilterError> {
        let breaker = self.registry.get_or_create(&self.policy)?;
        let name = self.policy.name();

        let Some(permit) = breaker.try_acquire() else {
            tracing::debug!(breaker = %name, state = breaker.state().as_str(), "Call not permitted");
            metrics::record_breaker_call(name, "rejected");
            return Ok(self.serve_fallback(request, FallbackReason::Rejected).await);
        };

        let fallback_request = clone_request(&request);
        let result = with_deadline(
            self.slow_call_threshold,
            self.dispatcher.dispatch(request, downstream),
        )
        .await;

        let reason = match result {
            Ok(response) => {
                let status = response.status();
                if !self.policy.matches_status(status) {
                    permit.record(Outcome::Success);
                    return Ok(response);
                }
                tracing::debug!(breaker = %name, status = %status, "Matched failure status code");
                FallbackReason::Status(status)
            }
            Err(DispatchError::Timeout(limit)) => {
                tracing::warn!(breaker = %name, limit = ?limit, "Downstream call timed out");
                FallbackReason::Timeout
            }
            Err(e) => {
                tracing::warn!(breaker = %name, error = %e, "Downstream call failed");
                FallbackReason::Transport
            }
        };

        permit.record(reason.outcome());
        Ok(self.serve_fallback(fallback_request, reason).await)
    }

    async fn serve_fallback(&self, request: Request<Bytes>, reason: FallbackReason) -> Response<Body> {
        let name = self.policy.name();
        metrics::record_fallback(name, reason.as_str());

        let mut response = match self.dispatcher.dispatch(request, &self.fallback).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    breaker = %name,
                    fallback = %self.fallback,
                    error = %e,
                    "Fallback dispatch failed"
                );
                gateway_error(StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
            }
        };
        response.extensions_mut().insert(reason);
        response
    }
}
