//! Circuit breaker state machine.
//!
//! # States
//! - Closed: normal operation, every completed call lands in the sliding window
//! - Open: downstream assumed broken, calls are rejected without being attempted
//! - Half-Open: a fixed quota of trial calls probes for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: window holds >= minimum calls and failure rate > threshold
//! Open → Half-Open: first permission check after wait_duration_open elapsed
//! Half-Open → Open: any trial call fails
//! Half-Open → Closed: every trial call succeeds
//! ```
//!
//! # Design Decisions
//! - One mutex per breaker; it covers bookkeeping only, never the guarded call
//! - Configuration lives in an `ArcSwap` so customization never touches runtime state
//! - Live config is always `base ← latest customization`, recomputed under the
//!   breaker lock, so concurrent customizations converge on the newest one
//! - Every transition bumps an epoch; outcomes are only accepted for the epoch
//!   that admitted the call
//! - A rate exactly at the threshold does not trip

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::BreakerDefaults;
use crate::observability::metrics;
use crate::resilience::policy::{BreakerOverrides, BreakerPolicy};
use crate::resilience::window::{Outcome, SlidingWindow};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Effective tunables of one live breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Failure percentage in (0, 100].
    pub failure_rate_threshold: f32,
    pub wait_duration_open: Duration,
    pub sliding_window_size: usize,
    pub minimum_number_of_calls: usize,
    pub permitted_calls_in_half_open: usize,
}

impl BreakerConfig {
    /// Copy of `self` with the set override fields applied.
    pub fn with_overrides(&self, overrides: &BreakerOverrides) -> Self {
        Self {
            failure_rate_threshold: overrides
                .failure_rate_threshold()
                .unwrap_or(self.failure_rate_threshold),
            wait_duration_open: overrides
                .wait_duration_open()
                .unwrap_or(self.wait_duration_open),
            ..self.clone()
        }
    }

    /// Number of calls the closed window needs before the rate is evaluated.
    fn minimum_calls(&self) -> usize {
        self.minimum_number_of_calls
            .min(self.sliding_window_size)
            .max(1)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::from(&BreakerDefaults::default())
    }
}

impl From<&BreakerDefaults> for BreakerConfig {
    fn from(defaults: &BreakerDefaults) -> Self {
        Self {
            failure_rate_threshold: defaults.failure_rate_threshold,
            wait_duration_open: Duration::from_secs(defaults.wait_duration_open_secs),
            sliding_window_size: defaults.sliding_window_size,
            minimum_number_of_calls: defaults.minimum_number_of_calls,
            permitted_calls_in_half_open: defaults.permitted_calls_in_half_open,
        }
    }
}

/// Point-in-time view of a breaker, for the admin API and logs.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub fallback_destination: String,
    pub failure_rate: Option<f32>,
    pub buffered_calls: usize,
    pub failed_calls: usize,
    pub slow_calls: usize,
    pub not_permitted_calls: u64,
    pub half_open_permits: usize,
    /// Time since the newest outcome in the window.
    pub last_outcome_ms_ago: Option<u64>,
    pub failure_rate_threshold: f32,
    pub wait_duration_open_ms: u64,
}

#[derive(Debug)]
struct Runtime {
    state: BreakerState,
    window: SlidingWindow,
    opened_at: Option<Instant>,
    half_open_permits: usize,
    epoch: u64,
    not_permitted: u64,
}

/// A named breaker shared by every request that resolves to it.
#[derive(Debug)]
pub struct CircuitBreaker {
    policy: BreakerPolicy,
    /// Defaults merged with the route policy; customizations layer on top.
    base: BreakerConfig,
    config: ArcSwap<BreakerConfig>,
    runtime: Mutex<Runtime>,
}

impl CircuitBreaker {
    pub fn new(policy: BreakerPolicy, base: BreakerConfig) -> Self {
        let window = SlidingWindow::new(base.sliding_window_size);
        Self {
            policy,
            config: ArcSwap::from_pointee(base.clone()),
            base,
            runtime: Mutex::new(Runtime {
                state: BreakerState::Closed,
                window,
                opened_at: None,
                half_open_permits: 0,
                epoch: 0,
                not_permitted: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.policy.name()
    }

    /// The policy this breaker was created from (first writer wins).
    pub fn policy(&self) -> &BreakerPolicy {
        &self.policy
    }

    pub fn config(&self) -> Arc<BreakerConfig> {
        self.config.load_full()
    }

    /// Current state. Does not promote an expired Open breaker.
    pub fn state(&self) -> BreakerState {
        self.runtime().state
    }

    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask for permission to run one guarded call.
    pub fn try_acquire(self: &Arc<Self>) -> Option<CallPermit> {
        self.try_acquire_at(Instant::now())
    }

    pub(crate) fn try_acquire_at(self: &Arc<Self>, now: Instant) -> Option<CallPermit> {
        let config = self.config.load();
        let mut rt = self.runtime();

        if rt.state == BreakerState::Open {
            let waiting = rt
                .opened_at
                .is_some_and(|opened| now.saturating_duration_since(opened) < config.wait_duration_open);
            if waiting {
                rt.not_permitted += 1;
                return None;
            }
            self.transition(&mut rt, &config, BreakerState::HalfOpen, "wait_elapsed", now);
        }

        match rt.state {
            BreakerState::Closed => {}
            BreakerState::HalfOpen if rt.half_open_permits > 0 => {
                rt.half_open_permits -= 1;
            }
            _ => {
                rt.not_permitted += 1;
                return None;
            }
        }

        Some(CallPermit {
            breaker: Arc::clone(self),
            epoch: rt.epoch,
            completed: false,
        })
    }

    fn record(&self, epoch: u64, outcome: Outcome, now: Instant) {
        let config = self.config.load();
        let mut rt = self.runtime();

        if epoch != rt.epoch {
            tracing::debug!(
                breaker = %self.name(),
                outcome = outcome.as_str(),
                state = rt.state.as_str(),
                "Discarding outcome admitted under a previous state"
            );
            return;
        }

        metrics::record_breaker_call(self.name(), outcome.as_str());

        match rt.state {
            BreakerState::Closed => {
                rt.window.push(outcome, now);
                if rt.window.len() < config.minimum_calls() {
                    return;
                }
                if let Some(rate) = rt.window.failure_rate() {
                    if rate > config.failure_rate_threshold {
                        tracing::warn!(
                            breaker = %self.name(),
                            failure_rate = rate,
                            threshold = config.failure_rate_threshold,
                            "Failure rate exceeded threshold"
                        );
                        self.transition(&mut rt, &config, BreakerState::Open, "failure_rate_exceeded", now);
                    }
                }
            }
            BreakerState::HalfOpen => {
                rt.window.push(outcome, now);
                if outcome.is_failure() {
                    self.transition(&mut rt, &config, BreakerState::Open, "trial_call_failed", now);
                } else if rt.window.len() >= config.permitted_calls_in_half_open.max(1) {
                    // Any failed trial reopens at once, so a full trial window is all successes.
                    self.transition(&mut rt, &config, BreakerState::Closed, "trial_calls_succeeded", now);
                }
            }
            // Epoch moves on every transition, so nothing admitted reaches here.
            BreakerState::Open => {}
        }
    }

    fn transition(
        &self,
        rt: &mut Runtime,
        config: &BreakerConfig,
        to: BreakerState,
        reason: &'static str,
        now: Instant,
    ) {
        let from = rt.state;
        rt.state = to;
        rt.epoch += 1;

        match to {
            BreakerState::Open => {
                rt.opened_at = Some(now);
                rt.half_open_permits = 0;
                rt.window.clear();
            }
            BreakerState::HalfOpen => {
                rt.opened_at = None;
                rt.half_open_permits = config.permitted_calls_in_half_open.max(1);
                rt.window = SlidingWindow::new(rt.half_open_permits);
            }
            BreakerState::Closed => {
                rt.opened_at = None;
                rt.half_open_permits = 0;
                rt.window = SlidingWindow::new(config.sliding_window_size);
            }
        }

        tracing::info!(
            event = "breaker_transition",
            breaker = %self.name(),
            from = from.as_str(),
            to = to.as_str(),
            reason,
            "Circuit breaker changed state"
        );
        metrics::record_breaker_transition(self.name(), from.as_str(), to.as_str());
    }

    /// Rebuild the live config from the base and the newest customization.
    ///
    /// `latest` is read while the breaker lock is held, so whichever caller
    /// applies last stores the newest stored overrides. Window and state are
    /// left untouched.
    pub fn apply_customization<F>(&self, latest: F)
    where
        F: FnOnce() -> Option<BreakerOverrides>,
    {
        let _rt = self.runtime();
        let overrides = latest().unwrap_or_default();
        let config = Arc::new(self.base.with_overrides(&overrides));
        self.config.store(Arc::clone(&config));

        tracing::info!(
            breaker = %self.name(),
            failure_rate_threshold = config.failure_rate_threshold,
            wait_duration_open = ?config.wait_duration_open,
            "Circuit breaker customized"
        );
    }

    /// Operator reset: back to Closed with an empty window.
    pub fn reset(&self) {
        let config = self.config.load();
        let mut rt = self.runtime();
        rt.not_permitted = 0;
        if rt.state == BreakerState::Closed {
            // Calls in flight belong to the cleared window.
            rt.epoch += 1;
            rt.window.clear();
            tracing::info!(breaker = %self.name(), "Circuit breaker window cleared");
            return;
        }
        self.transition(&mut rt, &config, BreakerState::Closed, "manual_reset", Instant::now());
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let config = self.config.load();
        let rt = self.runtime();
        let now = Instant::now();
        BreakerSnapshot {
            name: self.name().to_string(),
            state: rt.state,
            fallback_destination: self.policy.fallback_destination().to_string(),
            failure_rate: rt.window.failure_rate(),
            buffered_calls: rt.window.len(),
            failed_calls: rt.window.failures(),
            slow_calls: rt.window.slow_calls(),
            not_permitted_calls: rt.not_permitted,
            half_open_permits: rt.half_open_permits,
            last_outcome_ms_ago: rt
                .window
                .last_recorded_at()
                .map(|at| now.saturating_duration_since(at).as_millis() as u64),
            failure_rate_threshold: config.failure_rate_threshold,
            wait_duration_open_ms: config.wait_duration_open.as_millis() as u64,
        }
    }
}

/// Permission to run one guarded call.
///
/// Consumed by [`CallPermit::record`]. A permit dropped without an outcome
/// (cancelled request, outer timeout) is recorded as a failure.
#[derive(Debug)]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    epoch: u64,
    completed: bool,
}

impl CallPermit {
    pub fn record(self, outcome: Outcome) {
        self.record_at(outcome, Instant::now());
    }

    pub(crate) fn record_at(mut self, outcome: Outcome, now: Instant) {
        self.completed = true;
        self.breaker.record(self.epoch, outcome, now);
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.completed {
            tracing::debug!(breaker = %self.breaker.name(), "Call cancelled before completion");
            self.breaker.record(self.epoch, Outcome::Failure, Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: f32, window: usize, minimum: usize, trials: usize) -> BreakerConfig {
        BreakerConfig {
            failure_rate_threshold: threshold,
            wait_duration_open: Duration::from_secs(10),
            sliding_window_size: window,
            minimum_number_of_calls: minimum,
            permitted_calls_in_half_open: trials,
        }
    }

    fn breaker(config: BreakerConfig) -> Arc<CircuitBreaker> {
        let policy = BreakerPolicy::new("test", "forward:/fallback").unwrap();
        Arc::new(CircuitBreaker::new(policy, config))
    }

    fn feed(breaker: &Arc<CircuitBreaker>, outcomes: &[Outcome], now: Instant) {
        for outcome in outcomes {
            let permit = breaker.try_acquire_at(now).expect("permit");
            permit.record_at(*outcome, now);
        }
    }

    fn trip(breaker: &Arc<CircuitBreaker>, now: Instant) {
        let minimum = breaker.config().minimum_calls();
        feed(breaker, &vec![Outcome::Failure; minimum], now);
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_stays_closed_until_minimum_calls() {
        let cb = breaker(config(50.0, 10, 4, 2));
        let now = Instant::now();
        feed(&cb, &[Outcome::Failure, Outcome::Failure, Outcome::Failure], now);
        assert_eq!(cb.state(), BreakerState::Closed);

        feed(&cb, &[Outcome::Failure], now);
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn test_rate_at_threshold_stays_closed() {
        let cb = breaker(config(50.0, 4, 4, 2));
        let now = Instant::now();
        feed(&cb, &[Outcome::Failure, Outcome::Success, Outcome::Failure, Outcome::Success], now);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_rate_above_threshold_trips() {
        let cb = breaker(config(50.0, 4, 4, 2));
        let now = Instant::now();
        feed(&cb, &[Outcome::Failure, Outcome::Success, Outcome::Failure, Outcome::Slow], now);
        assert_eq!(cb.state(), BreakerState::Open);
        assert_eq!(cb.snapshot().buffered_calls, 0);
    }

    #[test]
    fn test_open_denies_until_wait_elapsed() {
        let cb = breaker(config(50.0, 2, 2, 2));
        let start = Instant::now();
        trip(&cb, start);

        assert!(cb.try_acquire_at(start).is_none());
        assert!(cb.try_acquire_at(start + Duration::from_millis(9_999)).is_none());
        assert_eq!(cb.snapshot().not_permitted_calls, 2);

        let permit = cb.try_acquire_at(start + Duration::from_secs(10));
        assert!(permit.is_some());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_half_open_permits_are_bounded() {
        let cb = breaker(config(50.0, 2, 2, 3));
        let start = Instant::now();
        trip(&cb, start);

        let later = start + Duration::from_secs(11);
        let permits: Vec<_> = (0..3).map(|_| cb.try_acquire_at(later)).collect();
        assert!(permits.iter().all(Option::is_some));
        assert!(cb.try_acquire_at(later).is_none());
        assert_eq!(cb.snapshot().half_open_permits, 0);

        for permit in permits.into_iter().flatten() {
            permit.record_at(Outcome::Success, later);
        }
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_trial_failure_reopens() {
        let cb = breaker(config(50.0, 2, 2, 3));
        let start = Instant::now();
        trip(&cb, start);

        let later = start + Duration::from_secs(10);
        let first = cb.try_acquire_at(later).unwrap();
        let second = cb.try_acquire_at(later).unwrap();
        first.record_at(Outcome::Failure, later);
        assert_eq!(cb.state(), BreakerState::Open);

        // Outcome of the other trial belongs to the previous half-open period.
        second.record_at(Outcome::Success, later);
        assert_eq!(cb.state(), BreakerState::Open);

        // opened_at was reset by the failed trial.
        assert!(cb.try_acquire_at(later + Duration::from_secs(9)).is_none());
        assert!(cb.try_acquire_at(later + Duration::from_secs(10)).is_some());
    }

    #[test]
    fn test_dropped_permit_counts_as_failure() {
        let cb = breaker(config(50.0, 2, 2, 1));
        let start = Instant::now();
        trip(&cb, start);

        let permit = cb.try_acquire_at(start + Duration::from_secs(10)).unwrap();
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        drop(permit);
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn test_customize_keeps_runtime_state() {
        let cb = breaker(config(50.0, 10, 10, 2));
        let now = Instant::now();
        feed(&cb, &[Outcome::Failure, Outcome::Success, Outcome::Failure], now);

        let overrides = BreakerOverrides::new()
            .with_failure_rate_threshold(10.0)
            .unwrap()
            .with_wait_duration_open(Duration::from_secs(120))
            .unwrap();
        cb.apply_customization(|| Some(overrides));

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, BreakerState::Closed);
        assert_eq!(snapshot.buffered_calls, 3);
        assert_eq!(snapshot.failed_calls, 2);
        assert_eq!(snapshot.failure_rate_threshold, 10.0);
        assert_eq!(snapshot.wait_duration_open_ms, 120_000);
        assert_eq!(cb.config().sliding_window_size, 10);
    }

    #[test]
    fn test_reset_closes_breaker() {
        let cb = breaker(config(50.0, 2, 2, 2));
        let now = Instant::now();
        trip(&cb, now);

        cb.reset();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.try_acquire_at(now).is_some());
    }

    #[test]
    fn test_reset_closed_breaker_clears_window() {
        let cb = breaker(config(50.0, 10, 10, 2));
        let now = Instant::now();
        feed(&cb, &[Outcome::Failure, Outcome::Success], now);
        let in_flight = cb.try_acquire_at(now).unwrap();

        cb.reset();
        in_flight.record_at(Outcome::Failure, now);

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, BreakerState::Closed);
        assert_eq!(snapshot.buffered_calls, 0);
        assert_eq!(snapshot.last_outcome_ms_ago, None);
    }

    #[test]
    fn test_snapshot_reports_last_outcome_age() {
        let cb = breaker(config(50.0, 10, 10, 2));
        assert_eq!(cb.snapshot().last_outcome_ms_ago, None);

        let earlier = Instant::now() - Duration::from_secs(3);
        feed(&cb, &[Outcome::Success], earlier);
        assert!(cb.snapshot().last_outcome_ms_ago.is_some_and(|ms| ms >= 3_000));
    }

    #[test]
    fn test_concurrent_outcomes_are_all_counted() {
        const CALLS: usize = 32;
        let cb = breaker(config(100.0, 64, 64, 2));
        let barrier = Arc::new(std::sync::Barrier::new(CALLS));

        let handles: Vec<_> = (0..CALLS)
            .map(|i| {
                let cb = Arc::clone(&cb);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let permit = cb.try_acquire().expect("closed breaker admits");
                    let outcome = match i % 4 {
                        0 => Outcome::Failure,
                        1 => Outcome::Slow,
                        _ => Outcome::Success,
                    };
                    permit.record(outcome);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, BreakerState::Closed);
        assert_eq!(snapshot.buffered_calls, CALLS);
        assert_eq!(snapshot.failed_calls, CALLS / 2);
        assert_eq!(snapshot.slow_calls, CALLS / 4);
    }
}
