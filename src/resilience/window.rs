//! Bounded outcome window.
//!
//! # Responsibilities
//! - Keep the most recent call outcomes in completion order
//! - Evict the oldest record once capacity is reached
//! - Report the failure rate over the records currently held
//!
//! # Design Decisions
//! - Count-based, not time-based: capacity is a number of calls
//! - Failure and slow-call counters are maintained incrementally
//! - An empty window has no failure rate (never triggers a transition)

use std::collections::VecDeque;

use serde::Serialize;
use tokio::time::Instant;

/// Classified result of a guarded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    /// Call exceeded the slow-call threshold and was cancelled.
    Slow,
}

impl Outcome {
    /// Slow calls count against the breaker the same way failures do.
    pub fn is_failure(self) -> bool {
        !matches!(self, Outcome::Success)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Slow => "slow",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OutcomeRecord {
    outcome: Outcome,
    recorded_at: Instant,
}

/// Fixed-capacity ring of outcome records.
#[derive(Debug)]
pub struct SlidingWindow {
    records: VecDeque<OutcomeRecord>,
    capacity: usize,
    failures: usize,
    slow_calls: usize,
}

impl SlidingWindow {
    /// Create a window holding at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            failures: 0,
            slow_calls: 0,
        }
    }

    /// Append an outcome, evicting the oldest record when full.
    pub fn push(&mut self, outcome: Outcome, recorded_at: Instant) {
        if self.records.len() == self.capacity {
            if let Some(evicted) = self.records.pop_front() {
                self.forget(evicted.outcome);
            }
        }

        if outcome.is_failure() {
            self.failures += 1;
        }
        if outcome == Outcome::Slow {
            self.slow_calls += 1;
        }
        self.records.push_back(OutcomeRecord { outcome, recorded_at });
    }

    fn forget(&mut self, outcome: Outcome) {
        if outcome.is_failure() {
            self.failures -= 1;
        }
        if outcome == Outcome::Slow {
            self.slow_calls -= 1;
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of failed records, slow calls included.
    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn slow_calls(&self) -> usize {
        self.slow_calls
    }

    /// Failure percentage in `[0, 100]`, or `None` for an empty window.
    pub fn failure_rate(&self) -> Option<f32> {
        if self.records.is_empty() {
            return None;
        }
        Some(self.failures as f32 * 100.0 / self.records.len() as f32)
    }

    /// Completion time of the newest record.
    pub fn last_recorded_at(&self) -> Option<Instant> {
        self.records.back().map(|r| r.recorded_at)
    }

    /// Outcomes from oldest to newest.
    pub fn outcomes(&self) -> impl Iterator<Item = Outcome> + '_ {
        self.records.iter().map(|r| r.outcome)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.failures = 0;
        self.slow_calls = 0;
    }
}
