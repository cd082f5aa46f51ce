//! Named breaker registry.
//!
//! # Responsibilities
//! - Hand out the single live breaker for a name, creating it on first use
//! - Hold operator customizations, including ones made before first use
//! - Enforce an optional cap on the number of distinct breakers
//!
//! # Design Decisions
//! - Constructed once at startup and injected; it outlives config reloads
//! - First writer wins: a later policy for an existing name is not reapplied
//! - Creation goes through the `DashMap` entry API, so concurrent first
//!   lookups for one name build exactly one breaker
//! - Merge order at creation: defaults ← route policy ← customizations
//! - With a cap set, pending customizations for unknown names are capped too

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use crate::observability::metrics;
use crate::resilience::circuit_breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker};
use crate::resilience::policy::{BreakerOverrides, BreakerPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("breaker registry exhausted: cap of {cap} distinct breakers reached")]
    Exhausted { cap: usize },

    #[error("too many pending customizations: cap of {cap} reached")]
    CustomizationsExhausted { cap: usize },
}

/// Process-wide store of live breakers keyed by name.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    customizations: DashMap<String, BreakerOverrides>,
    defaults: BreakerConfig,
    max_breakers: Option<usize>,
    created: AtomicUsize,
}

impl BreakerRegistry {
    pub fn new(defaults: BreakerConfig) -> Self {
        Self::with_capacity_limit(defaults, None)
    }

    /// Registry refusing to create more than `max_breakers` distinct breakers.
    pub fn with_capacity_limit(defaults: BreakerConfig, max_breakers: Option<usize>) -> Self {
        Self {
            breakers: DashMap::new(),
            customizations: DashMap::new(),
            defaults,
            max_breakers,
            created: AtomicUsize::new(0),
        }
    }

    pub fn defaults(&self) -> &BreakerConfig {
        &self.defaults
    }

    /// Return the breaker for `policy.name()`, creating it if needed.
    pub fn get_or_create(&self, policy: &BreakerPolicy) -> Result<Arc<CircuitBreaker>, RegistryError> {
        if let Some(existing) = self.breakers.get(policy.name()) {
            return Ok(Arc::clone(existing.value()));
        }

        match self.breakers.entry(policy.name().to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                self.reserve_slot()?;

                let breaker = CircuitBreaker::new(
                    policy.clone(),
                    self.defaults.with_overrides(policy.overrides()),
                );
                if self.customizations.contains_key(policy.name()) {
                    breaker.apply_customization(|| self.latest_customization(policy.name()));
                }
                let config = breaker.config();

                tracing::info!(
                    breaker = %policy.name(),
                    fallback = %policy.fallback_destination(),
                    failure_rate_threshold = config.failure_rate_threshold,
                    wait_duration_open = ?config.wait_duration_open,
                    sliding_window_size = config.sliding_window_size,
                    "Circuit breaker created"
                );

                let breaker = Arc::new(breaker);
                entry.insert(Arc::clone(&breaker));
                metrics::record_registry_size(self.created.load(Ordering::Relaxed));
                metrics::record_breaker_state(policy.name(), breaker.state().as_str());
                Ok(breaker)
            }
        }
    }

    fn reserve_slot(&self) -> Result<(), RegistryError> {
        let Some(cap) = self.max_breakers else {
            self.created.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        self.created
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < cap).then_some(n + 1))
            .map(|_| ())
            .map_err(|_| {
                tracing::error!(cap, "Circuit breaker registry exhausted");
                RegistryError::Exhausted { cap }
            })
    }

    /// Apply threshold / wait overrides to a breaker's configuration.
    ///
    /// Overrides for a name without a live breaker are kept and applied at
    /// creation. Returns `Ok(true)` when a live breaker was updated.
    pub fn customize(&self, name: &str, overrides: BreakerOverrides) -> Result<bool, RegistryError> {
        if let Some(cap) = self.max_breakers {
            let unknown = !self.breakers.contains_key(name) && !self.customizations.contains_key(name);
            if unknown && self.customizations.len() >= cap {
                tracing::warn!(breaker = %name, cap, "Pending customization rejected");
                return Err(RegistryError::CustomizationsExhausted { cap });
            }
        }

        // The customizations entry lock must be released before touching
        // `breakers`; `get_or_create` takes them in the opposite order.
        {
            let mut entry = self.customizations.entry(name.to_string()).or_default();
            *entry = entry.merge(&overrides);
        }

        match self.get(name) {
            Some(breaker) => {
                breaker.apply_customization(|| self.latest_customization(name));
                Ok(true)
            }
            None => {
                tracing::info!(breaker = %name, "Customization stored until first use");
                Ok(false)
            }
        }
    }

    fn latest_customization(&self, name: &str) -> Option<BreakerOverrides> {
        self.customizations.get(name).map(|c| *c.value())
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(b.value()))
    }

    /// Reset a live breaker to Closed. Returns `false` for unknown names.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Snapshots of every live breaker, sorted by name.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|b| Arc::clone(b.value())).collect();
        let mut snapshots: Vec<_> = breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
