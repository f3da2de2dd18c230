//! One breaker per provider.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use super::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};

/// Process-wide set of circuit breakers, keyed by provider name.
///
/// Providers may be registered up front with their own settings; any
/// provider seen for the first time gets a breaker with the registry's
/// default configuration.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
        }
    }

    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    /// Register a provider with explicit settings, replacing any existing
    /// breaker (and its state).
    pub fn register(
        &self,
        provider: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        let provider = provider.into();
        let breaker = Arc::new(CircuitBreaker::new(provider.clone(), config));
        self.breakers.insert(provider.clone(), Arc::clone(&breaker));
        info!(provider, "registered circuit breaker");
        breaker
    }

    pub fn get(&self, provider: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(provider).map(|b| Arc::clone(b.value()))
    }

    /// Breaker for `provider`, created with the default settings if absent.
    pub fn get_or_register(&self, provider: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(provider) {
            return existing;
        }
        let entry = self.breakers.entry(provider.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(provider, self.default_config.clone()))
        });
        Arc::clone(entry.value())
    }

    /// Current state of a provider's breaker, if one exists.
    pub fn state(&self, provider: &str) -> Option<CircuitState> {
        self.get(provider).map(|b| b.state())
    }

    /// Snapshots of every breaker, sorted by provider name.
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|e| Arc::clone(e.value())).collect();
        let mut snapshots: Vec<_> = breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.provider.cmp(&b.provider));
        snapshots
    }

    /// Reset a provider's breaker to closed. Returns whether it existed.
    pub fn reset(&self, provider: &str) -> bool {
        match self.get(provider) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
