//! # Circuit Breaker Manager
//!
//! Registry of per-provider breakers. Breakers are created lazily on first lookup with
//! the provider's configured thresholds and live for the lifetime of the manager.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::CircuitBreakerConfig;
use crate::resilience::{
    BreakerSettings, BreakerStatus, CircuitBreaker, CircuitBreakerMetrics, CircuitState,
    SystemCircuitBreakerMetrics,
};

/// Manager for the circuit breakers of every known provider
#[derive(Debug)]
pub struct CircuitBreakerManager {
    circuit_breakers: DashMap<String, Arc<CircuitBreaker>>,

    config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        info!(
            max_circuit_breakers = config.global_settings.max_circuit_breakers,
            overrides = config.component_configs.len(),
            "Initializing circuit breaker manager"
        );

        Self {
            circuit_breakers: DashMap::new(),
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get or create the breaker for a provider
    pub fn get_circuit_breaker(&self, component_name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.circuit_breakers.get(component_name) {
            return Arc::clone(breaker.value());
        }

        let current_count = self.circuit_breakers.len();
        if current_count >= self.config.global_settings.max_circuit_breakers as usize {
            warn!(
                component = component_name,
                current_count,
                max_allowed = self.config.global_settings.max_circuit_breakers,
                "Maximum circuit breaker count reached"
            );
        }

        // entry() holds the shard lock, so concurrent callers agree on one instance
        let breaker = self
            .circuit_breakers
            .entry(component_name.to_string())
            .or_insert_with(|| {
                let settings =
                    BreakerSettings::from(&self.config.config_for_component(component_name));
                info!(component = component_name, "Created new circuit breaker");
                Arc::new(CircuitBreaker::new(component_name, settings))
            });

        Arc::clone(breaker.value())
    }

    /// Breaker for a provider only if it was already created
    pub fn get(&self, component_name: &str) -> Option<Arc<CircuitBreaker>> {
        self.circuit_breakers
            .get(component_name)
            .map(|breaker| Arc::clone(breaker.value()))
    }

    pub fn allow(&self, component_name: &str) -> bool {
        self.get_circuit_breaker(component_name).allow()
    }

    pub fn record_success(&self, component_name: &str) {
        self.get_circuit_breaker(component_name).record_success();
    }

    pub fn record_failure(&self, component_name: &str) {
        self.get_circuit_breaker(component_name).record_failure();
    }

    pub fn release_probe(&self, component_name: &str) {
        if let Some(breaker) = self.get(component_name) {
            breaker.release_probe();
        }
    }

    pub fn state(&self, component_name: &str) -> CircuitState {
        self.get_circuit_breaker(component_name).state()
    }

    /// Snapshot of every breaker, ordered by provider name
    pub fn status(&self) -> BTreeMap<String, BreakerStatus> {
        self.circuit_breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status()))
            .collect()
    }

    /// Close one provider's breaker. Returns false if it was never created.
    pub fn reset(&self, component_name: &str) -> bool {
        match self.get(component_name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Get all circuit breaker names
    pub fn list_components(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .circuit_breakers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn get_component_metrics(&self, component_name: &str) -> Option<CircuitBreakerMetrics> {
        self.get(component_name).map(|breaker| breaker.metrics())
    }

    pub fn get_system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();
        for entry in self.circuit_breakers.iter() {
            system_metrics.add_circuit_breaker(entry.key().clone(), entry.value().metrics());
        }
        system_metrics
    }

    /// Force open all circuit breakers (emergency stop)
    pub fn force_open_all(&self) {
        warn!("Forcing all circuit breakers open");
        for entry in self.circuit_breakers.iter() {
            entry.value().force_open();
        }
    }

    /// Force close all circuit breakers (emergency recovery)
    pub fn force_close_all(&self) {
        warn!("Forcing all circuit breakers closed");
        for entry in self.circuit_breakers.iter() {
            entry.value().reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerComponentConfig;

    fn manager() -> CircuitBreakerManager {
        let mut config = CircuitBreakerConfig::default();
        config.component_configs.insert(
            "flaky".to_string(),
            CircuitBreakerComponentConfig {
                failure_threshold: 1,
                timeout_seconds: 60,
                success_threshold: 1,
            },
        );
        CircuitBreakerManager::from_config(&config)
    }

    #[test]
    fn test_lazy_creation_returns_same_instance() {
        let manager = manager();
        assert!(manager.get("anthropic").is_none());

        let first = manager.get_circuit_breaker("anthropic");
        let second = manager.get_circuit_breaker("anthropic");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.list_components(), vec!["anthropic"]);
    }

    #[test]
    fn test_component_overrides_are_applied() {
        let manager = manager();

        manager.record_failure("flaky");
        assert_eq!(manager.state("flaky"), CircuitState::Open);

        manager.record_failure("anthropic");
        assert_eq!(manager.state("anthropic"), CircuitState::Closed);
    }

    #[test]
    fn test_status_and_bulk_operations() {
        let manager = manager();
        manager.get_circuit_breaker("anthropic");
        manager.get_circuit_breaker("openai");

        manager.force_open_all();
        let status = manager.status();
        assert_eq!(status.len(), 2);
        assert!(status.values().all(|s| s.state == CircuitState::Open));
        assert!(!manager.allow("openai"));

        manager.force_close_all();
        assert!(manager.allow("openai"));
        assert_eq!(manager.get_system_metrics().circuit_breakers.len(), 2);
    }

    #[test]
    fn test_reset_unknown_provider() {
        let manager = manager();
        assert!(!manager.reset("missing"));

        manager.record_failure("flaky");
        assert!(manager.reset("flaky"));
        assert_eq!(manager.state("flaky"), CircuitState::Closed);
    }
}
