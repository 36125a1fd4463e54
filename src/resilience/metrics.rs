//! # Circuit Breaker Metrics
//!
//! Counters collected per breaker plus a system-wide aggregate used by status
//! reporting and the config validator.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Total number of calls whose outcome was recorded
    pub total_calls: u64,

    pub success_count: u64,

    pub failure_count: u64,

    /// Calls rejected without reaching the provider
    pub rejected_calls: u64,

    /// Number of closed/half-open → open transitions
    pub times_opened: u64,

    pub consecutive_failures: u64,

    pub current_state: CircuitState,

    /// Calculated failure rate (0.0 to 1.0)
    pub failure_rate: f64,

    /// Calculated success rate (0.0 to 1.0)
    pub success_rate: f64,
}

impl CircuitBreakerMetrics {
    /// Create new metrics instance with zero values
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_calls: 0,
            times_opened: 0,
            consecutive_failures: 0,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            success_rate: 0.0,
        }
    }

    pub(crate) fn finalize_rates(&mut self) {
        if self.total_calls == 0 {
            self.failure_rate = 0.0;
            self.success_rate = 0.0;
            return;
        }
        self.failure_rate = self.failure_count as f64 / self.total_calls as f64;
        self.success_rate = self.success_count as f64 / self.total_calls as f64;
    }

    /// Check if metrics indicate healthy operation
    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    /// Get human-readable state description
    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting all calls",
            CircuitState::HalfOpen => "Recovering - Probing provider",
        }
    }

    /// Format metrics for logging
    pub fn format_summary(&self) -> String {
        format!(
            "State: {} | Calls: {} | Success: {:.1}% | Failures: {} | Rejected: {}",
            self.state_description(),
            self.total_calls,
            self.success_rate * 100.0,
            self.failure_count,
            self.rejected_calls
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// System-wide circuit breaker metrics aggregator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    /// Metrics for individual circuit breakers by provider name
    pub circuit_breakers: BTreeMap<String, CircuitBreakerMetrics>,
}

impl SystemCircuitBreakerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_circuit_breaker(&mut self, name: String, metrics: CircuitBreakerMetrics) {
        self.circuit_breakers.insert(name, metrics);
    }

    /// Providers whose breaker is currently unhealthy
    pub fn unhealthy_circuits(&self) -> Vec<&str> {
        self.circuit_breakers
            .iter()
            .filter(|(_, metrics)| !metrics.is_healthy())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Calculate system-wide health score (0.0 to 1.0)
    pub fn health_score(&self) -> f64 {
        if self.circuit_breakers.is_empty() {
            return 1.0;
        }

        let healthy_count = self
            .circuit_breakers
            .values()
            .filter(|metrics| metrics.is_healthy())
            .count();

        healthy_count as f64 / self.circuit_breakers.len() as f64
    }

    pub fn total_calls(&self) -> u64 {
        self.circuit_breakers.values().map(|m| m.total_calls).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.circuit_breakers.values().map(|m| m.failure_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_and_health() {
        let mut metrics = CircuitBreakerMetrics::new();
        metrics.total_calls = 10;
        metrics.success_count = 9;
        metrics.failure_count = 1;
        metrics.finalize_rates();

        assert!((metrics.failure_rate - 0.1).abs() < f64::EPSILON);
        assert!(!metrics.is_healthy());

        metrics.failure_count = 0;
        metrics.success_count = 10;
        metrics.finalize_rates();
        assert!(metrics.is_healthy());
        assert!(metrics.format_summary().contains("Calls: 10"));
    }

    #[test]
    fn test_system_health_score() {
        let mut system = SystemCircuitBreakerMetrics::new();
        assert_eq!(system.health_score(), 1.0);

        system.add_circuit_breaker("anthropic".to_string(), CircuitBreakerMetrics::new());
        let open = CircuitBreakerMetrics {
            current_state: CircuitState::Open,
            ..CircuitBreakerMetrics::new()
        };
        system.add_circuit_breaker("openai".to_string(), open);

        assert_eq!(system.health_score(), 0.5);
        assert_eq!(system.unhealthy_circuits(), vec!["openai"]);
    }
}
