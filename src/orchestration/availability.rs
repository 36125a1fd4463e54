use std::sync::Arc;
use tracing::debug;

use crate::resilience::{CircuitBreakerManager, CircuitState, SystemCircuitBreakerMetrics};

/// "Is at least one configured provider willing to accept traffic?"
///
/// Reads breaker state without consuming half-open probes. Without a breaker registry
/// the gate is always open.
#[derive(Debug, Clone)]
pub struct AvailabilityGate {
    breakers: Option<Arc<CircuitBreakerManager>>,
    providers: Vec<String>,
}

impl AvailabilityGate {
    pub fn new(breakers: Option<Arc<CircuitBreakerManager>>, providers: Vec<String>) -> Self {
        Self {
            breakers,
            providers,
        }
    }

    /// Gate for deployments without circuit breakers
    pub fn always_available() -> Self {
        Self::new(None, Vec::new())
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    /// Aggregate breaker metrics, or `None` without a breaker registry
    pub fn health(&self) -> Option<SystemCircuitBreakerMetrics> {
        self.breakers
            .as_ref()
            .map(|breakers| breakers.get_system_metrics())
    }

    pub fn is_available(&self) -> bool {
        let Some(breakers) = &self.breakers else {
            return true;
        };

        let available = self
            .providers
            .iter()
            .any(|provider| breakers.state(provider) != CircuitState::Open);

        if !available {
            debug!(providers = self.providers.len(), "No provider accepting traffic");
        }
        available
    }
}
