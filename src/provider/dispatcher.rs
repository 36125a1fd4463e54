use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::execution::{FailureKind, Task};
use crate::provider::{ProviderError, ProviderRegistry, ProviderRequest, ProviderResponse};
use crate::resilience::CircuitBreakerManager;

/// Message carried by a failure when no candidate could take the task
pub const ALL_PROVIDERS_UNAVAILABLE: &str = "all providers unavailable";

/// Provider routing derived from configuration
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    /// Configured providers in preference order
    pub providers: Vec<String>,
    pub fallback_providers: Vec<String>,
    pub role_providers: HashMap<String, Vec<String>>,
}

impl RoutingTable {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            providers: config.providers.clone(),
            fallback_providers: config.fallback_providers.clone(),
            role_providers: config.role_providers.clone(),
        }
    }

    /// Ordered, de-duplicated provider candidates for a task.
    ///
    /// The task's own provider comes first, then the role's providers. When neither
    /// names one, the configured providers stand in. Config-level fallbacks close the list.
    pub fn candidates(&self, task: &Task, role: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut push = |name: &str| {
            if !name.is_empty() && seen.insert(name.to_string()) {
                candidates.push(name.to_string());
            }
        };

        push(task.provider.as_str());
        if let Some(role_list) = self.role_providers.get(role) {
            role_list.iter().for_each(|name| push(name.as_str()));
        }
        let routed = !task.provider.is_empty()
            || self
                .role_providers
                .get(role)
                .is_some_and(|role_list| !role_list.is_empty());
        if !routed {
            self.providers.iter().for_each(|name| push(name.as_str()));
        }
        self.fallback_providers
            .iter()
            .for_each(|name| push(name.as_str()));

        candidates
    }
}

/// Why the dispatcher gave up on a task
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub kind: FailureKind,
    /// Provider that produced the failure, if a single one did
    pub provider: Option<String>,
    pub message: String,
    pub cancelled: bool,
}

impl ProviderFailure {
    fn unavailable(last_error: Option<String>) -> Self {
        let message = match last_error {
            Some(last) => format!("{ALL_PROVIDERS_UNAVAILABLE}: {last}"),
            None => ALL_PROVIDERS_UNAVAILABLE.to_string(),
        };
        Self {
            kind: FailureKind::ProvidersUnavailable,
            provider: None,
            message,
            cancelled: false,
        }
    }

    fn cancelled() -> Self {
        Self {
            kind: FailureKind::Task,
            provider: None,
            message: "cancelled".to_string(),
            cancelled: true,
        }
    }
}

/// Routes a task through its provider candidates, guarded by circuit breakers
#[derive(Debug)]
pub struct ProviderDispatcher {
    registry: Arc<ProviderRegistry>,
    breakers: Option<Arc<CircuitBreakerManager>>,
    routing: RoutingTable,
}

impl ProviderDispatcher {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        breakers: Option<Arc<CircuitBreakerManager>>,
        routing: RoutingTable,
    ) -> Self {
        Self {
            registry,
            breakers,
            routing,
        }
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn breakers(&self) -> Option<&Arc<CircuitBreakerManager>> {
        self.breakers.as_ref()
    }

    /// Try each candidate in order until one succeeds.
    ///
    /// Transient failures are recorded against the provider's breaker and fail over to
    /// the next candidate. A permanent failure ends the attempt without touching breaker
    /// counters. Running out of candidates yields [`FailureKind::ProvidersUnavailable`].
    pub async fn execute(
        &self,
        token: &CancellationToken,
        task: &Task,
        role: &str,
    ) -> Result<ProviderResponse, ProviderFailure> {
        let candidates = self.routing.candidates(task, role);
        let timeout = task.timeout_duration();
        let mut last_error: Option<String> = None;

        for (index, name) in candidates.iter().enumerate() {
            if token.is_cancelled() {
                return Err(ProviderFailure::cancelled());
            }

            let provider = match self.registry.get(name) {
                Ok(provider) => provider,
                Err(e) => {
                    debug!(provider = %name, error = %e, "Skipping candidate");
                    continue;
                }
            };

            if let Some(breakers) = &self.breakers {
                if !breakers.allow(name) {
                    debug!(provider = %name, task_id = %task.short_id(), "Circuit open, skipping provider");
                    continue;
                }
            }

            let started = Instant::now();
            let outcome = match tokio::time::timeout(
                timeout,
                provider.execute(token.clone(), build_request(task, timeout)),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::Transient(format!(
                    "timed out after {}s",
                    timeout.as_secs()
                ))),
            };

            match outcome {
                Ok(mut response) => {
                    self.record_success(name);
                    response.provider = name.clone();
                    if response.duration_ms == 0 {
                        response.duration_ms = elapsed_ms(started);
                    }
                    return Ok(response);
                }
                Err(ProviderError::Transient(message)) => {
                    self.record_failure(name);
                    warn!(provider = %name, error = %message, "Provider transient error");
                    last_error = Some(format!("provider {name}: {message}"));
                    if let Some(next) = candidates.get(index + 1) {
                        info!(from = %name, to = %next, "Failing over to next provider");
                    }
                }
                Err(ProviderError::Permanent(message)) => {
                    self.release_probe(name);
                    warn!(provider = %name, error = %message, "Provider non-transient error");
                    return Err(ProviderFailure {
                        kind: FailureKind::Task,
                        provider: Some(name.clone()),
                        message: format!("provider {name}: {message}"),
                        cancelled: false,
                    });
                }
                Err(e @ ProviderError::NotRegistered { .. }) => {
                    self.release_probe(name);
                    debug!(provider = %name, error = %e, "Skipping candidate");
                }
            }
        }

        warn!(
            task_id = %task.short_id(),
            candidates = candidates.len(),
            "All provider candidates unavailable"
        );
        Err(ProviderFailure::unavailable(last_error))
    }

    fn record_success(&self, name: &str) {
        if let Some(breakers) = &self.breakers {
            breakers.record_success(name);
        }
    }

    fn record_failure(&self, name: &str) {
        if let Some(breakers) = &self.breakers {
            breakers.record_failure(name);
        }
    }

    fn release_probe(&self, name: &str) {
        if let Some(breakers) = &self.breakers {
            breakers.release_probe(name);
        }
    }
}

fn build_request(task: &Task, timeout: Duration) -> ProviderRequest {
    ProviderRequest {
        prompt: task.prompt.clone(),
        system_prompt: task.system_prompt.clone(),
        model: task.model.clone(),
        workdir: task.workdir.clone(),
        timeout,
        budget: task.budget,
        session_id: task.session_id.clone(),
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerComponentConfig, CircuitBreakerConfig};
    use crate::provider::Provider;
    use crate::resilience::CircuitState;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct ScriptedProvider {
        name: String,
        script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedProvider {
        fn new(name: &str, script: Vec<Result<ProviderResponse, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn execute(
            &self,
            _token: CancellationToken,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            *self.calls.lock() += 1;
            self.script.lock().pop_front().unwrap_or_else(|| {
                Ok(ProviderResponse {
                    output: "ok".to_string(),
                    ..Default::default()
                })
            })
        }
    }

    fn breakers(failure_threshold: u32) -> Arc<CircuitBreakerManager> {
        let config = CircuitBreakerConfig {
            default_config: CircuitBreakerComponentConfig {
                failure_threshold,
                timeout_seconds: 60,
                success_threshold: 1,
            },
            ..Default::default()
        };
        Arc::new(CircuitBreakerManager::from_config(&config))
    }

    fn routing(providers: &[&str]) -> RoutingTable {
        RoutingTable {
            providers: providers.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_candidates_order_and_dedup() {
        let mut table = routing(&["claude", "openai"]);
        table.fallback_providers = vec!["openai".to_string(), "local".to_string()];
        table
            .role_providers
            .insert("writer".to_string(), vec!["gemini".to_string(), "openai".to_string()]);

        let task = Task::new("t", "p").with_provider("claude");
        assert_eq!(
            table.candidates(&task, "writer"),
            vec!["claude", "gemini", "openai", "local"]
        );

        let unrouted = Task::new("t", "p");
        assert_eq!(
            table.candidates(&unrouted, "reader"),
            vec!["claude", "openai", "local"]
        );
    }

    #[tokio::test]
    async fn test_transient_failure_fails_over_and_records_breaker() {
        let primary = ScriptedProvider::new(
            "claude",
            vec![Err(ProviderError::Transient("connection refused".to_string()))],
        );
        let secondary = ScriptedProvider::new("openai", vec![]);
        let mut registry = ProviderRegistry::new();
        registry.register(primary.clone());
        registry.register(secondary.clone());

        let manager = breakers(1);
        let dispatcher = ProviderDispatcher::new(
            Arc::new(registry),
            Some(manager.clone()),
            routing(&["claude", "openai"]),
        );

        let task = Task::new("t", "p");
        let response = dispatcher
            .execute(&CancellationToken::new(), &task, "")
            .await
            .unwrap();

        assert_eq!(response.provider, "openai");
        assert_eq!(manager.state("claude"), CircuitState::Open);
        assert_eq!(manager.state("openai"), CircuitState::Closed);

        let second = dispatcher
            .execute(&CancellationToken::new(), &task, "")
            .await
            .unwrap();
        assert_eq!(second.provider, "openai");
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_stops_without_breaker_penalty() {
        let primary = ScriptedProvider::new(
            "claude",
            vec![Err(ProviderError::Permanent("invalid prompt".to_string()))],
        );
        let secondary = ScriptedProvider::new("openai", vec![]);
        let mut registry = ProviderRegistry::new();
        registry.register(primary.clone());
        registry.register(secondary.clone());

        let manager = breakers(1);
        let dispatcher = ProviderDispatcher::new(
            Arc::new(registry),
            Some(manager.clone()),
            routing(&["claude", "openai"]),
        );

        let failure = dispatcher
            .execute(&CancellationToken::new(), &Task::new("t", "p"), "")
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::Task);
        assert_eq!(failure.provider.as_deref(), Some("claude"));
        assert_eq!(manager.state("claude"), CircuitState::Closed);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_candidates_are_typed_unavailable() {
        let primary = ScriptedProvider::new(
            "claude",
            vec![Err(ProviderError::Transient("HTTP 503".to_string()))],
        );
        let mut registry = ProviderRegistry::new();
        registry.register(primary);

        let dispatcher = ProviderDispatcher::new(
            Arc::new(registry),
            Some(breakers(5)),
            routing(&["claude", "unregistered"]),
        );

        let failure = dispatcher
            .execute(&CancellationToken::new(), &Task::new("t", "p"), "")
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::ProvidersUnavailable);
        assert!(failure.message.starts_with(ALL_PROVIDERS_UNAVAILABLE));
        assert!(failure.message.contains("HTTP 503"));
    }

    #[tokio::test]
    async fn test_open_breakers_skip_provider_calls() {
        let primary = ScriptedProvider::new("claude", vec![]);
        let mut registry = ProviderRegistry::new();
        registry.register(primary.clone());

        let manager = breakers(1);
        manager.record_failure("claude");
        let dispatcher =
            ProviderDispatcher::new(Arc::new(registry), Some(manager), routing(&["claude"]));

        let failure = dispatcher
            .execute(&CancellationToken::new(), &Task::new("t", "p"), "")
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::ProvidersUnavailable);
        assert_eq!(failure.message, ALL_PROVIDERS_UNAVAILABLE);
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_calling() {
        let primary = ScriptedProvider::new("claude", vec![]);
        let mut registry = ProviderRegistry::new();
        registry.register(primary.clone());
        let dispatcher = ProviderDispatcher::new(Arc::new(registry), None, routing(&["claude"]));

        let token = CancellationToken::new();
        token.cancel();
        let failure = dispatcher
            .execute(&token, &Task::new("t", "p"), "")
            .await
            .unwrap_err();

        assert!(failure.cancelled);
        assert_eq!(primary.calls(), 0);
    }
}
