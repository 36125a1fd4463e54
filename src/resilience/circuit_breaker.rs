//! # Circuit Breaker Implementation
//!
//! Per-provider health gate with three states: Closed (traffic flows), Open (calls are
//! rejected without contacting the upstream) and Half-Open (a single probe is let
//! through to test recovery).
//!
//! All state lives behind one mutex per breaker, so counters and transitions are
//! mutually exclusive for a provider while different providers never contend.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::CircuitBreakerComponentConfig;
use crate::logging::log_breaker_transition;
use crate::resilience::CircuitBreakerMetrics;

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - one probe call at a time
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Errors returned by [`CircuitBreaker::call`]
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

/// Thresholds a breaker runs with, resolved from [`CircuitBreakerComponentConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Consecutive failures that open a closed breaker
    pub failure_threshold: u32,
    /// Cool-down spent open before a half-open probe is admitted
    pub timeout: Duration,
    /// Consecutive probe successes that close a half-open breaker
    pub success_threshold: u32,
}

impl From<&CircuitBreakerComponentConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerComponentConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            timeout: Duration::from_secs(config.timeout_seconds),
            success_threshold: config.success_threshold.max(1),
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&CircuitBreakerComponentConfig::default())
    }
}

/// Point-in-time view of a breaker for status reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub probe_in_flight: bool,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u64,
    consecutive_failures: u32,
    half_open_successes: u32,
    probe_in_flight: bool,
    opened_at: Option<Instant>,
    last_failure: Option<DateTime<Utc>>,
    metrics: CircuitBreakerMetrics,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            consecutive_failures: 0,
            half_open_successes: 0,
            probe_in_flight: false,
            opened_at: None,
            last_failure: None,
            metrics: CircuitBreakerMetrics::new(),
        }
    }
}

/// Circuit breaker for a single provider
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Provider name for logging and metrics
    name: String,

    config: BreakerSettings,

    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: BreakerSettings) -> Self {
        let name = name.into();
        debug!(
            component = %name,
            failure_threshold = config.failure_threshold,
            timeout_ms = config.timeout.as_millis() as u64,
            success_threshold = config.success_threshold,
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerSettings {
        &self.config
    }

    /// Current state. An open breaker whose cool-down has elapsed reports half-open;
    /// the probe itself is only consumed by [`allow`](Self::allow).
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Whether a call may proceed. Closed always allows; half-open allows exactly one
    /// outstanding probe; open rejects until the cool-down elapses.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                debug!(component = %self.name, "Half-open probe admitted");
                true
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                inner.metrics.rejected_calls += 1;
                false
            }
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.success_count += 1;

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open => {
                // a call admitted before the breaker opened finished late
                debug!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.failure_count += 1;
        inner.failure_count += 1;
        inner.last_failure = Some(Utc::now());

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                // the probe failed: restart the cool-down
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Give back an admitted half-open probe whose call never reached a health verdict
    /// (the upstream rejected the request itself). State and counters are untouched.
    pub fn release_probe(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    /// Execute an operation under breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.allow() {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let result = operation().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Return to closed state and clear all counters
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        warn!(component = %self.name, "Circuit breaker reset");
        self.transition(&mut inner, CircuitState::Closed);
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        warn!(component = %self.name, "Circuit breaker forced open");
        self.transition(&mut inner, CircuitState::Open);
    }

    pub fn status(&self) -> BreakerStatus {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        BreakerStatus {
            state: inner.state,
            failure_count: inner.failure_count,
            consecutive_failures: inner.consecutive_failures,
            last_failure: inner.last_failure,
            probe_in_flight: inner.probe_in_flight,
        }
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        let mut snapshot = inner.metrics.clone();
        snapshot.current_state = inner.state;
        snapshot.consecutive_failures = u64::from(inner.consecutive_failures);
        snapshot.finalize_rates();
        snapshot
    }

    /// Open → half-open once the cool-down has elapsed
    fn refresh(&self, inner: &mut BreakerState) {
        if inner.state != CircuitState::Open {
            return;
        }
        let elapsed = inner
            .opened_at
            .map(|opened| opened.elapsed() >= self.config.timeout)
            .unwrap_or(true);
        if elapsed {
            self.transition(inner, CircuitState::HalfOpen);
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.probe_in_flight = false;
        inner.half_open_successes = 0;

        match to {
            CircuitState::Closed => {
                inner.failure_count = 0;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
            }
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
                inner.metrics.times_opened += 1;
            }
            CircuitState::HalfOpen => {}
        }

        if from != to {
            log_breaker_transition(&self.name, from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn config(failure_threshold: u32, timeout_ms: u64) -> BreakerSettings {
        BreakerSettings {
            failure_threshold,
            timeout: Duration::from_millis(timeout_ms),
            success_threshold: 1,
        }
    }

    #[test]
    fn test_initial_state_is_closed() {
        let breaker = CircuitBreaker::new("anthropic", config(3, 100));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow());
        assert!(breaker.allow());
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new("anthropic", config(3, 10_000));

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let breaker = CircuitBreaker::new("anthropic", config(3, 10_000));

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.status().consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_single_probe_after_cool_down() {
        let breaker = CircuitBreaker::new("anthropic", config(1, 50));

        breaker.record_failure();
        assert!(!breaker.allow());

        sleep(Duration::from_millis(70)).await;

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.allow());
        assert!(!breaker.allow());
        assert!(breaker.status().probe_in_flight);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        let status = breaker.status();
        assert_eq!(status.failure_count, 0);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_failed_probe_reopens_and_restarts_cool_down() {
        let breaker = CircuitBreaker::new("anthropic", config(1, 50));

        breaker.record_failure();
        sleep(Duration::from_millis(70)).await;
        assert!(breaker.allow());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());

        sleep(Duration::from_millis(70)).await;
        assert!(breaker.allow());
    }

    #[tokio::test]
    async fn test_release_probe_allows_another_probe() {
        let breaker = CircuitBreaker::new("anthropic", config(1, 50));

        breaker.record_failure();
        sleep(Duration::from_millis(70)).await;

        assert!(breaker.allow());
        assert!(!breaker.allow());
        breaker.release_probe();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.allow());
    }

    #[tokio::test]
    async fn test_call_wraps_operation() {
        let breaker = CircuitBreaker::new("anthropic", config(1, 10_000));

        let ok = breaker.call(|| async { Ok::<_, String>("done") }).await;
        assert!(ok.is_ok());

        let failed = breaker.call(|| async { Err::<&str, _>("boom") }).await;
        assert!(matches!(failed, Err(CircuitBreakerError::OperationFailed("boom"))));

        let rejected = breaker.call(|| async { Ok::<_, &str>("skipped") }).await;
        assert!(matches!(rejected, Err(CircuitBreakerError::CircuitOpen { .. })));

        let metrics = breaker.metrics();
        assert_eq!(metrics.total_calls, 2);
        assert_eq!(metrics.rejected_calls, 1);
        assert_eq!(metrics.times_opened, 1);
    }

    #[test]
    fn test_reset_and_force_open() {
        let breaker = CircuitBreaker::new("anthropic", config(1, 10_000));

        breaker.force_open();
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::Open.to_string(), "open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
    }
}
