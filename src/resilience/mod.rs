//! # Resilience Module
//!
//! Per-provider circuit breakers that keep the dispatcher and the offline queue drainer
//! from hammering an upstream that is already failing.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: one per provider, closed → open → half-open → closed
//! - **Manager**: lazily creates breakers with per-provider thresholds
//! - **Metrics Collection**: call, failure and rejection counters per breaker
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dispatch_core::resilience::{BreakerSettings, CircuitBreaker};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = BreakerSettings {
//!     failure_threshold: 5,
//!     timeout: Duration::from_secs(30),
//!     success_threshold: 1,
//! };
//!
//! let circuit_breaker = CircuitBreaker::new("anthropic", settings);
//!
//! let result = circuit_breaker.call(|| async {
//!     Ok::<&str, Box<dyn std::error::Error>>("success")
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod manager;
pub mod metrics;

pub use circuit_breaker::{
    BreakerSettings, BreakerStatus, CircuitBreaker, CircuitBreakerError, CircuitState,
};
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
