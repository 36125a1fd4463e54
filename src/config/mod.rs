//! # Dispatch Configuration System
//!
//! Typed configuration for the dispatch core. Every section carries serde defaults so a
//! partial file (or no file at all) yields a working daemon, and `validate()` rejects
//! values the queue and drainer cannot operate with.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dispatch_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let ttl = manager.config().offline_queue.ttl();
//! let max_items = manager.config().offline_queue.max_items;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::constants::defaults;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/dispatch.toml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Durable store backing the offline queue and history
    pub database: DatabaseConfig,

    /// Offline queue behaviour
    pub offline_queue: OfflineQueueConfig,

    /// Drainer loop cadence and housekeeping
    pub drainer: DrainerConfig,

    /// Per-provider circuit breakers
    pub circuit_breakers: CircuitBreakerConfig,

    /// Retention windows for terminal records
    pub retention: RetentionConfig,

    /// Configured provider names, in preference order
    pub providers: Vec<String>,

    /// Providers tried after the task and role candidates are exhausted
    pub fallback_providers: Vec<String>,

    /// Agent role name to ordered provider candidates
    pub role_providers: HashMap<String, Vec<String>>,
}

impl DispatchConfig {
    /// Validate every section, returning the first problem found
    pub fn validate(&self) -> ConfigResult<()> {
        self.database.validate()?;
        self.offline_queue.validate()?;
        self.drainer.validate()?;
        self.circuit_breakers.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.url.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "database.url",
                &self.url,
                "database url must not be empty",
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                self.max_connections,
                "pool needs at least one connection",
            ));
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://dispatch.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5000,
        }
    }
}

/// Offline queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OfflineQueueConfig {
    pub enabled: bool,
    /// Max time an item may wait in `pending` before it expires
    pub ttl_seconds: u64,
    /// Ceiling on pending + processing items
    pub max_items: i64,
    /// Requeues allowed for availability failures before an item fails
    pub max_retries: i64,
}

impl OfflineQueueConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "offline_queue.ttl_seconds",
                self.ttl_seconds,
                "ttl must be greater than 0",
            ));
        }
        if self.max_items <= 0 {
            return Err(ConfigurationError::invalid_value(
                "offline_queue.max_items",
                self.max_items,
                "max_items must be greater than 0",
            ));
        }
        if self.max_retries <= 0 {
            return Err(ConfigurationError::invalid_value(
                "offline_queue.max_retries",
                self.max_retries,
                "max_retries must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for OfflineQueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: defaults::QUEUE_TTL_SECONDS,
            max_items: defaults::QUEUE_MAX_ITEMS,
            max_retries: defaults::QUEUE_MAX_RETRIES,
        }
    }
}

/// Drainer loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DrainerConfig {
    pub tick_interval_ms: u64,
    /// Reset `processing` items left behind by a previous process before the first tick
    pub recover_on_startup: bool,
    pub prune_interval_seconds: u64,
    /// Permits in the concurrency limiter handed to the executor
    pub max_concurrency: usize,
}

impl DrainerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_seconds)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "drainer.tick_interval_ms",
                self.tick_interval_ms,
                "tick interval must be greater than 0",
            ));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "drainer.max_concurrency",
                self.max_concurrency,
                "max_concurrency must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for DrainerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: defaults::DRAIN_TICK_INTERVAL_MS,
            recover_on_startup: true,
            prune_interval_seconds: defaults::PRUNE_INTERVAL_SECONDS,
            max_concurrency: defaults::DRAIN_MAX_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Days to keep completed, failed and expired queue items
    pub queue_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            queue_days: defaults::QUEUE_RETENTION_DAYS,
        }
    }
}

/// System-wide circuit breaker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    pub global_settings: CircuitBreakerGlobalSettings,
    pub default_config: CircuitBreakerComponentConfig,
    /// Per-provider overrides keyed by provider name
    pub component_configs: HashMap<String, CircuitBreakerComponentConfig>,
}

impl CircuitBreakerConfig {
    /// Configuration for a provider, falling back to the default
    pub fn config_for_component(&self, component_name: &str) -> CircuitBreakerComponentConfig {
        self.component_configs
            .get(component_name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.global_settings.max_circuit_breakers == 0 {
            return Err(ConfigurationError::invalid_value(
                "circuit_breakers.global_settings.max_circuit_breakers",
                0,
                "must be greater than 0",
            ));
        }
        self.default_config
            .validate("circuit_breakers.default_config")?;
        for (name, component) in &self.component_configs {
            component.validate(&format!("circuit_breakers.component_configs.{name}"))?;
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_settings: CircuitBreakerGlobalSettings::default(),
            default_config: CircuitBreakerComponentConfig::default(),
            component_configs: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerGlobalSettings {
    pub max_circuit_breakers: u32,
}

impl Default for CircuitBreakerGlobalSettings {
    fn default() -> Self {
        Self {
            max_circuit_breakers: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerComponentConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
    pub success_threshold: u32,
}

impl CircuitBreakerComponentConfig {
    /// Both thresholds and the cool-down must be non-zero
    fn validate(&self, path: &str) -> ConfigResult<()> {
        let checks = [
            ("failure_threshold", self.failure_threshold as u64),
            ("timeout_seconds", self.timeout_seconds),
            ("success_threshold", self.success_threshold as u64),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("{path}.{field}"),
                    value,
                    "must be greater than 0",
                ));
            }
        }
        Ok(())
    }
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_seconds: 30,
            success_threshold: 1,
        }
    }
}
