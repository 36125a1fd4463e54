//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered in order:
//!
//! 1. `dispatch.toml` in the configuration directory (optional)
//! 2. `dispatch.{environment}.toml` in the same directory (optional)
//! 3. `DISPATCH__*` environment variables, `__` separating nested keys
//!    (e.g. `DISPATCH__OFFLINE_QUEUE__MAX_ITEMS=50`)

use super::error::{ConfigResult, ConfigurationError};
use super::DispatchConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "DISPATCH";

/// Loaded configuration together with the context it was loaded from
#[derive(Debug)]
pub struct ConfigManager {
    config: DispatchConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for tests that should not depend on process environment.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading dispatch configuration"
        );

        let base = config_directory.join("dispatch.toml");
        let overlay = config_directory.join(format!("dispatch.{environment}.toml"));

        let config: DispatchConfig = Config::builder()
            .add_source(File::from(base.as_path()).required(false))
            .add_source(File::from(overlay.as_path()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        info!(
            environment = environment,
            queue_enabled = config.offline_queue.enabled,
            ttl_seconds = config.offline_queue.ttl_seconds,
            max_items = config.offline_queue.max_items,
            breakers_enabled = config.circuit_breakers.enabled,
            providers = config.providers.len(),
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Load a single explicit file, still honouring environment overrides
    pub fn load_from_file(path: &Path) -> ConfigResult<Arc<ConfigManager>> {
        if !path.is_file() {
            return Err(ConfigurationError::ConfigFileNotFound {
                path: path.to_path_buf(),
            });
        }

        let config: DispatchConfig = Config::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }))
    }

    /// Wrap an already-built configuration (tests, embedding)
    pub fn from_config(config: DispatchConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: Self::default_config_directory(),
        }))
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// JSON view of the configuration with credential-like values masked
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null);
        Self::sanitize_json_recursive(&mut value);
        value
    }

    /// Current environment from `DISPATCH_ENV`, then `APP_ENV`
    pub fn detect_environment() -> String {
        env::var("DISPATCH_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("DISPATCH_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value) {
        const SENSITIVE: [&str; 4] = ["password", "secret", "token", "url"];

        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    if SENSITIVE.iter().any(|p| key_lower.contains(p)) {
                        if let serde_json::Value::String(s) = val {
                            *val = serde_json::Value::String(Self::mask(s));
                        }
                    } else {
                        Self::sanitize_json_recursive(val);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    Self::sanitize_json_recursive(item);
                }
            }
            _ => {}
        }
    }

    fn mask(s: &str) -> String {
        // sqlite paths carry no credentials; anything with userinfo does
        match s.split_once('@') {
            Some((_, host)) => format!("[MASKED]@{host}"),
            None => s.to_string(),
        }
    }
}
