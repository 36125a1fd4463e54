//! Loading the shipped configuration files

use dispatch_core::config::ConfigManager;
use std::path::PathBuf;
use std::time::Duration;

fn config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config")
}

#[test]
fn test_base_configuration_loads() {
    let manager =
        ConfigManager::load_from_directory_with_env(Some(config_dir()), "production").unwrap();
    let config = manager.config();

    assert_eq!(config.providers, vec!["anthropic", "openai"]);
    assert!(config.offline_queue.enabled);
    assert_eq!(config.offline_queue.ttl(), Duration::from_secs(3600));
    assert_eq!(config.offline_queue.max_items, 100);
    assert_eq!(config.offline_queue.max_retries, 3);
    assert_eq!(config.drainer.tick_interval(), Duration::from_secs(30));

    let openai = config.circuit_breakers.config_for_component("openai");
    assert_eq!(openai.failure_threshold, 3);
    let anthropic = config.circuit_breakers.config_for_component("anthropic");
    assert_eq!(anthropic.failure_threshold, 5);
    assert_eq!(anthropic.timeout_seconds, 30);
}

#[test]
fn test_test_overlay_applies() {
    let manager = ConfigManager::load_from_directory_with_env(Some(config_dir()), "test").unwrap();
    let config = manager.config();

    assert_eq!(manager.environment(), "test");
    assert_eq!(config.database.max_connections, 1);
    assert_eq!(config.offline_queue.max_items, 10);
    assert_eq!(config.offline_queue.ttl_seconds, 60);
    assert_eq!(config.drainer.tick_interval_ms, 50);
    // untouched by the overlay
    assert_eq!(config.offline_queue.max_retries, 3);
    assert_eq!(config.retention.queue_days, 7);
}
