//! # Structured Logging Module
//!
//! Environment-aware structured logging to the console and to a JSON log file, plus
//! helpers that give queue and breaker events a uniform field layout.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::constants::QueueStatus;
use crate::resilience::CircuitState;

static LOGGER_GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber. When a
/// global subscriber already exists (tests, embedding applications) it is left alone.
pub fn init_structured_logging() {
    LOGGER_GUARD.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let log_dir = PathBuf::from("log");
        let file_layer = match fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let file_name = format!(
                    "{}.{}.{}.log",
                    environment,
                    process::id(),
                    Utc::now().format("%Y%m%d_%H%M%S")
                );
                let appender = tracing_appender::rolling::never(&log_dir, file_name);
                Some(tracing_appender::non_blocking(appender))
            }
            Err(_) => None,
        };

        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_filter(build_filter(&log_level));

        let (file, guard) = match file_layer {
            Some((writer, guard)) => (
                Some(
                    fmt::layer()
                        .with_writer(writer)
                        .with_target(true)
                        .with_ansi(false)
                        .json()
                        .with_filter(build_filter(&log_level)),
                ),
                Some(guard),
            ),
            None => (None, None),
        };

        if tracing_subscriber::registry()
            .with(console)
            .with(file)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing");
            return None;
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            log_level = %log_level,
            "Structured logging initialized"
        );

        guard
    });
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn get_environment() -> String {
    std::env::var("DISPATCH_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log a queue lifecycle event with a uniform field layout
pub fn log_queue_operation(
    operation: &str,
    queue_id: i64,
    status: QueueStatus,
    retry_count: i64,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        queue_id = queue_id,
        status = %status,
        retry_count = retry_count,
        details = details,
        "QUEUE_OPERATION"
    );
}

/// Log a circuit breaker state transition
pub fn log_breaker_transition(provider: &str, from: CircuitState, to: CircuitState) {
    match to {
        CircuitState::Open => tracing::warn!(
            provider = %provider,
            from = %from,
            to = %to,
            "BREAKER_TRANSITION"
        ),
        _ => tracing::info!(
            provider = %provider,
            from = %from,
            to = %to,
            "BREAKER_TRANSITION"
        ),
    }
}
