#![allow(clippy::doc_markdown)] // Allow technical terms like SQLite, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Dispatch Core
//!
//! Resilient dispatch core for agent task execution.
//!
//! ## Overview
//!
//! Tasks are handed to external providers that can be slow, rate limited or down. The
//! core keeps the daemon useful through those outages:
//!
//! - a **circuit breaker per provider** stops hammering a provider after repeated
//!   transient failures and admits a single probe once the cool-down elapses
//! - an **offline queue** in SQLite holds tasks that could not run because every
//!   candidate provider was unavailable
//! - a **drainer loop** replays queued tasks once any provider recovers, with a retry
//!   cap, TTL expiry and crash recovery of in-flight claims
//!
//! ## Module Organization
//!
//! - [`resilience`] - Circuit breakers and the per-provider registry
//! - [`queue`] - Durable offline queue
//! - [`orchestration`] - Availability gate, drainer, submit path and bootstrap
//! - [`provider`] - Provider trait, registry and failover dispatcher
//! - [`execution`] - Task payloads and the executor seam
//! - [`history`] - Terminal outcome records
//! - [`notify`] - Operator notifications
//! - [`database`] - Connection pool and schema
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dispatch_core::config::ConfigManager;
//! use dispatch_core::history::HistorySink;
//! use dispatch_core::notify::LogNotifier;
//! use dispatch_core::orchestration::DispatchCore;
//! use dispatch_core::provider::{ProviderDispatcher, ProviderExecutor, ProviderRegistry, RoutingTable};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(
//! #     registry: ProviderRegistry,
//! #     history: Arc<dyn HistorySink>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = manager.config().clone();
//!
//! let breakers = DispatchCore::build_circuit_breakers(&config);
//! let dispatcher = ProviderDispatcher::new(
//!     Arc::new(registry),
//!     breakers.clone(),
//!     RoutingTable::from_config(&config),
//! );
//! let executor = Arc::new(ProviderExecutor::new(Arc::new(dispatcher)));
//!
//! let core = DispatchCore::bootstrap(
//!     config,
//!     breakers,
//!     executor,
//!     history,
//!     Arc::new(LogNotifier),
//! )
//! .await?;
//!
//! let token = CancellationToken::new();
//! let drainer = core.spawn_drainer(token.clone());
//! // ... submit tasks through core.dispatcher ...
//! token.cancel();
//! if let Some(handle) = drainer {
//!     handle.await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Tests run against throwaway SQLite files created with `tempfile`:
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod execution;
pub mod history;
pub mod logging;
pub mod notify;
pub mod orchestration;
pub mod provider;
pub mod queue;
pub mod resilience;

pub use config::{
    CircuitBreakerComponentConfig, ConfigManager, DatabaseConfig, DispatchConfig,
    DrainerConfig, OfflineQueueConfig, RetentionConfig,
};
pub use constants::{ExecutionStatus, QueueStatus};
pub use error::{DispatchError, Result};
pub use execution::{FailureKind, Task, TaskExecutor, TaskResult};
pub use history::{HistoryRecord, HistorySink, SqliteHistorySink};
pub use notify::{ChannelNotifier, LogNotifier, Notifier};
pub use orchestration::{
    AvailabilityGate, DispatchCore, DispatchOutcome, OfflineDispatcher, QueueDrainer,
    TickReport,
};
pub use provider::{Provider, ProviderDispatcher, ProviderError, ProviderExecutor, ProviderRegistry};
pub use queue::{NewQueuedTask, OfflineQueue, QueueCounts, QueuedTask};
pub use resilience::{CircuitBreaker, CircuitBreakerManager, CircuitState};
