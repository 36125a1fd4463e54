//! # Dispatch Core Bootstrap
//!
//! Builds the process-wide services once: the SQLite pool, the circuit breaker registry,
//! the offline queue, the availability gate, the drainer and the offline dispatcher.
//! Everything is handed out as explicit `Arc`s; there is no ambient global state.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::DispatchConfig;
use crate::database::{DatabaseConnection, DatabaseMigrations};
use crate::error::Result;
use crate::execution::TaskExecutor;
use crate::history::HistorySink;
use crate::notify::Notifier;
use crate::orchestration::{
    AvailabilityGate, DrainerSettings, OfflineDispatcher, QueueDrainer,
};
use crate::queue::OfflineQueue;
use crate::resilience::CircuitBreakerManager;

/// Fully wired dispatch services
pub struct DispatchCore {
    pub config: DispatchConfig,

    pub database: DatabaseConnection,

    /// Present when `circuit_breakers.enabled`
    pub circuit_breakers: Option<Arc<CircuitBreakerManager>>,

    pub queue: OfflineQueue,

    pub gate: AvailabilityGate,

    pub drainer: Arc<QueueDrainer>,

    pub dispatcher: Arc<OfflineDispatcher>,

    /// Shared by foreground dispatch and the drainer
    pub limiter: Arc<Semaphore>,
}

impl std::fmt::Debug for DispatchCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchCore")
            .field("config", &self.config)
            .field("circuit_breakers", &self.circuit_breakers.is_some())
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl DispatchCore {
    /// Build the breaker registry configured by `config`, if enabled
    pub fn build_circuit_breakers(config: &DispatchConfig) -> Option<Arc<CircuitBreakerManager>> {
        config
            .circuit_breakers
            .enabled
            .then(|| Arc::new(CircuitBreakerManager::from_config(&config.circuit_breakers)))
    }

    /// Open storage, apply the schema and wire every service.
    ///
    /// `circuit_breakers` should be the registry the executor's provider layer records
    /// into, so the gate sees the same breaker state; pass `None` to build one from
    /// `config`.
    pub async fn bootstrap(
        config: DispatchConfig,
        circuit_breakers: Option<Arc<CircuitBreakerManager>>,
        executor: Arc<dyn TaskExecutor>,
        history: Arc<dyn HistorySink>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;

        let database = DatabaseConnection::connect(&config.database).await?;
        DatabaseMigrations::run_all(database.pool()).await?;

        let circuit_breakers =
            circuit_breakers.or_else(|| Self::build_circuit_breakers(&config));
        let queue = OfflineQueue::new(database.pool().clone());
        let gate = AvailabilityGate::new(circuit_breakers.clone(), config.providers.clone());
        let limiter = Arc::new(Semaphore::new(config.drainer.max_concurrency.max(1)));

        let drainer = QueueDrainer::new(
            queue.clone(),
            gate.clone(),
            Arc::clone(&executor),
            history,
            notifier,
            DrainerSettings::from_config(&config),
        )
        .with_limiter(Arc::clone(&limiter));

        let dispatcher = OfflineDispatcher::new(
            executor,
            queue.clone(),
            config.offline_queue.clone(),
            Arc::clone(&limiter),
        );

        info!(
            database = %config.database.url,
            circuit_breakers = circuit_breakers.is_some(),
            providers = config.providers.len(),
            queue_enabled = config.offline_queue.enabled,
            "Dispatch core bootstrapped"
        );

        Ok(Self {
            config,
            database,
            circuit_breakers,
            queue,
            gate,
            drainer: Arc::new(drainer),
            dispatcher: Arc::new(dispatcher),
            limiter,
        })
    }

    /// Spawn the drainer on the current runtime. It stops when `token` is cancelled;
    /// when the offline queue is disabled no loop is started.
    pub fn spawn_drainer(&self, token: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.config.offline_queue.enabled {
            info!("Offline queue disabled, drainer not started");
            return None;
        }

        let drainer = Arc::clone(&self.drainer);
        Some(tokio::spawn(async move { drainer.run(token).await }))
    }

    /// Stop accepting pool connections
    pub async fn shutdown(self) {
        self.database.close().await;
    }
}
