//! # Provider Layer
//!
//! Pluggable model backends and the failover path that routes a task through them.
//!
//! [`ProviderDispatcher`] walks an ordered candidate list, consults each provider's
//! circuit breaker before calling it, and reports outcomes back to the breaker.
//! [`ProviderExecutor`] adapts the dispatcher to the [`TaskExecutor`](crate::execution::TaskExecutor)
//! seam used by the drainer and the offline dispatcher.

pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use dispatcher::{ProviderDispatcher, ProviderFailure, RoutingTable};
pub use error::ProviderError;
pub use executor::ProviderExecutor;
pub use registry::ProviderRegistry;

/// What a provider needs to run one prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub model: String,
    pub workdir: String,
    pub timeout: Duration,
    pub budget: f64,
    pub session_id: String,
}

/// Normalized output from any provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub output: String,
    pub cost_usd: f64,
    pub duration_ms: i64,
    pub session_id: String,
    /// Name of the provider that actually handled the request
    pub provider: String,
    pub output_file: String,
}

/// A model backend
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(
        &self,
        token: CancellationToken,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError>;
}
