//! Task and result payloads exchanged with the executor.
//!
//! `Task` is what the offline queue stores (serialized as JSON); the queue itself never
//! looks inside it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::constants::{defaults, ExecutionStatus};

/// A unit of work addressed to a provider on behalf of an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    pub prompt: String,
    pub workdir: String,
    pub model: String,
    /// Preferred provider; empty means "use role and fallback routing"
    #[serde(skip_serializing_if = "String::is_empty")]
    pub provider: String,
    /// Duration string such as `15m`; empty means the executor default
    pub timeout: String,
    pub budget: f64,
    pub system_prompt: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub role: String,
    /// Origin tag: `dispatch`, `cron`, `route:*`, `queue:*` ...
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub trace_id: String,
}

impl Task {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            prompt: prompt.into(),
            session_id: Uuid::new_v4().to_string(),
            ..Default::default()
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Fresh identifiers and a source tag so a replay is distinguishable from the
    /// submission that was queued.
    pub fn prepare_replay(&mut self, source_prefix: &str) {
        self.id = Uuid::new_v4().to_string();
        self.session_id = Uuid::new_v4().to_string();
        self.source = format!("{source_prefix}{}", self.source);
    }

    /// Parsed `timeout`, falling back to the default task timeout when empty or invalid
    pub fn timeout_duration(&self) -> Duration {
        parse_duration(&self.timeout)
            .unwrap_or(Duration::from_secs(defaults::TASK_TIMEOUT_SECONDS))
    }

    /// First eight characters of the id, used in log lines
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}

/// Parse `500ms`, `30s`, `15m`, `2h` or a bare number of seconds
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (amount, unit) = value.split_at(split);
    let amount: u64 = amount.parse().ok()?;

    let duration = match unit {
        "ms" => Duration::from_millis(amount),
        "" | "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount.checked_mul(60)?),
        "h" => Duration::from_secs(amount.checked_mul(3600)?),
        _ => return None,
    };
    (!duration.is_zero()).then_some(duration)
}

/// Why an execution failed, as far as the retry policy is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Every candidate provider was open, unregistered or failed transiently
    ProvidersUnavailable,
    /// The task itself failed; waiting will not help
    Task,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProvidersUnavailable => write!(f, "providers_unavailable"),
            Self::Task => write!(f, "task"),
        }
    }
}

/// Outcome of one execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub id: String,
    pub name: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub duration_ms: i64,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output_file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
    /// Set on every non-success result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl TaskResult {
    pub fn success(task: &Task, output: impl Into<String>) -> Self {
        Self {
            id: task.id.clone(),
            name: task.name.clone(),
            status: ExecutionStatus::Success,
            exit_code: 0,
            output: output.into(),
            error: String::new(),
            duration_ms: 0,
            cost_usd: 0.0,
            model: task.model.clone(),
            session_id: task.session_id.clone(),
            output_file: String::new(),
            provider: String::new(),
            failure: None,
        }
    }

    pub fn failure(task: &Task, kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Error,
            exit_code: 1,
            output: String::new(),
            error: error.into(),
            failure: Some(kind),
            ..Self::success(task, "")
        }
    }

    /// All candidate providers were unavailable
    pub fn providers_unavailable(task: &Task, error: impl Into<String>) -> Self {
        Self::failure(task, FailureKind::ProvidersUnavailable, error)
    }

    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Whether the failure is eligible for requeue
    pub fn is_availability_failure(&self) -> bool {
        !self.is_success() && self.failure == Some(FailureKind::ProvidersUnavailable)
    }
}
