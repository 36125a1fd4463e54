//! # System Constants
//!
//! Queue lifecycle states, execution statuses and the defaults that bound the
//! offline queue and drainer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source tag prefix applied to tasks replayed by the drainer
pub const QUEUE_SOURCE_PREFIX: &str = "queue:";

/// Source tag prefix applied to tasks replayed by an operator
pub const QUEUE_RETRY_SOURCE_PREFIX: &str = "queue-retry:";

/// Error recorded on items abandoned by the TTL sweep
pub const TTL_EXCEEDED_ERROR: &str = "TTL exceeded";

/// Default values mirrored by the configuration layer
pub mod defaults {
    pub const QUEUE_TTL_SECONDS: u64 = 3600;
    pub const QUEUE_MAX_ITEMS: i64 = 100;
    pub const QUEUE_MAX_RETRIES: i64 = 3;
    pub const DRAIN_TICK_INTERVAL_MS: u64 = 30_000;
    pub const PRUNE_INTERVAL_SECONDS: u64 = 3600;
    pub const QUEUE_RETENTION_DAYS: u32 = 7;
    pub const DRAIN_MAX_CONCURRENCY: usize = 4;
    pub const TASK_TIMEOUT_SECONDS: u64 = 900;
    pub const NOTIFY_ERROR_TRUNCATE: usize = 200;
}

/// Lifecycle of an item in the offline queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting to be claimed by the drainer
    Pending,
    /// Claimed by a drain attempt
    Processing,
    Completed,
    Failed,
    /// Abandoned by the TTL sweep before it could be claimed
    Expired,
}

impl QueueStatus {
    pub const ALL: [QueueStatus; 5] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::Expired,
    ];

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }

    /// Pending and processing items count against the queue ceiling
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Invalid queue status: {s}")),
        }
    }
}

/// Outcome status of a single task execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Error,
    Timeout,
    Cancelled,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_queue_status_string_mapping() {
        for status in QueueStatus::ALL {
            assert_eq!(QueueStatus::from_str(status.as_str()), Ok(status));
        }
        assert!(QueueStatus::from_str("running").is_err());
    }

    #[test]
    fn test_queue_status_classification() {
        assert!(QueueStatus::Pending.is_active());
        assert!(QueueStatus::Processing.is_active());
        assert!(!QueueStatus::Processing.is_terminal());
        assert!(QueueStatus::Completed.is_terminal());
        assert!(QueueStatus::Failed.is_terminal());
        assert!(QueueStatus::Expired.is_terminal());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&QueueStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        let json = serde_json::to_string(&ExecutionStatus::Success).unwrap();
        assert_eq!(json, "\"success\"");
    }
}
