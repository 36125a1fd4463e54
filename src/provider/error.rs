use thiserror::Error;

/// Substrings that mark a provider failure as transient (upstream health, not the task)
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "deadline exceeded",
    "connection refused",
    "connection reset",
    "eof",
    "broken pipe",
    "http 5",
    "status 5",
    "temporarily unavailable",
    "service unavailable",
    "too many requests",
    "rate limit",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Upstream health problem; counts against the breaker and triggers failover
    #[error("{0}")]
    Transient(String),

    /// The request itself was rejected; returned to the caller without failover
    #[error("{0}")]
    Permanent(String),

    #[error("provider {name} is not registered")]
    NotRegistered { name: String },
}

impl ProviderError {
    /// Classify a free-form error message from a provider that only reports text
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_transient_message(&message) {
            Self::Transient(message)
        } else {
            Self::Permanent(message)
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker))
}
