//! # Notifications
//!
//! Human-readable messages for queue events an operator should see: TTL expiry
//! batches, recovery after retry and terminal failure after exhausting retries.

use tokio::sync::mpsc;
use tracing::{info, warn};

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Forwards messages to a channel consumed by a delivery adapter
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, message: &str) {
        if self.sender.send(message.to_string()).is_err() {
            warn!(message = %message, "Notification receiver dropped");
        }
    }
}

/// Writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!(message = %message, "NOTIFICATION");
    }
}

/// Shorten `text` to at most `max_chars` characters, marking the cut with `...`
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut shortened: String = text.chars().take(max_chars).collect();
    shortened.push_str("...");
    shortened
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_notifier_delivers() {
        let (notifier, mut receiver) = ChannelNotifier::new();
        notifier.notify("Offline queue: 2 item(s) expired (TTL 1h)");

        assert_eq!(
            receiver.recv().await.as_deref(),
            Some("Offline queue: 2 item(s) expired (TTL 1h)")
        );

        drop(receiver);
        notifier.notify("dropped silently");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ééé", 2), "éé...");
    }
}
