//! # Offline Queue
//!
//! Durable buffer for tasks that could not be dispatched because no provider would
//! accept them. Items move `pending → processing → completed | failed | pending`, and
//! `pending → expired` when the TTL sweep abandons them.
//!
//! Claims are a single conditional `UPDATE ... RETURNING`, so two drain attempts can
//! never hold the same item.

pub mod models;
pub mod store;

pub use models::{NewQueuedTask, QueueCounts, QueuedTask};
pub use store::OfflineQueue;
