//! # Task Execution
//!
//! The payload types the core moves around and the [`TaskExecutor`] seam through which
//! it reaches providers.

pub mod executor;
pub mod task;

pub use executor::TaskExecutor;
pub use task::{FailureKind, Task, TaskResult};
