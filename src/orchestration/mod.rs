//! # Orchestration
//!
//! Control flow that ties the breaker registry to the offline queue:
//!
//! - [`AvailabilityGate`]: go/no-go signal derived from breaker state
//! - [`QueueDrainer`]: background loop that replays queued tasks
//! - [`OfflineDispatcher`]: foreground submit path with queue fallback
//! - [`DispatchCore`]: bootstrap that wires all of the above

pub mod availability;
pub mod core;
pub mod dispatcher;
pub mod drainer;

pub use availability::AvailabilityGate;
pub use self::core::DispatchCore;
pub use dispatcher::{DispatchOutcome, OfflineDispatcher};
pub use drainer::{DrainerSettings, ItemOutcome, QueueDrainer, TickReport};
