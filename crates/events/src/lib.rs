//! `lotline-events` — event mechanics shared across the workspace.
//!
//! Contains the `Event` trait, the tenant-scoped `EventEnvelope`, and the
//! pub/sub `EventBus` abstraction with an in-memory implementation.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
