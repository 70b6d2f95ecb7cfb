//! In-process domain event bus and the stats bridge that rides on it
//! (spec §4.5).

pub mod bus;
pub mod event;
pub mod stats;

pub use bus::{EventBus, Subscription};
pub use event::{DomainEvent, EventType};
pub use stats::{Broadcaster, StatsBridge, DEFAULT_DEBOUNCE};
