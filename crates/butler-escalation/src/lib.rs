//! Pure multi-signal escalation decision engine (spec §4.2): given
//! conversation history, the current inbound, responder confidence, and a
//! couple of guest/reservation flags, decides whether a human must take
//! over and at what priority. No I/O, no async — the pipeline assembles
//! the narrow [`EscalationInput`] from whatever repository it holds.

pub mod config;
pub mod engine;
pub mod sentiment;
pub mod types;

pub use config::EscalationConfig;
pub use engine::decide;
pub use types::{EscalationDecision, EscalationInput, HistoryMessage, Priority, Signal};
