//! The inbound message pipeline: identity resolution, context hydration,
//! response generation, and escalation, wired together behind a single
//! `process()` entry point (spec §4.1).

pub mod context;
pub mod escalate;
pub mod inbound;
pub mod process;
pub mod responder;

pub use context::PipelineContext;
pub use inbound::{Inbound, Outbound};
pub use process::process;
pub use responder::{EchoResponder, LlmResponder, Responder, ResponderOutput};
