//! Guest identity resolution and reservation hydration (spec §4.1 steps 1
//! and 3): turns a raw channel identifier (phone, email) into a `Guest` row
//! and assembles the `GuestContext` handed to the rest of the pipeline.

pub mod context;
pub mod phone;

pub use context::{GuestContext, GuestContextService};
