//! Shared primitives used by every Butler crate: opaque ids, the static
//! configuration surface, the unified error type, and timestamp helpers.

pub mod config;
pub mod error;
pub mod ids;
pub mod time;

pub use config::ButlerConfig;
pub use error::{ButlerError, Result};
