//! Automation engine: rule model, action-chain executor, retry handler, and
//! the two-cadence scheduler that drives both (spec §4.3).

pub mod actions;
pub mod chain;
pub mod error;
pub mod legacy;
pub mod retry;
pub mod scheduler;
pub mod template;
pub mod types;

pub use actions::{ActionDispatcher, LiveActionDispatcher};
pub use chain::ChainExecutor;
pub use error::{AutomationError, Result};
pub use retry::RetryHandler;
pub use scheduler::{SchedulerConfig, SchedulerEngine};
pub use types::{
    Action, ActionOutcome, ActionResult, ActionType, BackoffType, ChainExecutionResult, ChainStatus, Condition,
    ExecutionContext, RetryConfig, TimeTriggerType, Trigger,
};
