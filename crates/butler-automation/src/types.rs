//! Rule model types: triggers, the ordered action chain, retry policy, and
//! the per-execution bookkeeping structures the chain executor produces.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeTriggerType {
    BeforeArrival,
    AfterArrival,
    BeforeDeparture,
    AfterDeparture,
    Scheduled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Trigger {
    Time {
        #[serde(rename = "type")]
        kind: TimeTriggerType,
        #[serde(skip_serializing_if = "Option::is_none")]
        offset_days: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        time: Option<String>,
    },
    Event {
        event_type: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendMessage,
    CreateTask,
    NotifyStaff,
    Webhook,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Always,
    PreviousSuccess,
    PreviousFailed,
    Expression { expression: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub config: serde_json::Value,
    pub order: i32,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub condition: Option<Condition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    Exponential,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    pub initial_delay_ms: u64,
    pub max_attempts: u32,
    pub backoff_type: BackoffType,
    pub max_delay_ms: u64,
}

/// The guest/reservation/event snapshot a chain fires against. Guest and
/// reservation fields feed template substitution (spec §4.3's
/// `{{firstName}}`/`{{roomNumber}}`/... placeholders).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub rule_id: String,
    pub rule_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action_id: String,
    pub outcome: ActionOutcome,
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    Completed,
    Failed,
    Partial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainExecutionResult {
    pub status: ChainStatus,
    pub action_results: Vec<ActionResult>,
}
