//! The closed set of domain events and the envelope that carries them.
//!
//! Shape mirrors `HookContext` (event discriminator + untyped JSON payload +
//! timestamp) so the bus stays decoupled from every producer's domain types.

use serde::{Deserialize, Serialize};

use butler_core::time::now_iso8601;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[serde(rename = "message.received")]
    MessageReceived,
    #[serde(rename = "message.sent")]
    MessageSent,
    #[serde(rename = "conversation.created")]
    ConversationCreated,
    #[serde(rename = "conversation.updated")]
    ConversationUpdated,
    #[serde(rename = "conversation.escalated")]
    ConversationEscalated,
    #[serde(rename = "conversation.resolved")]
    ConversationResolved,
    #[serde(rename = "task.created")]
    TaskCreated,
    #[serde(rename = "task.assigned")]
    TaskAssigned,
    #[serde(rename = "task.completed")]
    TaskCompleted,
    #[serde(rename = "guest.created")]
    GuestCreated,
    #[serde(rename = "guest.updated")]
    GuestUpdated,
    #[serde(rename = "approval.queued")]
    ApprovalQueued,
    #[serde(rename = "approval.decided")]
    ApprovalDecided,
    #[serde(rename = "approval.executed")]
    ApprovalExecuted,
    #[serde(rename = "model.download.progress")]
    ModelDownloadProgress,
    #[serde(rename = "reservation.upserted")]
    ReservationUpserted,
    #[serde(rename = "staff.notification")]
    StaffNotification,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::MessageReceived => "message.received",
            EventType::MessageSent => "message.sent",
            EventType::ConversationCreated => "conversation.created",
            EventType::ConversationUpdated => "conversation.updated",
            EventType::ConversationEscalated => "conversation.escalated",
            EventType::ConversationResolved => "conversation.resolved",
            EventType::TaskCreated => "task.created",
            EventType::TaskAssigned => "task.assigned",
            EventType::TaskCompleted => "task.completed",
            EventType::GuestCreated => "guest.created",
            EventType::GuestUpdated => "guest.updated",
            EventType::ApprovalQueued => "approval.queued",
            EventType::ApprovalDecided => "approval.decided",
            EventType::ApprovalExecuted => "approval.executed",
            EventType::ModelDownloadProgress => "model.download.progress",
            EventType::ReservationUpserted => "reservation.upserted",
            EventType::StaffNotification => "staff.notification",
        }
    }

    /// The `stats:*` topic this event feeds, if any — the stats bridge
    /// subscribes to exactly the events that answer yes here.
    pub fn stats_topic(self) -> Option<&'static str> {
        match self {
            EventType::TaskCreated | EventType::TaskAssigned | EventType::TaskCompleted => Some("stats:tasks"),
            EventType::ConversationCreated
            | EventType::ConversationUpdated
            | EventType::ConversationEscalated
            | EventType::ConversationResolved => Some("stats:conversations"),
            EventType::ApprovalQueued | EventType::ApprovalDecided | EventType::ApprovalExecuted => {
                Some("stats:approvals")
            }
            _ => None,
        }
    }
}

/// One occurrence on the bus: a typed discriminator, an RFC 3339 timestamp,
/// and a JSON payload whose shape is determined by `event_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_type: EventType,
    pub timestamp: String,
    pub payload: serde_json::Value,
}

impl DomainEvent {
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self { event_type, timestamp: now_iso8601(), payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_topic_groups_events_by_the_three_topics() {
        assert_eq!(EventType::TaskCreated.stats_topic(), Some("stats:tasks"));
        assert_eq!(EventType::ConversationEscalated.stats_topic(), Some("stats:conversations"));
        assert_eq!(EventType::ApprovalQueued.stats_topic(), Some("stats:approvals"));
        assert_eq!(EventType::MessageReceived.stats_topic(), None);
    }

    #[test]
    fn serializes_with_dotted_type_names() {
        let event = DomainEvent::new(EventType::GuestCreated, serde_json::json!({"guestId": "gst_1"}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "guest.created");
    }
}
