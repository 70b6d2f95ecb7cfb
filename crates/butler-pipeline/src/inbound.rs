//! The pipeline's single entry shape: `Process(inbound) -> outbound`
//! (spec §4.1).

use butler_persistence::models::ChannelType;

/// What a transport hands the pipeline: channel, channel-specific
/// identifier (phone, email, or session token), content, and content type.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub channel: ChannelType,
    pub channel_id: String,
    pub content: String,
    pub content_type: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Inbound {
    pub fn new(channel: ChannelType, channel_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            channel,
            channel_id: channel_id.into(),
            content: content.into(),
            content_type: "text/plain".to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// What the pipeline hands back for delivery via the appropriate channel
/// adapter (or, for the guest chat socket, directly to the caller).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Outbound {
    pub conversation_id: String,
    pub message_id: String,
    pub content: String,
    pub content_type: String,
    pub escalated: bool,
    pub metadata: serde_json::Value,
}
