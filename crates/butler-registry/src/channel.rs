//! `ChannelAdapter` — outbound delivery for short-message, instant-messaging,
//! and email channels (spec §6), grounded on `skynet_channels::channel::Channel`
//! but reduced to the send-and-test surface the pipeline needs; inbound
//! parsing lives in the gateway's webhook handlers, not here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::provider::ConnectionTestResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Sent,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct OutboundPayload {
    pub content: String,
    pub content_type: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct SendResult {
    pub status: SendStatus,
    pub channel_message_id: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn app_id(&self) -> &str;

    async fn send(&self, to: &str, payload: OutboundPayload) -> Result<SendResult>;

    async fn test_connection(&self) -> Result<ConnectionTestResult>;
}
