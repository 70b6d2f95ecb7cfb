//! Instant-messaging cloud-API webhook (spec §6): a GET subscription
//! handshake plus a POST inbound-message callback, grounded on
//! `http::webhooks::webhook_handler`'s per-source dispatch shape but with
//! the provider's own verify-token handshake and JSON envelope rather than
//! the teacher's generic HMAC/bearer auth modes.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{info, warn};

use butler_core::error::{ButlerError, Result};
use butler_core::ids::MessageId;
use butler_persistence::models::ChannelType;
use butler_pipeline::Inbound;

use crate::app::AppState;

/// GET /webhooks/im/:app_id — Meta-style subscription verification.
pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Path(_app_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let expected = match state.config.webhooks.im_verify_token.as_deref() {
        Some(token) => token,
        None => return ButlerError::Fatal("im_verify_token not configured".to_string()).into_response(),
    };
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();

    if mode == Some("subscribe") && token == Some(expected) {
        (axum::http::StatusCode::OK, challenge).into_response()
    } else {
        warn!("im webhook verify handshake rejected");
        ButlerError::Unauthorized.into_response()
    }
}

/// POST /webhooks/im/:app_id — provider JSON envelope carrying zero or more
/// inbound messages.
pub async fn inbound_handler(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
    axum::Json(payload): axum::Json<serde_json::Value>,
) -> Response {
    match handle_inbound(&state, &app_id, &payload).await {
        Ok(()) => axum::http::StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    value: ChangeValue,
}

#[derive(Debug, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    messages: Vec<InboundMessage>,
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    from: String,
    #[serde(default)]
    text: Option<TextBody>,
    #[serde(rename = "type")]
    message_type: String,
}

#[derive(Debug, Deserialize)]
struct TextBody {
    body: String,
}

const MEDIA_NOT_SUPPORTED_REPLY: &str = "We can only read text messages right now — please describe your request in words.";

async fn handle_inbound(state: &AppState, app_id: &str, payload: &serde_json::Value) -> Result<()> {
    let envelope: Envelope = serde_json::from_value(payload.clone())
        .map_err(|e| ButlerError::Validation(format!("malformed webhook payload: {e}")))?;

    for message in envelope.entry.into_iter().flat_map(|e| e.changes).map(|c| c.value).flat_map(|v| v.messages) {
        info!(app_id = %app_id, from = %message.from, message_type = %message.message_type, "im webhook inbound");

        let (content, message_id) = if message.message_type == "text" {
            let body = message.text.map(|t| t.body).unwrap_or_default();
            let inbound = Inbound::new(ChannelType::InstantMessaging, message.from.clone(), body);
            let outbound = butler_pipeline::process(state, inbound).await?;
            (outbound.content, Some(outbound.message_id))
        } else {
            (MEDIA_NOT_SUPPORTED_REPLY.to_string(), None)
        };

        if let Some(channel) = state.registry.active_channel("instant_message") {
            let result = channel
                .send(
                    &message.from,
                    butler_registry::OutboundPayload { content, content_type: "text/plain".to_string(), metadata: None },
                )
                .await?;
            if let (Some(channel_message_id), Some(message_id)) = (result.channel_message_id, message_id) {
                state
                    .repos
                    .messages
                    .set_channel_message_id(&MessageId::from(message_id), &channel_message_id)?;
            }
        } else {
            warn!("no active instant-messaging channel adapter configured, reply not delivered");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_extracts_nested_text_messages() {
        let payload = serde_json::json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [{"from": "15551234567", "type": "text", "text": {"body": "hi"}}]
                    }
                }]
            }]
        });
        let envelope: Envelope = serde_json::from_value(payload).unwrap();
        let messages: Vec<InboundMessage> =
            envelope.entry.into_iter().flat_map(|e| e.changes).map(|c| c.value).flat_map(|v| v.messages).collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].from, "15551234567");
    }

    #[test]
    fn envelope_with_no_messages_is_accepted() {
        let payload = serde_json::json!({"entry": [{"changes": [{"value": {}}]}]});
        let envelope: Envelope = serde_json::from_value(payload).unwrap();
        assert!(envelope.entry[0].changes[0].value.messages.is_empty());
    }
}
