//! Short-message inbound and status-callback webhooks (spec §6), grounded
//! on `http::webhooks::verify_hmac_sha256`'s shape but over `Hmac<Sha1>` with
//! a base64 wire form rather than hex, since the provider this mirrors
//! signs the URL concatenated with sorted form parameters rather than a raw
//! body.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tracing::{info, warn};

use butler_core::error::{ButlerError, Result};
use butler_core::ids::MessageId;
use butler_persistence::models::{ChannelType, DeliveryStatus};
use butler_pipeline::Inbound;

use crate::app::AppState;

type HmacSha1 = Hmac<Sha1>;

const EMPTY_TWIML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>";
const MEDIA_NOT_SUPPORTED_REPLY: &str = "We can only read text messages right now — please describe your request in words.";

/// POST /webhooks/sms/inbound
pub async fn inbound_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(params): Form<BTreeMap<String, String>>,
) -> Response {
    match handle_inbound(&state, &headers, &params).await {
        Ok(()) => (axum::http::StatusCode::OK, [("content-type", "text/xml")], EMPTY_TWIML).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn handle_inbound(state: &AppState, headers: &HeaderMap, params: &BTreeMap<String, String>) -> Result<()> {
    let secret = state
        .config
        .webhooks
        .sms_auth_token
        .as_deref()
        .ok_or_else(|| ButlerError::Fatal("sms_auth_token not configured".to_string()))?;
    let signature = headers
        .get("x-twilio-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ButlerError::Unauthorized)?;
    let url = format!("{}/webhooks/sms/inbound", base_url(state));
    verify_signature(secret, &url, params, signature).map_err(|e| {
        warn!(reason = %e, "sms webhook signature verification failed");
        ButlerError::Unauthorized
    })?;

    let from = params.get("From").ok_or_else(|| ButlerError::Validation("missing From".to_string()))?;
    let num_media: u32 = params.get("NumMedia").and_then(|n| n.parse().ok()).unwrap_or(0);

    info!(from = %from, num_media, "sms webhook inbound");

    let (content, message_id) = if num_media > 0 {
        (MEDIA_NOT_SUPPORTED_REPLY.to_string(), None)
    } else {
        let body = params.get("Body").cloned().unwrap_or_default();
        let inbound = Inbound::new(ChannelType::ShortMessage, from.clone(), body);
        let outbound = butler_pipeline::process(state, inbound).await?;
        (outbound.content, Some(outbound.message_id))
    };

    if let Some(channel) = state.registry.active_channel("short_message") {
        let result = channel
            .send(from, butler_registry::OutboundPayload { content, content_type: "text/plain".to_string(), metadata: None })
            .await?;
        if let (Some(channel_message_id), Some(message_id)) = (result.channel_message_id, message_id) {
            state
                .repos
                .messages
                .set_channel_message_id(&MessageId::from(message_id), &channel_message_id)?;
        }
    } else {
        warn!("no active short-message channel adapter configured, reply not delivered");
    }

    Ok(())
}

/// PATCH-by-POST status callback: maps provider status vocabulary to the
/// core's `DeliveryStatus` (spec §6).
pub async fn status_handler(State(state): State<Arc<AppState>>, Form(params): Form<BTreeMap<String, String>>) -> Response {
    match handle_status(&state, &params) {
        Ok(()) => (axum::http::StatusCode::OK, [("content-type", "text/xml")], EMPTY_TWIML).into_response(),
        Err(e) => e.into_response(),
    }
}

fn handle_status(state: &AppState, params: &BTreeMap<String, String>) -> Result<()> {
    let Some(sid) = params.get("MessageSid") else {
        return Ok(());
    };
    let Some(provider_status) = params.get("MessageStatus") else {
        return Ok(());
    };
    let status = map_status(provider_status);
    if let Some(message) = state.repos.messages.find_by_provider_message_id("channelMessageId", sid)? {
        state.repos.messages.update_delivery_status(&message.id, status)?;
    }
    Ok(())
}

fn map_status(provider_status: &str) -> DeliveryStatus {
    match provider_status {
        "queued" | "accepted" | "sending" => DeliveryStatus::Pending,
        "sent" => DeliveryStatus::Sent,
        "delivered" => DeliveryStatus::Delivered,
        "read" => DeliveryStatus::Read,
        "failed" | "undelivered" => DeliveryStatus::Failed,
        _ => DeliveryStatus::Pending,
    }
}

fn base_url(state: &AppState) -> String {
    state
        .config
        .gateway
        .public_base_url
        .clone()
        .unwrap_or_else(|| format!("http://{}:{}", state.config.gateway.bind, state.config.gateway.port))
}

/// Verify `HMAC-SHA1(secret, url + sorted(key+value for each form param))`,
/// base64-encoded, in constant time.
fn verify_signature(secret: &str, url: &str, params: &BTreeMap<String, String>, signature_b64: &str) -> std::result::Result<(), String> {
    use base64::Engine;
    let mut message = url.to_string();
    for (key, value) in params {
        message.push_str(key);
        message.push_str(value);
    }
    let expected = base64::engine::general_purpose::STANDARD
        .decode(signature_b64)
        .map_err(|_| "signature is not valid base64".to_string())?;
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(message.as_bytes());
    mac.verify_slice(&expected).map_err(|_| "signature mismatch".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_signature_verifies() {
        use base64::Engine;
        let secret = "my-auth-token";
        let url = "https://example.com/webhooks/sms/inbound";
        let mut params = BTreeMap::new();
        params.insert("Body".to_string(), "Hello".to_string());
        params.insert("From".to_string(), "+15551234567".to_string());

        let mut message = url.to_string();
        for (k, v) in &params {
            message.push_str(k);
            message.push_str(v);
        }
        let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        let signature = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        assert!(verify_signature(secret, url, &params, &signature).is_ok());
    }

    #[test]
    fn tampered_param_fails_verification() {
        use base64::Engine;
        let secret = "my-auth-token";
        let url = "https://example.com/webhooks/sms/inbound";
        let mut signed_params = BTreeMap::new();
        signed_params.insert("Body".to_string(), "Hello".to_string());
        let mut message = url.to_string();
        for (k, v) in &signed_params {
            message.push_str(k);
            message.push_str(v);
        }
        let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        let signature = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        let mut tampered = BTreeMap::new();
        tampered.insert("Body".to_string(), "Goodbye".to_string());
        assert!(verify_signature(secret, url, &tampered, &signature).is_err());
    }

    #[test]
    fn status_mapping_covers_provider_vocabulary() {
        assert_eq!(map_status("delivered"), DeliveryStatus::Delivered);
        assert_eq!(map_status("undelivered"), DeliveryStatus::Failed);
        assert_eq!(map_status("queued"), DeliveryStatus::Pending);
    }
}
