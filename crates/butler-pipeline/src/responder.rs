//! The pipeline's response-generation collaborator (spec §4.1 step 5,
//! §6): `Generate(conversation, inboundMessage, guestContext?) ->
//! {content, confidence, intent?, entities?, metadata?}`.

use async_trait::async_trait;
use butler_persistence::models::Conversation;
use serde_json::Value;

use butler_guests::GuestContext;
use butler_registry::provider::{ChatMessage, ChatRole, CompletionRequest, LanguageModelProvider};

#[derive(Debug, Clone)]
pub struct ResponderOutput {
    pub content: String,
    pub confidence: f64,
    pub intent: Option<String>,
    pub entities: Option<Value>,
    pub metadata: Value,
}

#[async_trait]
pub trait Responder: Send + Sync {
    async fn generate(
        &self,
        conversation: &Conversation,
        inbound_content: &str,
        guest_context: Option<&GuestContext>,
    ) -> butler_core::error::Result<ResponderOutput>;
}

/// Deterministic fallback with no language-model dependency: used when no
/// AI adapter is configured, and in tests. Never fails.
pub struct EchoResponder;

#[async_trait]
impl Responder for EchoResponder {
    async fn generate(
        &self,
        _conversation: &Conversation,
        inbound_content: &str,
        _guest_context: Option<&GuestContext>,
    ) -> butler_core::error::Result<ResponderOutput> {
        Ok(ResponderOutput {
            content: format!("You said: {inbound_content}"),
            // Above the default low-confidence escalation threshold (0.6):
            // the echo fallback must not itself trip an escalation.
            confidence: 0.75,
            intent: None,
            entities: None,
            metadata: Value::Null,
        })
    }
}

const SYSTEM_PROMPT: &str = "You are the Butler, a hotel's conversational assistant. \
Answer guest questions helpfully and concisely using any provided context.";

/// Backed by a registered `LanguageModelProvider`. Confidence isn't part of
/// the provider contract, so it is derived from `stop_reason`: a clean
/// `stop_reason` yields high confidence, a truncated/unknown one lower —
/// a deliberately coarse proxy, refined by the escalation engine downstream.
pub struct LlmResponder {
    provider: std::sync::Arc<dyn LanguageModelProvider>,
}

impl LlmResponder {
    pub fn new(provider: std::sync::Arc<dyn LanguageModelProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Responder for LlmResponder {
    async fn generate(
        &self,
        _conversation: &Conversation,
        inbound_content: &str,
        guest_context: Option<&GuestContext>,
    ) -> butler_core::error::Result<ResponderOutput> {
        let mut messages = vec![ChatMessage { role: ChatRole::System, content: SYSTEM_PROMPT.to_string() }];
        if let Some(ctx) = guest_context {
            if let Some(text) = render_guest_context(ctx) {
                messages.push(ChatMessage { role: ChatRole::System, content: text });
            }
        }
        messages.push(ChatMessage { role: ChatRole::User, content: inbound_content.to_string() });

        let response = self
            .provider
            .complete(CompletionRequest { messages, max_tokens: Some(1024), temperature: Some(0.3), stop_sequences: Vec::new() })
            .await?;

        let confidence = match response.stop_reason.as_deref() {
            Some("end_turn") | Some("stop") => 0.9,
            Some("max_tokens") => 0.55,
            _ => 0.75,
        };

        Ok(ResponderOutput {
            content: response.content,
            confidence,
            intent: None,
            entities: None,
            metadata: serde_json::json!({
                "inputTokens": response.usage.input_tokens,
                "outputTokens": response.usage.output_tokens,
            }),
        })
    }
}

fn render_guest_context(ctx: &GuestContext) -> Option<String> {
    let guest = ctx.guest.as_ref()?;
    let mut text = String::from("Guest context:\n");
    if let Some(name) = &guest.first_name {
        text.push_str(&format!("- first name: {name}\n"));
    }
    if let Some(tier) = &guest.vip_tier {
        text.push_str(&format!("- VIP tier: {tier}\n"));
    }
    if let Some(reservation) = &ctx.reservation {
        text.push_str(&format!(
            "- reservation: {} to {}, status {:?}\n",
            reservation.arrival_date, reservation.departure_date, reservation.status
        ));
        if let Some(room) = &reservation.room_number {
            text.push_str(&format!("- room: {room}\n"));
        }
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use butler_persistence::models::{ChannelType, ConversationState};

    fn conversation() -> Conversation {
        Conversation {
            id: butler_core::ids::ConversationId::new(),
            channel_type: ChannelType::WebChat,
            channel_id: "session-1".to_string(),
            state: ConversationState::New,
            guest_id: None,
            reservation_id: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn echo_responder_never_fails_and_echoes_input() {
        let responder = EchoResponder;
        let output = responder.generate(&conversation(), "hello", None).await.unwrap();
        assert!(output.content.contains("hello"));
        assert_eq!(output.confidence, 0.75);
    }
}
