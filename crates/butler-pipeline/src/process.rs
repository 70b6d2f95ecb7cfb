//! `Process(inbound) -> outbound` (spec §4.1), the pipeline's single entry
//! point. Shaped after `process_message_non_streaming`'s free-function
//! style over a generic `C: MessageContext` — steps run in the order spec
//! §4.1 lists; see each step's comment for its failure semantics.

use butler_core::config::MAX_MESSAGE_CONTENT_CHARS;
use butler_core::error::{ButlerError, Result};
use butler_escalation::{EscalationInput, HistoryMessage};
use butler_events::{DomainEvent, EventType};
use butler_persistence::models::{ChannelType, ConversationState, MessageDirection, ReservationStatus, SenderType};

use crate::context::PipelineContext;
use crate::escalate::acknowledgement;
use crate::inbound::{Inbound, Outbound};

const RESPONDER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

pub async fn process<C: PipelineContext>(ctx: &C, inbound: Inbound) -> Result<Outbound> {
    if inbound.content.trim().is_empty() {
        return Err(ButlerError::Validation("message content must not be empty".to_string()));
    }
    if inbound.content.chars().count() > MAX_MESSAGE_CONTENT_CHARS {
        return Err(ButlerError::Validation(format!(
            "message content exceeds {MAX_MESSAGE_CONTENT_CHARS} characters"
        )));
    }

    let repos = ctx.repos();

    // Step 1: identity resolution. Degraded, not fatal, on failure.
    let guest = match inbound.channel {
        ChannelType::ShortMessage | ChannelType::InstantMessaging => ctx.guest_context().resolve_by_phone(&inbound.channel_id),
        ChannelType::Email => ctx.guest_context().resolve_by_email(&inbound.channel_id),
        ChannelType::WebChat => None,
    };

    // Step 2: conversation resolution + state advance.
    let conversation = match repos.conversations.get_or_create(inbound.channel, &inbound.channel_id, guest.as_ref().map(|g| &g.id)) {
        Ok(c) => c,
        Err(e) => return Err(e.into()),
    };
    let is_new_conversation = conversation.state == ConversationState::New;
    if is_new_conversation {
        ctx.events().emit(DomainEvent::new(
            EventType::ConversationCreated,
            serde_json::json!({"conversationId": conversation.id.to_string(), "channel": inbound.channel.to_string()}),
        ));
        if let Err(e) = repos.conversations.update_state(&conversation.id, ConversationState::Active) {
            tracing::warn!(error = %e, conversation_id = %conversation.id, "failed to advance conversation to active");
        }
    } else {
        ctx.events()
            .emit(DomainEvent::new(EventType::ConversationUpdated, serde_json::json!({"conversationId": conversation.id.to_string()})));
    }

    // Escalation history is read before the current inbound is persisted so
    // it reflects only prior turns, matching the engine's "excluding the
    // immediately previous exchange" wording applied to history, not to the
    // inbound itself.
    let history_window = ctx.escalation_config().history_window;
    let history = repos
        .messages
        .recent_for_conversation(&conversation.id, history_window)
        .unwrap_or_default();

    // Step 3: context hydration. Degraded, not fatal, on failure (the
    // service itself swallows repository errors into an empty GuestContext).
    let guest_context = ctx.guest_context().hydrate(guest);

    // Step 4: inbound persistence. Fatal on failure.
    repos
        .messages
        .insert(&conversation.id, MessageDirection::Inbound, SenderType::Guest, &inbound.content, &inbound.content_type, None, serde_json::Value::Null)
        .map_err(ButlerError::from)?;
    ctx.events().emit(DomainEvent::new(
        EventType::MessageReceived,
        serde_json::json!({"conversationId": conversation.id.to_string(), "content": inbound.content}),
    ));

    // Step 5: response generation. A responder failure — including a
    // timeout past the 30s budget (spec §5: "responder 30s") — is caught
    // and turned into a canned apology, never propagated.
    let responder_result = match tokio::time::timeout(
        RESPONDER_TIMEOUT,
        ctx.responder().generate(&conversation, &inbound.content, Some(&guest_context)),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(ButlerError::Transient("responder timed out".to_string())),
    };
    let responder_output = match responder_result {
        Ok(out) => out,
        Err(e) => {
            tracing::warn!(error = %e, conversation_id = %conversation.id, "responder failed, falling back to apology");
            crate::responder::ResponderOutput {
                content: "I'm sorry, I'm having trouble responding right now — a team member will follow up shortly.".to_string(),
                confidence: 0.0,
                intent: None,
                entities: None,
                metadata: serde_json::json!({"error": apology_error_code(&e)}),
            }
        }
    };

    // Step 6: escalation check.
    let recent_messages: Vec<HistoryMessage> = history
        .iter()
        .map(|m| HistoryMessage { content: m.content.clone(), is_inbound: m.direction == MessageDirection::Inbound })
        .collect();
    let guest_is_vip = guest_context
        .guest
        .as_ref()
        .map(|g| g.vip_tier.is_some() || g.loyalty_tier.as_deref().is_some_and(|t| !t.eq_ignore_ascii_case("standard")))
        .unwrap_or(false);
    let reservation_in_house = guest_context.reservation.as_ref().is_some_and(|r| r.status == ReservationStatus::InHouse);

    let escalation_input = EscalationInput {
        recent_messages,
        inbound_content: inbound.content.clone(),
        responder_confidence: responder_output.confidence,
        guest_is_vip,
        reservation_in_house,
    };
    let decision = butler_escalation::decide(&escalation_input, ctx.escalation_config());

    let mut outbound_content = responder_output.content.clone();
    let mut metadata = responder_output.metadata.clone();
    let escalated = decision.escalate;
    if decision.escalate {
        if let Err(e) = repos.conversations.update_state(&conversation.id, ConversationState::Escalated) {
            tracing::warn!(error = %e, conversation_id = %conversation.id, "failed to advance conversation to escalated");
        }
        ctx.events().emit(DomainEvent::new(
            EventType::ConversationEscalated,
            serde_json::json!({
                "conversationId": conversation.id.to_string(),
                "priority": decision.priority.to_string(),
                "reasons": decision.reasons,
            }),
        ));
        outbound_content = acknowledgement(decision.priority).to_string();
        metadata = merge_objects(
            metadata,
            serde_json::json!({
                "escalated": true,
                "priority": decision.priority.to_string(),
                "reasons": decision.reasons,
                "escalationConfidence": decision.confidence,
            }),
        );
    }

    // Step 7: outbound persistence. Fatal on failure.
    let outbound_message = repos
        .messages
        .insert(
            &conversation.id,
            MessageDirection::Outbound,
            SenderType::Ai,
            &outbound_content,
            &inbound.content_type,
            Some(responder_output.confidence),
            metadata.clone(),
        )
        .map_err(ButlerError::from)?;
    ctx.events().emit(DomainEvent::new(
        EventType::MessageSent,
        serde_json::json!({"conversationId": conversation.id.to_string(), "content": outbound_content}),
    ));

    // Step 8: return for delivery by the caller's channel adapter.
    Ok(Outbound {
        conversation_id: conversation.id.to_string(),
        message_id: outbound_message.id.to_string(),
        content: outbound_content,
        content_type: inbound.content_type,
        escalated,
        metadata,
    })
}

fn apology_error_code(e: &ButlerError) -> &'static str {
    match e {
        ButlerError::Transient(_) => "upstream_timeout",
        ButlerError::Upstream(_) => "upstream_error",
        _ => "responder_failed",
    }
}

fn merge_objects(base: serde_json::Value, extra: serde_json::Value) -> serde_json::Value {
    match (base, extra) {
        (serde_json::Value::Object(mut a), serde_json::Value::Object(b)) => {
            a.extend(b);
            serde_json::Value::Object(a)
        }
        (_, extra) => extra,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use butler_escalation::EscalationConfig;
    use butler_events::EventBus;
    use butler_guests::GuestContextService;
    use butler_persistence::Repositories;

    use crate::responder::{EchoResponder, Responder};

    use super::*;

    struct TestContext {
        repos: Arc<Repositories>,
        guest_context: GuestContextService,
        escalation_config: EscalationConfig,
        responder: Box<dyn Responder>,
        events: EventBus,
    }

    impl TestContext {
        fn new(responder: Box<dyn Responder>) -> Self {
            let repos = Arc::new(Repositories::open_in_memory().unwrap());
            Self {
                guest_context: GuestContextService::new(repos.clone()),
                repos,
                escalation_config: EscalationConfig::default(),
                responder,
                events: EventBus::new(),
            }
        }
    }

    impl PipelineContext for TestContext {
        fn repos(&self) -> &Arc<Repositories> {
            &self.repos
        }
        fn guest_context(&self) -> &GuestContextService {
            &self.guest_context
        }
        fn escalation_config(&self) -> &EscalationConfig {
            &self.escalation_config
        }
        fn responder(&self) -> &dyn Responder {
            self.responder.as_ref()
        }
        fn events(&self) -> &EventBus {
            &self.events
        }
    }

    /// Scenario 1 (spec §8): a guest's first short-message contact creates a
    /// guest, a conversation, and an exchange, with no escalation.
    #[tokio::test]
    async fn first_contact_short_message_creates_guest_and_conversation_without_escalating() {
        let ctx = TestContext::new(Box::new(EchoResponder));
        let inbound = Inbound::new(ChannelType::ShortMessage, "+15551234567", "What time is checkout?");

        let outbound = process(&ctx, inbound).await.unwrap();

        assert!(!outbound.escalated);
        assert!(outbound.content.contains("What time is checkout?"));
        let guest = ctx.repos.guests.find_by_phone("+15551234567").unwrap();
        assert!(guest.is_some());
        let conversation = ctx
            .repos
            .conversations
            .find(ChannelType::ShortMessage, "+15551234567")
            .unwrap()
            .unwrap();
        assert_eq!(conversation.state, ConversationState::Active);
    }

    /// Scenario 2 (spec §8): an explicit request for a human escalates at
    /// high priority with the acknowledgement template as the reply.
    #[tokio::test]
    async fn explicit_request_for_a_human_escalates_with_acknowledgement_reply() {
        let ctx = TestContext::new(Box::new(EchoResponder));
        let inbound = Inbound::new(ChannelType::WebChat, "session-abc", "I want to talk to a manager please");

        let outbound = process(&ctx, inbound).await.unwrap();

        assert!(outbound.escalated);
        assert_eq!(outbound.metadata["priority"], "high");
        assert!(outbound.content.contains("looping in a staff member"));
        let conversation = ctx.repos.conversations.find(ChannelType::WebChat, "session-abc").unwrap().unwrap();
        assert_eq!(conversation.state, ConversationState::Escalated);
    }

    /// Scenario 3 (spec §8): repeating a similar request across turns trips
    /// the repetition signal and escalates.
    #[tokio::test]
    async fn repeated_similar_requests_trip_the_repetition_signal() {
        let ctx = TestContext::new(Box::new(EchoResponder));

        let first = Inbound::new(ChannelType::WebChat, "session-rep", "my AC is broken");
        process(&ctx, first).await.unwrap();
        let second = Inbound::new(ChannelType::WebChat, "session-rep", "the AC is still broken");
        process(&ctx, second).await.unwrap();
        let third = Inbound::new(ChannelType::WebChat, "session-rep", "AC still broken please help");

        let outbound = process(&ctx, third).await.unwrap();

        assert!(outbound.escalated);
        assert!(outbound.metadata["reasons"]
            .as_array()
            .unwrap()
            .iter()
            .any(|r| r == "Guest repeating similar request"));
    }

    #[tokio::test]
    async fn empty_content_is_rejected_before_any_persistence() {
        let ctx = TestContext::new(Box::new(EchoResponder));
        let inbound = Inbound::new(ChannelType::WebChat, "session-empty", "   ");

        let err = process(&ctx, inbound).await.unwrap_err();

        assert!(matches!(err, ButlerError::Validation(_)));
    }
}
