//! Central shared state and router assembly, grounded on
//! `skynet_gateway::app::AppState`: one struct behind `Arc`, passed as Axum
//! state, implementing `butler_pipeline::PipelineContext` so the pipeline
//! never depends on this crate.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use dashmap::DashMap;
use tokio::sync::mpsc;

use butler_core::config::ButlerConfig;
use butler_escalation::EscalationConfig;
use butler_events::EventBus;
use butler_guests::GuestContextService;
use butler_persistence::Repositories;
use butler_pipeline::{EchoResponder, PipelineContext, Responder, ResponderOutput};
use butler_registry::{register_builtins, AdapterRegistry};

use crate::rate_limit::RateLimiter;

/// Bridges the registry's hot-swappable active AI provider into the
/// pipeline's `Responder` seam: looked up fresh on every call so a
/// config-apply takes effect on the very next turn, falling back to the
/// deterministic echo when no provider is configured (spec §4.1/§4.4).
struct RegistryResponder {
    registry: Arc<AdapterRegistry>,
}

#[async_trait::async_trait]
impl Responder for RegistryResponder {
    async fn generate(
        &self,
        conversation: &butler_persistence::models::Conversation,
        inbound_content: &str,
        guest_context: Option<&butler_guests::GuestContext>,
    ) -> butler_core::error::Result<ResponderOutput> {
        match self.registry.active_ai() {
            Some(provider) => {
                butler_pipeline::LlmResponder::new(provider)
                    .generate(conversation, inbound_content, guest_context)
                    .await
            }
            None => EchoResponder.generate(conversation, inbound_content, guest_context).await,
        }
    }
}

/// One staff connection's outbound mailbox plus the identity attached at
/// upgrade, if any (unauthenticated sockets receive only the welcome frame).
pub struct StaffConnection {
    pub sender: mpsc::Sender<String>,
    pub user_id: Option<String>,
}

/// A guest chat socket's server-side session state (spec §4.6: "stores the
/// resolved conversation id on the session").
#[derive(Default)]
pub struct GuestSession {
    pub conversation_id: Option<String>,
}

pub struct AppState {
    pub config: ButlerConfig,
    pub repos: Arc<Repositories>,
    pub guest_context: GuestContextService,
    pub escalation_config: EscalationConfig,
    pub registry: Arc<AdapterRegistry>,
    pub responder: Box<dyn Responder>,
    pub events: Arc<EventBus>,
    pub auth_limiter: RateLimiter,
    pub general_limiter: RateLimiter,
    /// Staff `/ws` connections keyed by connection id.
    pub staff_connections: DashMap<String, StaffConnection>,
    /// Session state for the anonymous guest chat socket, keyed by session id.
    pub guest_sessions: DashMap<String, GuestSession>,
}

impl AppState {
    pub fn new(config: ButlerConfig, repos: Arc<Repositories>) -> Self {
        let registry = Arc::new(AdapterRegistry::new(repos.clone()));
        register_builtins(&registry);
        Self {
            guest_context: GuestContextService::new(repos.clone()),
            escalation_config: EscalationConfig::default(),
            responder: Box::new(RegistryResponder { registry: registry.clone() }),
            registry,
            repos,
            config,
            events: Arc::new(EventBus::new()),
            auth_limiter: RateLimiter::auth(),
            general_limiter: RateLimiter::general(),
            staff_connections: DashMap::new(),
            guest_sessions: DashMap::new(),
        }
    }

    /// Write to every authenticated staff socket (spec §4.6: `Broadcast`).
    pub fn broadcast_to_staff(&self, frame: &str) {
        let dead: Vec<String> = self
            .staff_connections
            .iter()
            .filter(|e| e.value().user_id.is_some())
            .filter_map(|e| match e.value().sender.try_send(frame.to_string()) {
                Ok(()) => None,
                Err(_) => Some(e.key().clone()),
            })
            .collect();
        for id in dead {
            self.staff_connections.remove(&id);
        }
    }

    /// Write to one user's connections only (spec §4.6: `SendToUser`).
    pub fn send_to_user(&self, user_id: &str, frame: &str) {
        for entry in self.staff_connections.iter() {
            if entry.value().user_id.as_deref() == Some(user_id) {
                let _ = entry.value().sender.try_send(frame.to_string());
            }
        }
    }
}

impl PipelineContext for AppState {
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

impl butler_events::Broadcaster for AppState {
    fn broadcast(&self, topic: &'static str, payload: serde_json::Value) {
        let frame = serde_json::json!({"type": topic, "payload": payload}).to_string();
        self.broadcast_to_staff(&frame);
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let limited = Router::new()
        .route("/ws", get(crate::ws::staff::ws_handler))
        .route("/chat", get(crate::ws::guest::ws_handler))
        .route("/webhooks/sms/inbound", post(crate::http::webhooks::sms::inbound_handler))
        .route("/webhooks/sms/status", post(crate::http::webhooks::sms::status_handler))
        .route(
            "/webhooks/im/:app_id",
            get(crate::http::webhooks::im::verify_handler).post(crate::http::webhooks::im::inbound_handler),
        )
        .layer(axum::middleware::from_fn_with_state(state.clone(), crate::middleware::rate_limit));

    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .merge(limited)
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
