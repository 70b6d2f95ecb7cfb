//! Narrow capability interface the pipeline needs from its host (spec §9:
//! "break cyclic references with constructor injection"), mirroring
//! `skynet_agent::pipeline::context::MessageContext` — defined here so
//! every channel host (gateway sockets, webhooks) can implement it without
//! this crate depending on any of them.

use std::sync::Arc;

use butler_escalation::EscalationConfig;
use butler_events::EventBus;
use butler_guests::GuestContextService;
use butler_persistence::Repositories;

use crate::responder::Responder;

pub trait PipelineContext: Send + Sync {
    fn repos(&self) -> &Arc<Repositories>;
    fn guest_context(&self) -> &GuestContextService;
    fn escalation_config(&self) -> &EscalationConfig;
    fn responder(&self) -> &dyn Responder;
    fn events(&self) -> &EventBus;
}
