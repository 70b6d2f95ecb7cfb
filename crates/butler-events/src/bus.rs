//! In-process event broker (spec §4.5).
//!
//! A plain `tokio::sync::broadcast::Sender` (the shape of the teacher's
//! `EventBroadcaster`) hands every subscriber the same ring buffer and will
//! reorder or drop a slow subscriber's events under backpressure (`Lagged`).
//! That violates "one event at a time per subscriber to preserve per-type
//! ordering", so each subscriber instead gets its own bounded mpsc channel;
//! `emit` fans out by cloning the event into each subscriber's channel.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

use crate::event::DomainEvent;

const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

pub struct Subscription {
    pub id: u64,
    pub receiver: mpsc::Receiver<DomainEvent>,
}

/// Single dispatcher shared (via `Arc`) across every producer: the pipeline,
/// the automation scheduler, the app registry, and the repositories'
/// callers.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: DashMap<u64, mpsc::Sender<DomainEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1), subscribers: DashMap::new() }
    }

    /// Register a new subscriber with its own bounded mailbox.
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    pub fn subscribe_with_buffer(&self, buffer: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, tx);
        Subscription { id, receiver: rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.remove(&id);
    }

    /// Fan out to every subscriber. Non-blocking in the common case: a full
    /// mailbox falls back to an awaited send on a spawned task so delivery
    /// stays at-least-once without stalling the caller or other
    /// subscribers. A subscriber whose receiver was dropped is logged and
    /// removed — one subscriber crashing never blocks the others.
    pub fn emit(&self, event: DomainEvent) {
        let dead: Vec<u64> = Vec::new();
        let dead = self.subscribers.iter().fold(dead, |mut dead, entry| {
            let id = *entry.key();
            match entry.value().try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
                Err(mpsc::error::TrySendError::Full(ev)) => {
                    let tx = entry.value().clone();
                    tokio::spawn(async move {
                        if tx.send(ev).await.is_err() {
                            warn!(subscriber = id, "event dropped, receiver gone after backpressure");
                        }
                    });
                }
            }
            dead
        });
        for id in dead {
            self.subscribers.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;

    #[tokio::test]
    async fn each_subscriber_receives_every_emitted_event_in_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        bus.emit(DomainEvent::new(EventType::GuestCreated, serde_json::json!({"n": 1})));
        bus.emit(DomainEvent::new(EventType::GuestCreated, serde_json::json!({"n": 2})));

        let first = sub.receiver.recv().await.unwrap();
        let second = sub.receiver.recv().await.unwrap();
        assert_eq!(first.payload["n"], 1);
        assert_eq!(second.payload["n"], 2);
    }

    #[tokio::test]
    async fn dropping_a_subscriber_does_not_affect_emit() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        drop(sub.receiver);

        bus.emit(DomainEvent::new(EventType::TaskCreated, serde_json::json!({})));
        // try_send to the now-closed channel reports Closed; emit must not panic
        // and should prune the dead subscriber on the next call.
        bus.emit(DomainEvent::new(EventType::TaskCreated, serde_json::json!({})));
        assert!(bus.subscribers.is_empty());
    }
}
