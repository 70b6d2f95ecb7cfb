//! Stats bridge (spec §4.5, §5): recomputes a small counters snapshot on
//! task/conversation/approval events and broadcasts it, coalescing bursts
//! into one broadcast per topic (trailing edge, 100 ms).
//!
//! The debounce loop is grounded on `astrid-plugins::watcher::PluginWatcher`'s
//! `HashMap<_, Instant>` + `tokio::select!` shape: each relevant event resets
//! that topic's deadline; a `sleep_until` branch fires whichever deadlines
//! have elapsed, so N events within the window collapse into one broadcast.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use butler_persistence::Repositories;

use crate::bus::EventBus;
use crate::event::EventType;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Narrow capability the stats bridge needs from the socket gateway —
/// constructor-injected so `butler-events` never depends on `butler-gateway`
/// (spec.md §9: break cyclic references with constructor injection).
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, topic: &'static str, payload: serde_json::Value);
}

/// No persisted approval-queue table exists (spec.md names an "approval
/// queue" conceptually but does not give it a repository); the bridge
/// tracks its tally purely from bus events for the lifetime of the process.
#[derive(Debug, Default, Clone, Copy)]
struct ApprovalCounts {
    queued: u64,
    decided: u64,
    executed: u64,
}

pub struct StatsBridge {
    repos: Arc<Repositories>,
    broadcaster: Arc<dyn Broadcaster>,
    debounce: Duration,
}

impl StatsBridge {
    pub fn new(repos: Arc<Repositories>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { repos, broadcaster, debounce: DEFAULT_DEBOUNCE }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Runs until the bus subscription closes. Intended to be spawned once
    /// as a background task alongside the scheduler and gateway.
    pub async fn run(self, bus: &EventBus) {
        let mut sub = bus.subscribe();
        let mut pending: HashMap<&'static str, Instant> = HashMap::new();
        let mut approvals = ApprovalCounts::default();

        loop {
            let next_deadline = pending.values().copied().min();

            tokio::select! {
                biased;

                () = async {
                    match next_deadline {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    let now = Instant::now();
                    let ready: Vec<&'static str> = pending
                        .iter()
                        .filter(|(_, deadline)| **deadline <= now)
                        .map(|(topic, _)| *topic)
                        .collect();
                    for topic in ready {
                        pending.remove(topic);
                        self.broadcast_topic(topic, approvals);
                    }
                }

                event = sub.receiver.recv() => {
                    match event {
                        Some(ev) => {
                            match ev.event_type {
                                EventType::ApprovalQueued => approvals.queued += 1,
                                EventType::ApprovalDecided => approvals.decided += 1,
                                EventType::ApprovalExecuted => approvals.executed += 1,
                                _ => {}
                            }
                            if let Some(topic) = ev.event_type.stats_topic() {
                                pending.insert(topic, Instant::now() + self.debounce);
                            }
                        }
                        None => {
                            debug!("event bus dropped, stopping stats bridge");
                            break;
                        }
                    }
                }
            }
        }
    }

    fn broadcast_topic(&self, topic: &'static str, approvals: ApprovalCounts) {
        let snapshot = match topic {
            "stats:tasks" => self.tasks_snapshot(),
            "stats:conversations" => self.conversations_snapshot(),
            "stats:approvals" => Ok(serde_json::json!({
                "queued": approvals.queued,
                "decided": approvals.decided,
                "executed": approvals.executed,
            })),
            _ => return,
        };
        match snapshot {
            Ok(payload) => self.broadcaster.broadcast(topic, payload),
            Err(e) => warn!(topic, error = %e, "failed to recompute stats snapshot"),
        }
    }

    fn tasks_snapshot(&self) -> butler_persistence::Result<serde_json::Value> {
        let counts = self.repos.tasks.status_counts()?;
        let map: serde_json::Map<String, serde_json::Value> =
            counts.into_iter().map(|(s, c)| (s.to_string(), serde_json::json!(c))).collect();
        Ok(serde_json::Value::Object(map))
    }

    fn conversations_snapshot(&self) -> butler_persistence::Result<serde_json::Value> {
        let counts = self.repos.conversations.state_counts()?;
        let map: serde_json::Map<String, serde_json::Value> =
            counts.into_iter().map(|(s, c)| (s.to_string(), serde_json::json!(c))).collect();
        Ok(serde_json::Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DomainEvent;
    use std::sync::Mutex;

    struct RecordingBroadcaster {
        calls: Mutex<Vec<(&'static str, serde_json::Value)>>,
    }

    impl Broadcaster for RecordingBroadcaster {
        fn broadcast(&self, topic: &'static str, payload: serde_json::Value) {
            self.calls.lock().unwrap().push((topic, payload));
        }
    }

    #[tokio::test]
    async fn bursts_within_the_debounce_window_collapse_to_one_broadcast() {
        let repos = Arc::new(Repositories::open_in_memory().unwrap());
        let recorder = Arc::new(RecordingBroadcaster { calls: Mutex::new(Vec::new()) });
        let bridge = StatsBridge::new(repos, recorder.clone()).with_debounce(Duration::from_millis(30));
        let bus = Arc::new(EventBus::new());
        let bus_for_task = bus.clone();

        let handle = tokio::spawn(async move { bridge.run(&bus_for_task).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        for _ in 0..5 {
            bus.emit(DomainEvent::new(EventType::TaskCreated, serde_json::json!({})));
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();
        let _ = handle.await;

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|(topic, _)| *topic == "stats:tasks").count(), 1);
    }

    #[tokio::test]
    async fn approval_events_accumulate_into_the_approvals_snapshot() {
        let repos = Arc::new(Repositories::open_in_memory().unwrap());
        let recorder = Arc::new(RecordingBroadcaster { calls: Mutex::new(Vec::new()) });
        let bridge = StatsBridge::new(repos, recorder.clone()).with_debounce(Duration::from_millis(20));
        let bus = Arc::new(EventBus::new());
        let bus_for_task = bus.clone();

        let handle = tokio::spawn(async move { bridge.run(&bus_for_task).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.emit(DomainEvent::new(EventType::ApprovalQueued, serde_json::json!({})));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();
        let _ = handle.await;

        let calls = recorder.calls.lock().unwrap();
        let approvals_call = calls.iter().find(|(topic, _)| *topic == "stats:approvals");
        assert!(approvals_call.is_some());
        assert_eq!(approvals_call.unwrap().1["queued"], 1);
    }
}
