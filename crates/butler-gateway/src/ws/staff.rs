//! Staff socket `/ws` (spec §4.6), grounded on
//! `skynet_gateway::ws::connection::handle_connection`'s `tokio::select!`
//! shape: one task per connection, reads/heartbeat/outbound-broadcast all
//! selected over in one loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use butler_core::config::HEARTBEAT_INTERVAL_SECS;

use crate::app::{AppState, StaffConnection};
use crate::auth::Identity;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let token = params.get("token").cloned();
    ws.on_upgrade(move |socket| handle_connection(socket, state, token))
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    frame_type: String,
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>, token: Option<String>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let identity = token.and_then(|t| crate::auth::verify(&t, &state.config.jwt.secret).ok());
    info!(conn_id = %conn_id, authenticated = identity.is_some(), "staff socket connected");

    let (mut tx, mut rx_sock) = socket.split();
    let (frame_tx, mut frame_rx) = tokio::sync::mpsc::channel::<String>(64);
    state.staff_connections.insert(
        conn_id.clone(),
        StaffConnection { sender: frame_tx, user_id: identity.as_ref().map(|i: &Identity| i.user_id.clone()) },
    );

    let connected = serde_json::json!({
        "type": "connected",
        "payload": {"authenticated": identity.is_some(), "timestamp": chrono::Utc::now().to_rfc3339()},
    });
    if send(&mut tx, &connected).await.is_err() {
        state.staff_connections.remove(&conn_id);
        return;
    }

    if identity.is_some() {
        for (topic, payload) in initial_snapshots(&state) {
            let frame = serde_json::json!({"type": topic, "payload": payload});
            if send(&mut tx, &frame).await.is_err() {
                state.staff_connections.remove(&conn_id);
                return;
            }
        }
    }

    let mut alive = true;
    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = rx_sock.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_text_frame(&text, &mut tx).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        alive = true;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(conn_id = %conn_id, error = %e, "staff socket read error");
                        break;
                    }
                    _ => {}
                }
            }

            frame = frame_rx.recv() => {
                match frame {
                    Some(payload) => {
                        if tx.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = heartbeat.tick() => {
                if !alive {
                    warn!(conn_id = %conn_id, "missed heartbeat, closing staff socket");
                    break;
                }
                alive = false;
                if tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.staff_connections.remove(&conn_id);
    info!(conn_id = %conn_id, "staff socket closed");
}

async fn handle_text_frame(
    text: &str,
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
) -> bool {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(_) => {
            let _ = send(tx, &serde_json::json!({"type": "error", "payload": {"message": "malformed frame"}})).await;
            return true;
        }
    };
    let reply = match frame.frame_type.as_str() {
        "ping" => serde_json::json!({"type": "pong"}),
        "subscribe" => serde_json::json!({"type": "subscribed"}),
        other => serde_json::json!({"type": "error", "payload": {"message": format!("unknown frame type '{other}'")}}),
    };
    send(tx, &reply).await.is_ok()
}

async fn send(
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    payload: &serde_json::Value,
) -> Result<(), axum::Error> {
    tx.send(Message::Text(payload.to_string().into())).await
}

fn initial_snapshots(state: &AppState) -> Vec<(&'static str, serde_json::Value)> {
    let mut snapshots = Vec::new();
    if let Ok(counts) = state.repos.tasks.status_counts() {
        let map: serde_json::Map<String, serde_json::Value> =
            counts.into_iter().map(|(s, c)| (s.to_string(), serde_json::json!(c))).collect();
        snapshots.push(("stats:tasks", serde_json::Value::Object(map)));
    }
    if let Ok(counts) = state.repos.conversations.state_counts() {
        let map: serde_json::Map<String, serde_json::Value> =
            counts.into_iter().map(|(s, c)| (s.to_string(), serde_json::json!(c))).collect();
        snapshots.push(("stats:conversations", serde_json::Value::Object(map)));
    }
    snapshots.push(("stats:approvals", serde_json::json!({"queued": 0, "decided": 0, "executed": 0})));
    snapshots
}
