//! Guest chat socket `/chat` (spec §4.6): anonymous, session id assigned
//! per connection, each `message` frame runs the full inbound pipeline
//! (spec §4.1) between `typing: true`/`typing: false` frames.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use butler_core::config::HEARTBEAT_INTERVAL_SECS;
use butler_persistence::models::ChannelType;
use butler_pipeline::Inbound;

use crate::app::{AppState, GuestSession};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GuestFrame {
    Message {
        content: String,
        #[serde(rename = "contentType", default)]
        content_type: Option<String>,
    },
    Ping,
    Typing,
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let session_id = uuid::Uuid::new_v4().to_string();
    state.guest_sessions.insert(session_id.clone(), GuestSession::default());
    info!(session_id = %session_id, "guest chat socket connected");

    let (mut tx, mut rx) = socket.split();
    let connected = serde_json::json!({"type": "connected", "payload": {"sessionId": session_id}});
    if send(&mut tx, &connected).await.is_err() {
        state.guest_sessions.remove(&session_id);
        return;
    }

    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_text_frame(&state, &session_id, &text, &mut tx).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, error = %e, "guest socket read error");
                        break;
                    }
                    _ => {}
                }
            }

            _ = heartbeat.tick() => {
                if tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.guest_sessions.remove(&session_id);
    info!(session_id = %session_id, "guest chat socket closed");
}

async fn handle_text_frame(
    state: &Arc<AppState>,
    session_id: &str,
    text: &str,
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
) -> Result<(), axum::Error> {
    let frame: GuestFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(_) => {
            return send(tx, &serde_json::json!({"type": "error", "payload": {"message": "malformed frame"}})).await;
        }
    };

    match frame {
        GuestFrame::Ping => send(tx, &serde_json::json!({"type": "pong"})).await,
        GuestFrame::Typing => Ok(()),
        GuestFrame::Message { content, content_type } => {
            send(tx, &serde_json::json!({"type": "typing", "payload": {"typing": true}})).await?;

            let mut inbound = Inbound::new(ChannelType::WebChat, session_id.to_string(), content);
            if let Some(ct) = content_type {
                inbound = inbound.with_content_type(ct);
            }

            let result = butler_pipeline::process(state.as_ref(), inbound).await;

            send(tx, &serde_json::json!({"type": "typing", "payload": {"typing": false}})).await?;

            match result {
                Ok(outbound) => {
                    if let Some(mut entry) = state.guest_sessions.get_mut(session_id) {
                        entry.conversation_id = Some(outbound.conversation_id.clone());
                    }
                    send(
                        tx,
                        &serde_json::json!({
                            "type": "message",
                            "payload": {
                                "content": outbound.content,
                                "contentType": outbound.content_type,
                                "escalated": outbound.escalated,
                            },
                        }),
                    )
                    .await
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "guest pipeline invocation failed");
                    send(tx, &serde_json::json!({"type": "error", "payload": {"message": e.public_message()}})).await
                }
            }
        }
    }
}

async fn send(
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    payload: &serde_json::Value,
) -> Result<(), axum::Error> {
    tx.send(Message::Text(payload.to_string().into())).await
}
