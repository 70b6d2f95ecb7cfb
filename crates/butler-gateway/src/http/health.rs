//! GET /health — unauthenticated liveness probe, exempt from rate limiting
//! (spec §5/§7: "skip for health probes").

use axum::Json;

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
