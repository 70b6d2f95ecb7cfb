//! Rate-limit middleware applied to every route except `/health` (spec §5/§7).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::app::AppState;

pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let client_id = addr.ip().to_string();
    let decision = state.general_limiter.check(&client_id);
    if !decision.allowed {
        let body = serde_json::json!({"code": "RATE_LIMITED", "error": "too many requests"});
        return (
            axum::http::StatusCode::TOO_MANY_REQUESTS,
            [("retry-after", decision.retry_after_secs.to_string())],
            axum::Json(body),
        )
            .into_response();
    }
    next.run(request).await
}
