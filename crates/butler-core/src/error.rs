use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Unified error type surfaced at every HTTP/socket boundary.
///
/// Variant names are the error *kinds*, not implementation detail — callers
/// match on the kind, not on which subsystem produced it.
#[derive(Debug, Error)]
pub enum ButlerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream call failed: {0}")]
    Upstream(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Fatal(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ButlerError>;

impl ButlerError {
    /// Stable machine-readable code, included in error frames and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::Upstream(_) => "UPSTREAM",
            Self::Transient(_) => "TRANSIENT",
            Self::Fatal(_) => "FATAL",
            Self::Database(_) => "FATAL",
            Self::Serialization(_) => "VALIDATION",
        }
    }

    /// HTTP status mapping per the error-handling design: everything not
    /// explicitly named maps to 500 with a non-revealing message.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Serialization(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) | Self::Transient(_) | Self::Fatal(_) | Self::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show a caller — never echoes internal detail for the
    /// catch-all kinds.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(m) => m.clone(),
            Self::NotFound(m) => m.clone(),
            Self::Unauthorized => "unauthorized".to_string(),
            Self::Forbidden(m) => m.clone(),
            Self::Conflict(m) => m.clone(),
            _ => "internal error".to_string(),
        }
    }
}

impl IntoResponse for ButlerError {
    /// Translates a kind to an HTTP status and a `{code, error}` JSON body
    /// (spec §7: "Webhook routes translate these into HTTP status... never
    /// echo internal details").
    fn into_response(self) -> Response {
        if matches!(self, Self::Database(_) | Self::Fatal(_)) {
            tracing::error!(error = %self, "internal error");
        }
        let status = self.status();
        let body = serde_json::json!({"code": self.code(), "error": self.public_message()});
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_kinds_never_leak_detail() {
        let err = ButlerError::Fatal("stack trace goes here".to_string());
        assert_eq!(err.public_message(), "internal error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn validation_message_is_shown() {
        let err = ButlerError::Validation("content must not be empty".to_string());
        assert_eq!(err.public_message(), "content must not be empty");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
