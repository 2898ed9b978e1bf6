// src/error.rs
// Single boundary adapter from `DomainError` to HTTP responses and to
// `WsServerEvent::Error`. Every handler returns `DomainResult<T>` and lets
// this mapping decide the wire representation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::domain::DomainError;
use crate::ws::events::WsServerEvent;

fn status_and_kind(err: &DomainError) -> (StatusCode, &'static str) {
    match err {
        DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
        DomainError::Authentication => (StatusCode::UNAUTHORIZED, "authentication"),
        DomainError::Authorization(_) => (StatusCode::FORBIDDEN, "authorization"),
        DomainError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        DomainError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        DomainError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        DomainError::UpstreamUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable"),
        DomainError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

/// Wraps `DomainError` so it can be returned directly from an axum handler.
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = status_and_kind(&self.0);
        (status, Json(json!({ "error": self.0.to_string(), "kind": kind }))).into_response()
    }
}

/// The realtime counterpart: every `DomainError` reaching a WS handler
/// becomes an `error` event back to the originating connection instead of
/// closing it.
pub fn to_ws_event(err: &DomainError) -> WsServerEvent {
    let (_, kind) = status_and_kind(err);
    WsServerEvent::Error { message: err.to_string(), kind: Some(kind.to_string()) }
}
