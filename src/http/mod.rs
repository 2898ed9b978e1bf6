// src/http/mod.rs
// HTTP surface: auth + health, mounted under /api by `main.rs`.

pub mod auth;
pub mod health;

use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use crate::error::ApiError;
use crate::state::AppState;
use crate::utils::RateLimiter;

/// General HTTP rate limit: 60 req/min. `utils::RateLimiter` is a single
/// unkeyed token bucket, so this enforces the 60/min budget process-wide
/// rather than truly per-ip; see DESIGN.md.
async fn rate_limit(req: Request, next: Next) -> Result<Response, ApiError> {
    use once_cell::sync::Lazy;
    static GENERAL: Lazy<RateLimiter> = Lazy::new(|| RateLimiter::new(60).expect("static quota"));

    if !GENERAL.try_acquire() {
        return Err(crate::domain::DomainError::RateLimited.into());
    }
    Ok(next.run(req).await)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/auth", auth::router())
        .route("/health", get(health::health_check))
        .layer(middleware::from_fn(rate_limit))
}
