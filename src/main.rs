// src/main.rs
// Process bootstrap: load config, connect storage, build the router, serve.
// CORS layer, `TcpListener::bind` + `axum::serve`, with a multi-service
// `AppState` and the `/ws` realtime upgrade route.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use realtime_chat_core::config::Config;
use realtime_chat_core::state::AppState;
use realtime_chat_core::{http, ws};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let config = match Config::try_from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "missing or invalid required configuration, exiting");
            return ExitCode::FAILURE;
        }
    };

    info!("starting realtime chat core");

    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "bootstrap failed, exiting");
            return ExitCode::FAILURE;
        }
    };

    let addr: SocketAddr = match state.config.server.bind_address().parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "invalid bind address");
            return ExitCode::FAILURE;
        }
    };

    let app = build_router(state.clone());

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, %addr, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    info!(%addr, "listening");

    if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await {
        error!(error = %e, "server terminated unexpectedly");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Wires the realtime upgrade route alongside the HTTP slice (`/api/auth/*`,
/// `/api/health`) behind a single CORS layer scoped to `FRONTEND_URL`.
fn build_router(state: Arc<AppState>) -> Router {
    let origin = state
        .config
        .server
        .frontend_url
        .parse::<axum::http::HeaderValue>()
        .map(AllowOrigin::exact)
        .unwrap_or_else(|_| AllowOrigin::any());

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new().route("/ws", get(ws::upgrade)).nest("/api", http::router()).layer(cors).with_state(state)
}
