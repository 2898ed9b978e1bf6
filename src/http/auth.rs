// src/http/auth.rs
// `/api/auth/{signup,login,refresh,logout,me}`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthTokens;
use crate::domain::{DomainError, User};
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", axum::routing::get(me))
}

#[derive(Debug, Deserialize)]
struct SignupRequest {
    email: String,
    display_name: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    user: User,
    #[serde(flatten)]
    tokens: AuthTokens,
}

fn bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
        .ok_or_else(|| DomainError::Authentication.into())
}

async fn signup(State(state): State<Arc<AppState>>, Json(req): Json<SignupRequest>) -> Result<Json<AuthResponse>, ApiError> {
    let (user, tokens) = state.auth_service.signup(&req.email, &req.display_name, &req.password).await?;
    Ok(Json(AuthResponse { user, tokens }))
}

async fn login(State(state): State<Arc<AppState>>, Json(req): Json<LoginRequest>) -> Result<Json<AuthResponse>, ApiError> {
    let (user, tokens) = state.auth_service.login(&req.email, &req.password).await?;
    Ok(Json(AuthResponse { user, tokens }))
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    user_id: String,
    refresh_token: String,
}

async fn refresh(State(state): State<Arc<AppState>>, Json(req): Json<RefreshRequest>) -> Result<Json<AuthTokens>, ApiError> {
    let tokens = state.auth_service.refresh(&req.user_id, &req.refresh_token).await?;
    Ok(Json(tokens))
}

async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers)?;
    let user_id = state.auth_service.verify_access_token(&token)?;
    state.auth_service.logout(&user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)?;
    let user_id = state.auth_service.verify_access_token(&token)?;
    let user = state.auth_service.me(&user_id).await?;
    Ok(Json(user))
}
