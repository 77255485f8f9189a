//! Authentication request handlers.

use axum::extract::State;
use axum::{Extension, Json};
use taskline_core::models::auth::Principal;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedPrincipal;
use crate::models::{
    AuthResponse, LoginRequest, LogoutRequest, LogoutResponse, RefreshRequest, RegisterRequest,
    TokenResponse,
};
use crate::services::auth;

/// `POST /auth/login` — authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let resp = auth::login(&state, &body.email, &body.password).await?;
    Ok(Json(resp))
}

/// `POST /auth/register` — create a new account.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    let resp = auth::register(&state, &body.email, &body.password, body.name.as_deref()).await?;
    Ok(Json(resp))
}

/// `POST /auth/refresh` — exchange a refresh token for a new access token.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let resp = auth::refresh(&state, &body.refresh_token).await?;
    Ok(Json(resp))
}

/// `POST /auth/logout` — revoke a refresh token.
pub async fn logout_handler(
    State(state): State<AppState>,
    Json(body): Json<LogoutRequest>,
) -> Json<LogoutResponse> {
    Json(auth::logout(&state, body.refresh_token.as_deref()))
}

/// `GET /auth/me`
pub async fn me_handler(
    Extension(AuthenticatedPrincipal(principal)): Extension<AuthenticatedPrincipal>,
) -> Json<Principal> {
    Json(principal)
}
