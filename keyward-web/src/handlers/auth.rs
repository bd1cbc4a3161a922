//! Login and logout

use super::types::{LoginRequest, LoginResponse, MessageResponse};
use crate::{context::Authenticated, error::ApiError, state::AppState};
use axum::{extract::State, Json};
use keyward_auth::User;

/// `POST /auth/login`
pub async fn login<U: User>(
    State(state): State<AppState<U>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if payload.login_id.trim().is_empty() {
        return Err(ApiError::validation("login_id is required", "login_id"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("password is required", "password"));
    }

    let (_, token) = state.auth.login(&payload.login_id, &payload.password).await?;
    Ok(Json(LoginResponse { token }))
}

/// `POST /auth/logout`
pub async fn logout<U: User>(
    State(state): State<AppState<U>>,
    Authenticated(ctx): Authenticated<U>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.auth.logout(&ctx.user).await?;
    Ok(Json(MessageResponse::new("logout successful")))
}
