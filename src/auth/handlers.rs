use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{LoginRequest, MessageResponse, RefreshRequest, TokenResponse},
    extractors::{bearer_token, AuthUser},
    session::SessionManager,
};
use crate::{
    error::AppError,
    state::AppState,
    users::{
        dto::UserResponse,
        services::{UserError, UserService},
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn token_response(sessions: &SessionManager, pair: super::session::TokenPair) -> TokenResponse {
    TokenResponse::new(pair, sessions.keys().access_ttl().whole_seconds())
}

#[instrument(skip(sessions, payload))]
pub async fn login(
    State(sessions): State<SessionManager>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let pair = sessions.login(&payload.email, &payload.password).await?;
    Ok(Json(token_response(&sessions, pair)))
}

/// An access token in the Authorization header is optional here and may be expired.
#[instrument(skip_all)]
pub async fn refresh(
    State(sessions): State<SessionManager>,
    headers: HeaderMap,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let pair = sessions
        .refresh(&payload.refresh_token, bearer_token(&headers))
        .await?;
    Ok(Json(token_response(&sessions, pair)))
}

#[instrument(skip(sessions, payload))]
pub async fn logout(
    State(sessions): State<SessionManager>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    sessions.logout(user_id, &payload.refresh_token).await?;
    Ok(Json(MessageResponse {
        message: "Logout successful",
    }))
}

#[instrument(skip(users))]
pub async fn get_me(
    State(users): State<UserService>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserResponse>, AppError> {
    match users.get(user_id).await {
        Ok(user) => Ok(Json(user.into())),
        Err(UserError::NotFound) => Err(AppError::Unauthorized("User not found")),
        Err(e) => Err(e.into()),
    }
}
