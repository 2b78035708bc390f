use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{
    dto::{
        ExistsResponse, RegisterRequest, UpdateDetailRequest, UpdateEmailRequest,
        UpdatePasswordRequest, UserResponse, VerifyRequest, VerifyResponse,
    },
    services::UserService,
};
use crate::{auth::extractors::AuthUser, error::AppError, state::AppState};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(register))
        .route("/users/verify", post(verify_credentials))
        .route("/users/:id", get(get_user).delete(delete_user))
        .route("/users/email/:email", get(get_user_by_email))
        .route("/users/exists/:id", get(user_exists))
        .route("/users/profile/detail/:id", put(update_detail))
        .route("/users/profile/email/:id", put(update_email))
        .route("/users/profile/password/:id", put(update_password))
}

/// Profile mutations are only allowed on the caller's own record.
fn ensure_self(caller: Uuid, target: Uuid) -> Result<(), AppError> {
    if caller != target {
        warn!(%caller, %target, "cross-user modification rejected");
        return Err(AppError::Forbidden);
    }
    Ok(())
}

#[instrument(skip(users, payload))]
pub async fn register(
    State(users): State<UserService>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let user = users
        .register(&payload.name, &payload.email, &payload.password)
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(users))]
pub async fn list_users(
    State(users): State<UserService>,
    AuthUser(_caller): AuthUser,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    let all = users.list().await?;
    Ok(Json(all.into_iter().map(UserResponse::from).collect()))
}

#[instrument(skip(users))]
pub async fn get_user(
    State(users): State<UserService>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(users.get(id).await?.into()))
}

#[instrument(skip(users))]
pub async fn get_user_by_email(
    State(users): State<UserService>,
    AuthUser(_caller): AuthUser,
    Path(email): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(users.get_by_email(&email).await?.into()))
}

#[instrument(skip(users))]
pub async fn user_exists(
    State(users): State<UserService>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ExistsResponse>, AppError> {
    Ok(Json(ExistsResponse {
        exists: users.exists(id).await?,
    }))
}

#[instrument(skip(users, payload))]
pub async fn verify_credentials(
    State(users): State<UserService>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    let is_valid = users
        .check_credentials(&payload.email, &payload.password)
        .await?;
    Ok(Json(VerifyResponse { is_valid }))
}

#[instrument(skip(users, payload))]
pub async fn update_detail(
    State(users): State<UserService>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDetailRequest>,
) -> Result<Json<UserResponse>, AppError> {
    ensure_self(caller, id)?;
    Ok(Json(users.update_name(id, &payload.name).await?.into()))
}

#[instrument(skip(users, payload))]
pub async fn update_email(
    State(users): State<UserService>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateEmailRequest>,
) -> Result<Json<UserResponse>, AppError> {
    ensure_self(caller, id)?;
    Ok(Json(users.update_email(id, &payload.email).await?.into()))
}

#[instrument(skip(users, payload))]
pub async fn update_password(
    State(users): State<UserService>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<Json<UserResponse>, AppError> {
    ensure_self(caller, id)?;
    let user = users
        .update_password(id, &payload.old_password, &payload.new_password)
        .await?;
    Ok(Json(user.into()))
}

#[instrument(skip(users))]
pub async fn delete_user(
    State(users): State<UserService>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    ensure_self(caller, id)?;
    users.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
