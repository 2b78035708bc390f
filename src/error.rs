use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::{auth::session::SessionError, users::services::UserError};

/// Error returned by every handler. Internal details are logged, never sent.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("forbidden")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.to_string()),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "Not allowed to modify another user".to_string(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(e) => {
                error!(error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred.".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidCredentials => AppError::Unauthorized("Invalid email or password"),
            SessionError::InvalidOrExpiredToken => {
                AppError::Unauthorized("Invalid or expired token")
            }
            other => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<UserError> for AppError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::Validation(msg) => AppError::BadRequest(msg),
            UserError::EmailTaken => AppError::Conflict("Email already exists".into()),
            UserError::NotFound => AppError::NotFound("User not found".into()),
            UserError::IncorrectPassword => AppError::Unauthorized("Old password is incorrect"),
            UserError::PasswordReused => AppError::Conflict(
                "New password cannot be the same as the old password".into(),
            ),
            other => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_failures_are_unauthorized() {
        for e in [SessionError::InvalidCredentials, SessionError::InvalidOrExpiredToken] {
            let res = AppError::from(e).into_response();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn user_errors_map_to_status() {
        let cases = [
            (UserError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (UserError::EmailTaken, StatusCode::CONFLICT),
            (UserError::NotFound, StatusCode::NOT_FOUND),
            (UserError::IncorrectPassword, StatusCode::UNAUTHORIZED),
            (UserError::PasswordReused, StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn internal_errors_hide_details() {
        let res = AppError::Internal(anyhow::anyhow!("db password is hunter2")).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
