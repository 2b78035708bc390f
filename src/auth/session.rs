use std::sync::Arc;

use axum::extract::FromRef;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    jwt::{JwtKeys, TokenError},
    password::PasswordHasher,
};
use crate::{
    state::AppState,
    users::{
        repo_types::User,
        services::normalize_email,
        store::{StoreError, UserStore},
    },
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Access/refresh pair handed back on login and refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_expires_at: OffsetDateTime,
}

/// Login, refresh-token rotation and logout over the user store.
#[derive(Clone)]
pub struct SessionManager {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    keys: JwtKeys,
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.users.clone(), state.hasher.clone(), state.keys.clone())
    }
}

impl SessionManager {
    pub fn new(users: Arc<dyn UserStore>, hasher: PasswordHasher, keys: JwtKeys) -> Self {
        Self {
            users,
            hasher,
            keys,
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    fn issue_pair(&self, user: &User, now: OffsetDateTime) -> Result<TokenPair, SessionError> {
        Ok(TokenPair {
            access_token: self.keys.issue_access_token(user.id, &user.email, &user.name)?,
            refresh_token: self.keys.issue_refresh_token(),
            refresh_expires_at: self.keys.refresh_expiry_from(now)?,
        })
    }

    /// Unknown email and wrong password fail identically, after one KDF run each.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, SessionError> {
        let email = normalize_email(email);

        let Some(user) = self.users.find_by_email(&email).await? else {
            self.hasher.verify_against_dummy(password.to_owned()).await;
            warn!(email = %email, "login unknown email");
            return Err(SessionError::InvalidCredentials);
        };

        if !self
            .hasher
            .verify_async(password.to_owned(), user.password_hash.clone())
            .await
        {
            warn!(user_id = %user.id, "login invalid password");
            return Err(SessionError::InvalidCredentials);
        }

        let pair = self.issue_pair(&user, OffsetDateTime::now_utc())?;
        if !self
            .users
            .set_refresh_token(user.id, &pair.refresh_token, pair.refresh_expires_at)
            .await?
        {
            // deleted between lookup and write
            return Err(SessionError::InvalidCredentials);
        }

        info!(user_id = %user.id, "user logged in");
        Ok(pair)
    }

    /// Rotates the presented refresh token. When `expired_access` is given its
    /// subject must own the refresh token; its own expiry is not checked.
    #[instrument(skip_all)]
    pub async fn refresh(
        &self,
        presented: &str,
        expired_access: Option<&str>,
    ) -> Result<TokenPair, SessionError> {
        let now = OffsetDateTime::now_utc();

        let Some(user) = self.users.find_by_refresh_token(presented).await? else {
            warn!("refresh with unknown token");
            return Err(SessionError::InvalidOrExpiredToken);
        };
        if !user.has_active_session(now) {
            info!(user_id = %user.id, "refresh token expired");
            return Err(SessionError::InvalidOrExpiredToken);
        }

        if let Some(access) = expired_access {
            let claims = self
                .keys
                .extract_claims_ignoring_expiry(access)
                .map_err(|_| SessionError::InvalidOrExpiredToken)?;
            if claims.sub != user.id {
                warn!(user_id = %user.id, subject = %claims.sub, "refresh token presented by another user");
                return Err(SessionError::InvalidOrExpiredToken);
            }
        }

        let pair = self.issue_pair(&user, now)?;
        let rotated = self
            .users
            .rotate_refresh_token(
                user.id,
                presented,
                &pair.refresh_token,
                pair.refresh_expires_at,
                now,
            )
            .await?;
        if !rotated {
            warn!(user_id = %user.id, "refresh token already rotated");
            return Err(SessionError::InvalidOrExpiredToken);
        }

        info!(user_id = %user.id, "refresh token rotated");
        Ok(pair)
    }

    /// `subject_id` must come from a validated access token.
    #[instrument(skip(self, presented))]
    pub async fn logout(&self, subject_id: Uuid, presented: &str) -> Result<(), SessionError> {
        let cleared = self
            .users
            .clear_refresh_token(subject_id, presented, OffsetDateTime::now_utc())
            .await?;
        if !cleared {
            warn!(user_id = %subject_id, "logout without a matching session");
            return Err(SessionError::InvalidOrExpiredToken);
        }
        info!(user_id = %subject_id, "user logged out");
        Ok(())
    }
}
