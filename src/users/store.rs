use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{NewUser, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    EmailTaken,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence seam for user records.
///
/// Refresh-token writes come in two flavours: `set_refresh_token` overwrites
/// unconditionally (login), while `rotate_refresh_token` and
/// `clear_refresh_token` only apply when the stored token still equals
/// `current` and has not expired at `now`. Implementations must evaluate that
/// condition and the write as one atomic step.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError>;
    async fn list(&self) -> Result<Vec<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<User>, StoreError>;

    async fn update_name(&self, id: Uuid, name: &str) -> Result<Option<User>, StoreError>;
    async fn update_email(&self, id: Uuid, email: &str) -> Result<Option<User>, StoreError>;
    /// Also ends any refresh session.
    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn set_refresh_token(
        &self,
        id: Uuid,
        token: &str,
        expiry: OffsetDateTime,
    ) -> Result<bool, StoreError>;
    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
        expiry: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError>;
    async fn clear_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError>;
}
