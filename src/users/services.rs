use std::sync::Arc;

use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::repo_types::{NewUser, User};
use super::store::{StoreError, UserStore};
use crate::{
    auth::password::{HashError, PasswordHasher},
    state::AppState,
};

const MAX_NAME_LEN: usize = 50;
const MAX_EMAIL_LEN: usize = 50;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 150;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("{0}")]
    Validation(String),
    #[error("email already registered")]
    EmailTaken,
    #[error("user not found")]
    NotFound,
    #[error("old password is incorrect")]
    IncorrectPassword,
    #[error("new password cannot be the same as the old password")]
    PasswordReused,
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl From<StoreError> for UserError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::EmailTaken => UserError::EmailTaken,
            other => UserError::Store(other),
        }
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= MAX_EMAIL_LEN && EMAIL_RE.is_match(email)
}

fn validate_name(name: &str) -> Result<String, UserError> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(UserError::Validation(format!(
            "Name must be between 1 and {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_owned())
}

fn validate_email(email: &str) -> Result<String, UserError> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(UserError::Validation("Invalid email".into()));
    }
    Ok(email)
}

/// At least 8 ASCII letters or digits, with an uppercase, a lowercase and a digit.
pub(crate) fn validate_password_policy(password: &str) -> Result<(), UserError> {
    let ok = password.len() >= MIN_PASSWORD_LEN
        && password.len() <= MAX_PASSWORD_LEN
        && password.chars().all(|c| c.is_ascii_alphanumeric())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(UserError::Validation(
            "Password must be at least 8 characters long and include at least one uppercase \
             letter, one lowercase letter, and one number."
                .into(),
        ))
    }
}

/// Registration and profile management over the user store.
#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
}

impl FromRef<AppState> for UserService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.users.clone(), state.hasher.clone())
    }
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>, hasher: PasswordHasher) -> Self {
        Self { users, hasher }
    }

    #[instrument(skip(self, password))]
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User, UserError> {
        let name = validate_name(name)?;
        let email = validate_email(email)?;
        validate_password_policy(password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(UserError::EmailTaken);
        }

        let password_hash = self.hasher.hash_async(password.to_owned()).await?;
        let user = self
            .users
            .create(NewUser {
                name,
                email,
                password_hash,
            })
            .await?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    pub async fn list(&self) -> Result<Vec<User>, UserError> {
        Ok(self.users.list().await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<User, UserError> {
        self.users.find_by_id(id).await?.ok_or(UserError::NotFound)
    }

    pub async fn get_by_email(&self, email: &str) -> Result<User, UserError> {
        self.users
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or(UserError::NotFound)
    }

    pub async fn exists(&self, id: Uuid) -> Result<bool, UserError> {
        Ok(self.users.find_by_id(id).await?.is_some())
    }

    #[instrument(skip(self))]
    pub async fn update_name(&self, id: Uuid, name: &str) -> Result<User, UserError> {
        let name = validate_name(name)?;
        let user = self.users.update_name(id, &name).await?.ok_or(UserError::NotFound)?;
        info!(user_id = %id, "name updated");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn update_email(&self, id: Uuid, email: &str) -> Result<User, UserError> {
        let email = validate_email(email)?;
        let user = self.users.update_email(id, &email).await?.ok_or(UserError::NotFound)?;
        info!(user_id = %id, "email updated");
        Ok(user)
    }

    /// Ends the user's refresh session on success.
    #[instrument(skip(self, old_password, new_password))]
    pub async fn update_password(
        &self,
        id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<User, UserError> {
        let user = self.get(id).await?;
        validate_password_policy(new_password)?;

        if !self
            .hasher
            .verify_async(old_password.to_owned(), user.password_hash.clone())
            .await
        {
            warn!(user_id = %id, "password change with wrong old password");
            return Err(UserError::IncorrectPassword);
        }
        if self
            .hasher
            .verify_async(new_password.to_owned(), user.password_hash)
            .await
        {
            return Err(UserError::PasswordReused);
        }

        let password_hash = self.hasher.hash_async(new_password.to_owned()).await?;
        let user = self
            .users
            .update_password(id, &password_hash)
            .await?
            .ok_or(UserError::NotFound)?;
        info!(user_id = %id, "password updated");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), UserError> {
        if !self.users.delete(id).await? {
            return Err(UserError::NotFound);
        }
        info!(user_id = %id, "user deleted");
        Ok(())
    }

    /// Unknown emails read as a mismatch and cost the same KDF time.
    #[instrument(skip(self, password))]
    pub async fn check_credentials(&self, email: &str, password: &str) -> Result<bool, UserError> {
        match self.users.find_by_email(&normalize_email(email)).await? {
            Some(user) => Ok(self
                .hasher
                .verify_async(password.to_owned(), user.password_hash)
                .await),
            None => Ok(self.hasher.verify_against_dummy(password.to_owned()).await),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_service(users: Arc<dyn UserStore>) -> UserService {
    UserService::new(users, crate::auth::password::test_hasher())
}
