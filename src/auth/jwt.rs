use axum::extract::FromRef;
use base64ct::{Base64, Encoding};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::{rngs::OsRng, RngCore};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::Claims;
use crate::{
    config::{ConfigError, JwtConfig, ACCESS_TTL_MINUTES, REFRESH_TTL_DAYS},
    state::AppState,
};

/// Random bytes behind each refresh token.
pub const REFRESH_TOKEN_BYTES: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("token signing failed")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("token lifetime overflows the clock")]
    LifetimeOverflow,
}

fn ttl(
    key: &'static str,
    value: i64,
    range: std::ops::RangeInclusive<i64>,
    unit_secs: i64,
) -> Result<Duration, ConfigError> {
    value
        .checked_mul(unit_secs)
        .filter(|_| range.contains(&value))
        .map(Duration::seconds)
        .ok_or_else(|| ConfigError::InvalidTtl {
            key,
            value: value.to_string(),
            min: *range.start(),
            max: *range.end(),
        })
}

/// Signing material and lifetimes for access and refresh tokens.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: ttl(
                "JWT_ACCESS_TTL_MINUTES",
                cfg.access_ttl_minutes,
                ACCESS_TTL_MINUTES,
                60,
            )?,
            refresh_ttl: ttl(
                "JWT_REFRESH_TTL_DAYS",
                cfg.refresh_ttl_days,
                REFRESH_TTL_DAYS,
                86_400,
            )?,
        })
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        email: &str,
        display_name: &str,
    ) -> Result<String, TokenError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: user_id,
            email: email.to_owned(),
            name: display_name.to_owned(),
            iat: now.unix_timestamp(),
            exp: now
                .checked_add(self.access_ttl)
                .ok_or(TokenError::LifetimeOverflow)?
                .unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = self.encode(&claims)?;
        debug!(user_id = %user_id, "access token signed");
        Ok(token)
    }

    pub(crate) fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(TokenError::Signing)
    }

    /// Opaque, structureless; validity lives in the user store.
    pub fn issue_refresh_token(&self) -> String {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Base64::encode_string(&bytes)
    }

    pub fn refresh_expiry_from(&self, now: OffsetDateTime) -> Result<OffsetDateTime, TokenError> {
        now.checked_add(self.refresh_ttl).ok_or(TokenError::LifetimeOverflow)
    }

    fn validation(&self, check_exp: bool) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = check_exp;
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation
    }

    fn decode_with(&self, token: &str, check_exp: bool) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation(check_exp))
            .map_err(TokenError::InvalidToken)?;
        // jsonwebtoken only rejects exp < now; a token is dead at its exp second.
        if check_exp && data.claims.exp <= OffsetDateTime::now_utc().unix_timestamp() {
            return Err(TokenError::InvalidToken(ErrorKind::ExpiredSignature.into()));
        }
        debug!(user_id = %data.claims.sub, check_exp, "access token verified");
        Ok(data.claims)
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_with(token, true)
    }

    /// Signature, issuer and audience are still checked.
    pub fn extract_claims_ignoring_expiry(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_with(token, false)
    }
}

#[cfg(test)]
pub(crate) fn test_keys() -> JwtKeys {
    JwtKeys::new(&test_jwt_config("dev-secret", "test-issuer", "test-aud"))
        .expect("test lifetimes are in range")
}

#[cfg(test)]
pub(crate) fn test_jwt_config(secret: &str, issuer: &str, audience: &str) -> JwtConfig {
    JwtConfig {
        secret: secret.into(),
        issuer: issuer.into(),
        audience: audience.into(),
        access_ttl_minutes: 15,
        refresh_ttl_days: 7,
    }
}
