use std::ops::RangeInclusive;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid password hashing parameters: {0}")]
    InvalidHashParams(String),
    #[error("{key} must be a whole number in {min}..={max}, got {value:?}")]
    InvalidTtl {
        key: &'static str,
        value: String,
        min: i64,
        max: i64,
    },
}

pub const ACCESS_TTL_MINUTES: RangeInclusive<i64> = 1..=1440;
pub const REFRESH_TTL_DAYS: RangeInclusive<i64> = 1..=365;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

/// Argon2id cost parameters. Fixed for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 4,
            parallelism: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` runs the service against the in-memory user store.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub hash: HashConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let jwt = JwtConfig {
            secret,
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "facenotebook_app".into()),
            audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| "earth_ten".into()),
            access_ttl_minutes: parse_ttl(&lookup, "JWT_ACCESS_TTL_MINUTES", 15, ACCESS_TTL_MINUTES)?,
            refresh_ttl_days: parse_ttl(&lookup, "JWT_REFRESH_TTL_DAYS", 7, REFRESH_TTL_DAYS)?,
        };

        let defaults = HashConfig::default();
        let hash = HashConfig {
            memory_kib: parse_or(&lookup, "HASH_MEMORY_KIB", defaults.memory_kib),
            iterations: parse_or(&lookup, "HASH_ITERATIONS", defaults.iterations),
            parallelism: parse_or(&lookup, "HASH_PARALLELISM", defaults.parallelism),
        };

        let database_url = lookup("DATABASE_URL").filter(|s| !s.is_empty());

        Ok(Self {
            database_url,
            jwt,
            hash,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Unset falls back to `default`; set but unparsable or out of range is fatal.
fn parse_ttl<F>(
    lookup: &F,
    key: &'static str,
    default: i64,
    range: RangeInclusive<i64>,
) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<i64>() {
        Ok(v) if range.contains(&v) => Ok(v),
        _ => Err(ConfigError::InvalidTtl {
            key,
            value: raw,
            min: *range.start(),
            max: *range.end(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_secret_is_fatal() {
        let err = AppConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));

        let err = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn defaults_apply() {
        let cfg = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(cfg.jwt.issuer, "facenotebook_app");
        assert_eq!(cfg.jwt.audience, "earth_ten");
        assert_eq!(cfg.jwt.access_ttl_minutes, 15);
        assert_eq!(cfg.jwt.refresh_ttl_days, 7);
        assert_eq!(cfg.hash, HashConfig::default());
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn overrides_and_bad_numbers() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("JWT_ISSUER", "iss"),
            ("JWT_ACCESS_TTL_MINUTES", "30"),
            ("HASH_MEMORY_KIB", "lots"),
            ("HASH_ITERATIONS", "2"),
            ("DATABASE_URL", "postgres://localhost/fnb"),
        ]))
        .unwrap();
        assert_eq!(cfg.jwt.issuer, "iss");
        assert_eq!(cfg.jwt.access_ttl_minutes, 30);
        assert_eq!(cfg.jwt.refresh_ttl_days, 7);
        assert_eq!(cfg.hash.memory_kib, HashConfig::default().memory_kib);
        assert_eq!(cfg.hash.iterations, 2);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/fnb"));
    }

    #[test]
    fn token_lifetimes_are_range_checked() {
        for (key, value) in [
            ("JWT_ACCESS_TTL_MINUTES", "-5"),
            ("JWT_ACCESS_TTL_MINUTES", "0"),
            ("JWT_ACCESS_TTL_MINUTES", "1441"),
            ("JWT_ACCESS_TTL_MINUTES", "9223372036854775807"),
            ("JWT_ACCESS_TTL_MINUTES", "99999999999999999999"),
            ("JWT_REFRESH_TTL_DAYS", "-1"),
            ("JWT_REFRESH_TTL_DAYS", "0"),
            ("JWT_REFRESH_TTL_DAYS", "100000000"),
            ("JWT_REFRESH_TTL_DAYS", "soon"),
        ] {
            let err = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "s3cret"), (key, value)]))
                .unwrap_err();
            match err {
                ConfigError::InvalidTtl { key: k, value: v, .. } => {
                    assert_eq!(k, key);
                    assert_eq!(v, value);
                }
                other => panic!("{key}={value}: unexpected {other:?}"),
            }
        }

        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("JWT_ACCESS_TTL_MINUTES", "1440"),
            ("JWT_REFRESH_TTL_DAYS", "1"),
        ]))
        .unwrap();
        assert_eq!(cfg.jwt.access_ttl_minutes, 1440);
        assert_eq!(cfg.jwt.refresh_ttl_days, 1);
    }
}
