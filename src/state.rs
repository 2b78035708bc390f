use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::auth::{jwt::JwtKeys, password::PasswordHasher};
use crate::config::{AppConfig, ConfigError};
use crate::users::{memory::MemoryUserStore, repo::PgUserStore, store::UserStore};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub hasher: PasswordHasher,
    pub keys: JwtKeys,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let users = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;

                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                info!("using postgres user store");
                Arc::new(PgUserStore::new(db)) as Arc<dyn UserStore>
            }
            None => {
                warn!("DATABASE_URL not set; users live in memory and vanish on restart");
                Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>
            }
        };

        Ok(Self::from_parts(&config, users)?)
    }

    pub fn from_parts(config: &AppConfig, users: Arc<dyn UserStore>) -> Result<Self, ConfigError> {
        Ok(Self {
            users,
            hasher: PasswordHasher::new(config.hash)?,
            keys: JwtKeys::new(&config.jwt)?,
        })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self {
            users: Arc::new(MemoryUserStore::new()),
            hasher: crate::auth::password::test_hasher(),
            keys: crate::auth::jwt::test_keys(),
        }
    }
}
