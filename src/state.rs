use std::{sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::AppConfig;
use crate::users::repo::{MemoryUserRepo, PgUserRepo, UserRepo};

/// Opens the pool and applies pending migrations. Either failure stops startup.
async fn connect_postgres(url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let db = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await
        .context("connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("run migrations")?;
    tracing::info!("migrations applied");
    Ok(db)
}

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepo>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let users = match &config.database_url {
            Some(url) => {
                let db = connect_postgres(url, config.db_max_connections).await?;
                Arc::new(PgUserRepo::new(db)) as Arc<dyn UserRepo>
            }
            None => {
                tracing::warn!("DATABASE_URL not set; users are kept in memory only");
                Arc::new(MemoryUserRepo::new()) as Arc<dyn UserRepo>
            }
        };

        Ok(Self::from_parts(users, config))
    }

    pub fn from_parts(users: Arc<dyn UserRepo>, config: Arc<AppConfig>) -> Self {
        Self { users, config }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        let config = AppConfig {
            database_url: None,
            db_max_connections: 1,
            jwt: crate::config::JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
        };
        Self::from_parts(Arc::new(MemoryUserRepo::new()), Arc::new(config))
    }
}
