use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `None` runs the service on the in-memory user store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let db_max_connections = lookup("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        let jwt = JwtConfig {
            secret: lookup("JWT_SECRET")
                .filter(|v| !v.is_empty())
                .context("JWT_SECRET must be set")?,
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "usergate".into()),
            audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| "usergate-users".into()),
            ttl_minutes: lookup("JWT_TTL_MINUTES")
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
        };
        if jwt.ttl_minutes <= 0 {
            anyhow::bail!("JWT_TTL_MINUTES must be positive, got {}", jwt.ttl_minutes);
        }

        Ok(Self {
            database_url,
            db_max_connections,
            jwt,
        })
    }
}
