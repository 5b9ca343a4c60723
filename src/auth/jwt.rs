use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{auth::claims::Claims, config::JwtConfig, state::AppState};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Issues and checks HS256 identity tokens. Holds no per-request state.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::minutes(cfg.ttl_minutes),
        }
    }

    pub fn issue(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    pub fn issue_at(&self, user_id: Uuid, now: OffsetDateTime) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp(),
            exp: (now + self.ttl).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Uuid, TokenError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Signature, issuer and audience first; expiry is judged against `now`
    /// afterwards so a tampered token never reports `Expired`.
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Uuid, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| {
                debug!(error = %e, "jwt rejected");
                TokenError::Invalid
            })?
            .claims;

        if now.unix_timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        debug!(user_id = %claims.sub, "jwt verified");
        Ok(claims.sub)
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::new(&state.config.jwt)
    }
}
