use lazy_static::lazy_static;
use tracing::{info, warn};

use crate::{
    auth::{
        jwt::JwtKeys,
        password::{hash_password, verify_password, verify_password_blocking},
    },
    error::ApiError,
    users::{repo::UserRepo, services::register_user},
};

lazy_static! {
    /// Verified against when the email is unknown so both login failures cost
    /// one argon2 run.
    static ref DUMMY_HASH: Option<String> = hash_password("usergate-timing-equalizer").ok();
}

/// Creates the account and returns a token for it.
pub async fn register(
    users: &dyn UserRepo,
    keys: &JwtKeys,
    name: String,
    email: String,
    password: String,
) -> Result<String, ApiError> {
    let user = register_user(users, name, email, password).await?;
    let token = keys
        .issue(user.id)
        .map_err(|e| ApiError::Server(e.into()))?;
    info!(user_id = %user.id, "user registered");
    Ok(token)
}

/// Unknown email and wrong password both come back as `InvalidCredentials`.
pub async fn login(
    users: &dyn UserRepo,
    keys: &JwtKeys,
    email: &str,
    password: String,
) -> Result<String, ApiError> {
    let Some(record) = users.find_by_email_with_hash(email).await? else {
        warn!("login unknown email");
        let _ = tokio::task::spawn_blocking(move || {
            if let Some(dummy) = DUMMY_HASH.as_ref() {
                let _ = verify_password(&password, dummy);
            }
        })
        .await;
        return Err(ApiError::InvalidCredentials);
    };

    let ok = verify_password_blocking(password, record.password_hash)
        .await
        .map_err(ApiError::Server)?;
    if !ok {
        warn!(user_id = %record.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = keys
        .issue(record.id)
        .map_err(|e| ApiError::Server(e.into()))?;
    info!(user_id = %record.id, "user logged in");
    Ok(token)
}
