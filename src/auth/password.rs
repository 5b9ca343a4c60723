use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

fn argon2_failure(op: &'static str, e: argon2::password_hash::Error) -> anyhow::Error {
    error!(error = %e, op, "argon2 failure");
    anyhow::anyhow!("argon2 {op}: {e}")
}

/// Argon2id digest in PHC string form. The salt is drawn fresh per call and
/// embedded in the result, so equal passwords give different digests.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let digest = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| argon2_failure("hash", e))?;
    Ok(digest.to_string())
}

/// Mismatch is `Ok(false)`; a malformed digest is an error.
/// The comparison itself is constant time inside argon2.
pub fn verify_password(plain: &str, digest: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(digest).map_err(|e| argon2_failure("parse digest", e))?;
    match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(argon2_failure("verify", e)),
    }
}

/// Runs the hash on the blocking pool; argon2 is deliberately slow.
pub async fn hash_password_blocking(plain: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain)).await?
}

pub async fn verify_password_blocking(plain: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&plain, &hash)).await?
}
