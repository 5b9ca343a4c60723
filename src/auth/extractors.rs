use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use tracing::warn;

use crate::{
    auth::jwt::{JwtKeys, TokenError},
    error::ApiError,
    state::AppState,
    users::{
        repo::{StoreError, UserRepo},
        repo_types::User,
    },
};

/// Header carrying the identity token.
pub const TOKEN_HEADER: &str = "x-auth-token";

/// Which gate check failed. Logged, never shown to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    MissingToken,
    InvalidToken,
    Expired,
    SubjectNotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("rejected: {0:?}")]
    Rejected(GateRejection),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<GateRejection> for GateError {
    fn from(r: GateRejection) -> Self {
        GateError::Rejected(r)
    }
}

impl From<GateError> for ApiError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::Rejected(_) => ApiError::Unauthorized,
            GateError::Store(e) => e.into(),
        }
    }
}

/// Token present, signature valid, not expired, subject still exists.
/// Each step short-circuits on failure.
pub async fn authenticate(
    headers: &HeaderMap,
    keys: &JwtKeys,
    users: &dyn UserRepo,
) -> Result<User, GateError> {
    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|t| !t.is_empty())
        .ok_or(GateRejection::MissingToken)?;

    let user_id = keys.verify(token).map_err(|e| match e {
        TokenError::Expired => GateRejection::Expired,
        TokenError::Invalid | TokenError::Signing(_) => GateRejection::InvalidToken,
    })?;

    users
        .find_by_id(user_id)
        .await?
        .ok_or(GateRejection::SubjectNotFound.into())
}

/// The authenticated requester, resolved once per request and passed to the
/// handler by value.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        match authenticate(&parts.headers, &keys, state.users.as_ref()).await {
            Ok(user) => Ok(AuthUser(user)),
            Err(GateError::Rejected(reason)) => {
                warn!(?reason, "request rejected by auth gate");
                Err(ApiError::Unauthorized)
            }
            Err(e) => Err(e.into()),
        }
    }
}
