use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest, TokenResponse},
        extractors::AuthUser,
        jwt::JwtKeys,
        services,
    },
    error::ApiError,
    state::AppState,
    users::{dto::DataResponse, repo_types::User},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let Json(payload) = payload?;
    let req = payload.validate()?;

    let keys = JwtKeys::from_ref(&state);
    let token = services::register(
        state.users.as_ref(),
        &keys,
        req.name,
        req.email,
        req.password,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(TokenResponse::new(token))))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(payload) = payload?;
    let (email, password) = payload.validate()?;

    let keys = JwtKeys::from_ref(&state);
    let token = services::login(state.users.as_ref(), &keys, &email, password).await?;
    Ok(Json(TokenResponse::new(token)))
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<DataResponse<User>> {
    Json(DataResponse::new(user))
}
