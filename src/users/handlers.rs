use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::get,
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        extractors::AuthUser,
        policy::{is_admin, is_self_or_admin},
    },
    error::ApiError,
    state::AppState,
    users::{
        dto::{DataResponse, ListResponse, MessageResponse, UpdateUserRequest},
        repo_types::User,
        services::{delete_user as remove_user, update_profile},
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

/// Unparsable ids cannot name an existing user.
fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound)
}

fn require_admin(requester: &User) -> Result<(), ApiError> {
    if !is_admin(requester) {
        warn!(user_id = %requester.id, "admin route denied");
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

/// Owner-or-admin check on a raw path id. A malformed id can never be the
/// requester's own, so non-admins get `Forbidden` before `NotFound`.
fn authorize_target(requester: &User, raw: &str) -> Result<Uuid, ApiError> {
    let Ok(target) = Uuid::parse_str(raw) else {
        require_admin(requester)?;
        return Err(ApiError::NotFound);
    };
    if !is_self_or_admin(requester, target) {
        warn!(user_id = %requester.id, target_id = %target, "not owner or admin");
        return Err(ApiError::Forbidden);
    }
    Ok(target)
}

#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
) -> Result<Json<ListResponse<User>>, ApiError> {
    require_admin(&requester)?;
    let users = state.users.list().await?;
    Ok(Json(ListResponse::new(users)))
}

#[instrument(skip(state, requester))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<User>>, ApiError> {
    require_admin(&requester)?;
    let id = parse_id(&id)?;
    let user = state.users.find_by_id(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(DataResponse::new(user)))
}

#[instrument(skip(state, requester, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<DataResponse<User>>, ApiError> {
    let id = authorize_target(&requester, &id)?;
    let Json(payload) = payload?;

    let user = update_profile(state.users.as_ref(), id, payload.into(), &requester).await?;
    Ok(Json(DataResponse::new(user)))
}

#[instrument(skip(state, requester))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = authorize_target(&requester, &id)?;

    remove_user(state.users.as_ref(), id, &requester).await?;
    Ok(Json(MessageResponse {
        success: true,
        msg: "User deleted",
    }))
}
