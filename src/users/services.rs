use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{
        password::hash_password_blocking,
        policy::{grant_role, is_admin},
    },
    error::ApiError,
    users::{
        repo::{StoreError, UserRepo},
        repo_types::{NewUser, ProfileChanges, Role, User},
    },
};

/// Update payload as received. `role` is raw request text and is only parsed
/// for admin actors.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

pub async fn register_user(
    users: &dyn UserRepo,
    name: String,
    email: String,
    password: String,
) -> Result<User, StoreError> {
    let password_hash = hash_password_blocking(password).await?;
    users
        .insert(NewUser {
            name,
            email,
            password_hash,
        })
        .await
}

/// Applies the present fields. A role in `update` is dropped, whatever its
/// value, unless `actor` is an admin; the remaining fields still apply. An
/// admin naming an unknown role gets a validation error and nothing changes.
pub async fn update_profile(
    users: &dyn UserRepo,
    id: Uuid,
    update: ProfileUpdate,
    actor: &User,
) -> Result<User, ApiError> {
    let grant = match update.role.as_deref() {
        Some(raw) if is_admin(actor) => {
            let role = Role::from_name(raw)
                .ok_or_else(|| ApiError::Validation("Role must be one of: user, admin".into()))?;
            grant_role(actor, Some(role))
        }
        Some(_) => {
            info!(actor_id = %actor.id, target_id = %id, "role change ignored for non-admin");
            None
        }
        None => None,
    };
    let changes = ProfileChanges {
        name: update.name,
        email: update.email,
    };
    let user = users.update(id, &changes, grant).await?;
    info!(actor_id = %actor.id, target_id = %id, "profile updated");
    Ok(user)
}

pub async fn delete_user(users: &dyn UserRepo, id: Uuid, actor: &User) -> Result<(), StoreError> {
    users.delete(id).await?;
    info!(actor_id = %actor.id, target_id = %id, "user deleted");
    Ok(())
}
