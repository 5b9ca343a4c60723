use uuid::Uuid;

use crate::users::repo_types::{Role, User};

/// Pure check on a resolved requester; handlers call it before any store write.
pub fn is_admin(requester: &User) -> bool {
    requester.role == Role::Admin
}

pub fn is_self_or_admin(requester: &User, target_id: Uuid) -> bool {
    requester.id == target_id || is_admin(requester)
}

/// Permission to set a role, issued only by [`grant_role`].
///
/// The store's update path takes a `RoleGrant` rather than a bare `Role`, so a
/// role field coming from a request body can never reach it unchecked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleGrant {
    role: Role,
}

impl RoleGrant {
    pub fn role(&self) -> Role {
        self.role
    }
}

/// Returns a grant when `actor` is an admin and a role was requested.
/// Non-admin requests are dropped silently; admins get no special case for
/// their own account.
pub fn grant_role(actor: &User, requested: Option<Role>) -> Option<RoleGrant> {
    match requested {
        Some(role) if is_admin(actor) => Some(RoleGrant { role }),
        _ => None,
    }
}
