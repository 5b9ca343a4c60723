use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::policy::RoleGrant;
use crate::users::repo_types::{NewUser, ProfileChanges, Role, User, UserRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence for user accounts. Implementations must enforce email
/// uniqueness atomically; callers never check-then-insert.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn insert(&self, new: NewUser) -> Result<User, StoreError>;
    async fn find_by_email_with_hash(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn list(&self) -> Result<Vec<User>, StoreError>;
    async fn update(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
        role: Option<RoleGrant>,
    ) -> Result<User, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_sqlx(op: &'static str, e: sqlx::Error) -> StoreError {
    if let Some(db_err) = e.as_database_error() {
        // 23505: unique_violation, only the email constraint can raise it here
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::DuplicateEmail;
        }
    }
    StoreError::Backend(anyhow::Error::new(e).context(op))
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn insert(&self, new: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, role, created_at
            "#,
        )
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_sqlx("insert user", e))
    }

    async fn find_by_email_with_hash(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, name, email, password_hash, role, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_sqlx("find user by email", e))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            r#"SELECT id, name, email, role, created_at FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_sqlx("find user by id", e))
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, role, created_at
            FROM users
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.db)
        .await
        .map_err(|e| map_sqlx("list users", e))
    }

    async fn update(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
        role: Option<RoleGrant>,
    ) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                role = COALESCE($4, role)
            WHERE id = $1
            RETURNING id, name, email, role, created_at
            "#,
        )
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.email.as_deref())
        .bind(role.map(|g| g.role()))
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_sqlx("update user", e))?
        .ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let res = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| map_sqlx("delete user", e))?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

/// Process-local store. Uniqueness checks and writes happen under one write
/// lock, so concurrent registrations of the same email cannot both succeed.
#[derive(Default)]
pub struct MemoryUserRepo {
    rows: RwLock<HashMap<Uuid, UserRecord>>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

fn email_taken(rows: &HashMap<Uuid, UserRecord>, email: &str, except: Option<Uuid>) -> bool {
    rows.values()
        .any(|r| r.email == email && Some(r.id) != except)
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn insert(&self, new: NewUser) -> Result<User, StoreError> {
        let mut rows = self.rows.write().await;
        if email_taken(&rows, &new.email, None) {
            return Err(StoreError::DuplicateEmail);
        }
        let record = UserRecord {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            role: Role::User,
            created_at: OffsetDateTime::now_utc(),
        };
        rows.insert(record.id, record.clone());
        Ok(record.into_public())
    }

    async fn find_by_email_with_hash(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.values().find(|r| r.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.get(&id).cloned().map(UserRecord::into_public))
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows = self.rows.read().await;
        let mut users: Vec<User> = rows.values().cloned().map(UserRecord::into_public).collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
        role: Option<RoleGrant>,
    ) -> Result<User, StoreError> {
        let mut rows = self.rows.write().await;
        if !rows.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        if let Some(email) = &changes.email {
            if email_taken(&rows, email, Some(id)) {
                return Err(StoreError::DuplicateEmail);
            }
        }
        let record = rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(name) = &changes.name {
            record.name = name.clone();
        }
        if let Some(email) = &changes.email {
            record.email = email.clone();
        }
        if let Some(grant) = role {
            record.role = grant.role();
        }
        Ok(record.clone().into_public())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        rows.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }
}
