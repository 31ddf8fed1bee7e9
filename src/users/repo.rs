use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{ApiError, ApiResult};
use crate::users::repo_types::{NewUser, User, UserChanges};

/// Persistence collaborator for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> ApiResult<User>;
    async fn update(&self, id: i32, changes: UserChanges) -> ApiResult<User>;
    async fn find_by_id(&self, id: i32) -> ApiResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> ApiResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> ApiResult<Option<User>>;
    async fn exists_by_id(&self, id: i32) -> ApiResult<bool>;
    async fn exists_by_email(&self, email: &str) -> ApiResult<bool>;
    async fn exists_by_username(&self, username: &str) -> ApiResult<bool>;
    async fn delete_by_id(&self, id: i32) -> ApiResult<()>;
}

/// Postgres-backed store. The UNIQUE constraints on email and username are
/// the authoritative uniqueness guarantee; the service-level checks are an
/// early exit, so a constraint violation here still surfaces as a
/// duplicate-data error rather than a 500.
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_unique_violation(e: sqlx::Error) -> ApiError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            let field = match db_err.constraint() {
                Some(c) if c.contains("email") => "email",
                Some(c) if c.contains("username") => "username",
                _ => "unique field",
            };
            return ApiError::DuplicateData { field };
        }
    }
    ApiError::Database(e)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> ApiResult<User> {
        let row = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password, full_name, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, username, email, password, full_name, role, created_at, updated_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.full_name)
        .bind(user.role)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique_violation)?;
        Ok(row)
    }

    async fn update(&self, id: i32, changes: UserChanges) -> ApiResult<User> {
        let row = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET username = $2, email = $3, password = $4, full_name = $5, role = $6, updated_at = $7
            WHERE id = $1
            RETURNING id, username, email, password, full_name, role, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&changes.username)
        .bind(&changes.email)
        .bind(&changes.password)
        .bind(&changes.full_name)
        .bind(changes.role)
        .bind(changes.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique_violation)?;
        Ok(row)
    }

    async fn find_by_id(&self, id: i32) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password, full_name, role, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password, full_name, role, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password, full_name, role, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn exists_by_id(&self, id: i32) -> ApiResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.db)
            .await?;
        Ok(exists)
    }

    async fn exists_by_email(&self, email: &str) -> ApiResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn exists_by_username(&self, username: &str) -> ApiResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn delete_by_id(&self, id: i32) -> ApiResult<()> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

#[derive(Default)]
struct Inner {
    next_id: i32,
    users: HashMap<i32, User>,
}

/// In-memory store used by tests. Enforces the same uniqueness rules the
/// Postgres constraints do.
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: NewUser) -> ApiResult<User> {
        let mut inner = self.inner.write().await;

        if inner.users.values().any(|u| u.email == user.email) {
            return Err(ApiError::DuplicateData { field: "email" });
        }
        if inner.users.values().any(|u| u.username == user.username) {
            return Err(ApiError::DuplicateData { field: "username" });
        }

        inner.next_id += 1;
        let user = User {
            id: inner.next_id,
            username: user.username,
            email: user.email,
            password: user.password,
            full_name: user.full_name,
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, id: i32, changes: UserChanges) -> ApiResult<User> {
        let mut inner = self.inner.write().await;

        if inner
            .users
            .values()
            .any(|u| u.id != id && u.email == changes.email)
        {
            return Err(ApiError::DuplicateData { field: "email" });
        }
        if inner
            .users
            .values()
            .any(|u| u.id != id && u.username == changes.username)
        {
            return Err(ApiError::DuplicateData { field: "username" });
        }

        let user = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| ApiError::NotFound(format!("id: {id}")))?;
        user.username = changes.username;
        user.email = changes.email;
        user.password = changes.password;
        user.full_name = changes.full_name;
        user.role = changes.role;
        user.updated_at = changes.updated_at;
        Ok(user.clone())
    }

    async fn find_by_id(&self, id: i32) -> ApiResult<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> ApiResult<Option<User>> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn exists_by_id(&self, id: i32) -> ApiResult<bool> {
        Ok(self.inner.read().await.users.contains_key(&id))
    }

    async fn exists_by_email(&self, email: &str) -> ApiResult<bool> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .any(|u| u.email == email))
    }

    async fn exists_by_username(&self, username: &str) -> ApiResult<bool> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .any(|u| u.username == username))
    }

    async fn delete_by_id(&self, id: i32) -> ApiResult<()> {
        self.inner.write().await.users.remove(&id);
        Ok(())
    }
}
