use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::users::dto::{CreateUserRequest, UpdateUserRequest};
use crate::users::password::hash_password;
use crate::users::repo::UserStore;
use crate::users::repo_types::{NewUser, User, UserChanges};

/// Sole authority for mutating user records. Uniqueness and existence
/// checks run immediately before the write; the store's own constraints
/// resolve concurrent duplicates.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, req: CreateUserRequest) -> ApiResult<User> {
        // Email is checked before username so a request colliding on both
        // deterministically reports the email duplicate.
        if self.store.exists_by_email(&req.email).await? {
            warn!(email = %req.email, "email already exists");
            return Err(ApiError::DuplicateData { field: "email" });
        }
        if self.store.exists_by_username(&req.username).await? {
            warn!(username = %req.username, "username already exists");
            return Err(ApiError::DuplicateData { field: "username" });
        }

        let now = OffsetDateTime::now_utc();
        let user = self
            .store
            .insert(NewUser {
                username: req.username,
                email: req.email,
                password: hash_password(&req.password)?,
                full_name: req.full_name,
                role: req.role,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(user_id = user.id, "created new user");
        Ok(user)
    }

    pub async fn get_by_email(&self, email: &str) -> ApiResult<User> {
        info!(email = %email, "fetching user by email");
        self.store
            .find_by_email(email)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("email: {email}")))
    }

    pub async fn get_by_username(&self, username: &str) -> ApiResult<User> {
        info!(username = %username, "fetching user by username");
        self.store
            .find_by_username(username)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("username: {username}")))
    }

    pub async fn update(&self, id: i32, req: UpdateUserRequest) -> ApiResult<User> {
        info!(user_id = id, "updating user");
        if self.store.find_by_id(id).await?.is_none() {
            warn!(user_id = id, "user not found");
            return Err(ApiError::NotFound(format!("id: {id}")));
        }

        let user = self
            .store
            .update(
                id,
                UserChanges {
                    username: req.username,
                    email: req.email,
                    password: hash_password(&req.password)?,
                    full_name: req.full_name,
                    role: req.role,
                    updated_at: OffsetDateTime::now_utc(),
                },
            )
            .await?;

        info!(user_id = user.id, "user updated");
        Ok(user)
    }

    pub async fn delete(&self, id: i32) -> ApiResult<()> {
        info!(user_id = id, "deleting user");
        if !self.store.exists_by_id(id).await? {
            warn!(user_id = id, "user not found");
            return Err(ApiError::NotFound(format!("id: {id}")));
        }

        self.store.delete_by_id(id).await?;
        info!(user_id = id, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo::InMemoryUserStore;
    use crate::users::repo_types::Role;

    fn service() -> UserService {
        UserService::new(Arc::new(InMemoryUserStore::new()))
    }

    fn create_req(username: &str, email: &str) -> CreateUserRequest {
        CreateUserRequest {
            username: username.into(),
            email: email.into(),
            password: "password123".into(),
            full_name: "John Doe".into(),
            role: Role::Student,
        }
    }

    fn update_req(username: &str, email: &str) -> UpdateUserRequest {
        UpdateUserRequest {
            username: username.into(),
            email: email.into(),
            password: "newpassword456".into(),
            full_name: "John Q. Doe".into(),
            role: Role::Teacher,
        }
    }

    #[tokio::test]
    async fn create_assigns_id_and_hashes_password() {
        let svc = service();
        let user = svc
            .create(create_req("john_doe", "john@example.com"))
            .await
            .expect("create should succeed");

        assert!(user.id > 0);
        assert_eq!(user.username, "john_doe");
        assert_eq!(user.email, "john@example.com");
        assert_ne!(user.password, "password123");
        assert_eq!(user.created_at, user.updated_at);
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let svc = service();
        svc.create(create_req("john_doe", "john@example.com"))
            .await
            .expect("first create");

        let err = svc
            .create(create_req("other_name", "john@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::DuplicateData { field: "email" }));
    }

    #[tokio::test]
    async fn duplicate_username_rejected() {
        let svc = service();
        svc.create(create_req("john_doe", "john@example.com"))
            .await
            .expect("first create");

        let err = svc
            .create(create_req("john_doe", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::DuplicateData { field: "username" }));
    }

    #[tokio::test]
    async fn email_collision_reported_before_username() {
        let svc = service();
        svc.create(create_req("john_doe", "john@example.com"))
            .await
            .expect("first create");

        // Both fields collide; the email duplicate wins.
        let err = svc
            .create(create_req("john_doe", "john@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::DuplicateData { field: "email" }));
    }

    #[tokio::test]
    async fn lookup_by_email_and_username() {
        let svc = service();
        svc.create(create_req("john_doe", "john@example.com"))
            .await
            .expect("create");

        let by_email = svc.get_by_email("john@example.com").await.expect("found");
        assert_eq!(by_email.email, "john@example.com");

        let by_username = svc.get_by_username("john_doe").await.expect("found");
        assert_eq!(by_username.username, "john_doe");
    }

    #[tokio::test]
    async fn lookup_missing_key_is_not_found() {
        let svc = service();

        let err = svc.get_by_email("nobody@example.com").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = svc.get_by_username("nobody").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_overwrites_fields_and_preserves_created_at() {
        let svc = service();
        let created = svc
            .create(create_req("john_doe", "john@example.com"))
            .await
            .expect("create");

        let updated = svc
            .update(created.id, update_req("john_new", "john.new@example.com"))
            .await
            .expect("update should succeed");

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.username, "john_new");
        assert_eq!(updated.email, "john.new@example.com");
        assert_eq!(updated.full_name, "John Q. Doe");
        assert_eq!(updated.role, Role::Teacher);
        assert_ne!(updated.password, "newpassword456");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn update_missing_id_is_not_found_and_writes_nothing() {
        let svc = service();

        let err = svc
            .update(42, update_req("ghost", "ghost@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = svc.get_by_email("ghost@example.com").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let svc = service();
        let created = svc
            .create(create_req("john_doe", "john@example.com"))
            .await
            .expect("create");

        svc.delete(created.id).await.expect("delete should succeed");

        let err = svc.get_by_email("john@example.com").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_missing_id_is_not_found() {
        let svc = service();
        let err = svc.delete(999).await.unwrap_err();
        match err {
            ApiError::NotFound(key) => assert_eq!(key, "id: 999"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn email_freed_after_delete() {
        let svc = service();
        let created = svc
            .create(create_req("john_doe", "john@example.com"))
            .await
            .expect("create");
        svc.delete(created.id).await.expect("delete");

        let again = svc
            .create(create_req("john_doe", "john@example.com"))
            .await
            .expect("email and username free again");
        assert_ne!(again.id, created.id);
    }
}
