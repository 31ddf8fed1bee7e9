use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::users::repo_types::Role;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Request body for creating a user. `password` is plaintext here and
/// hashed by the service before it reaches the store.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
}

/// Request body for replacing a user's mutable fields. The target id comes
/// from the request path.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
}

impl CreateUserRequest {
    pub fn validate(&self) -> ApiResult<()> {
        validate_fields(&self.username, &self.email, &self.password, &self.full_name)
    }
}

impl UpdateUserRequest {
    pub fn validate(&self) -> ApiResult<()> {
        validate_fields(&self.username, &self.email, &self.password, &self.full_name)
    }
}

fn validate_fields(
    username: &str,
    email: &str,
    password: &str,
    full_name: &str,
) -> ApiResult<()> {
    let username_len = username.chars().count();
    if !(3..=20).contains(&username_len) {
        return Err(ApiError::Validation {
            field: "username",
            constraint: "must be 3-20 characters",
        });
    }
    if !is_valid_email(email) {
        return Err(ApiError::Validation {
            field: "email",
            constraint: "must be a valid email address",
        });
    }
    if password.chars().count() < 8 {
        return Err(ApiError::Validation {
            field: "password",
            constraint: "must be at least 8 characters",
        });
    }
    let name_len = full_name.chars().count();
    if !(3..=100).contains(&name_len) {
        return Err(ApiError::Validation {
            field: "full_name",
            constraint: "must be 3-100 characters",
        });
    }
    Ok(())
}
