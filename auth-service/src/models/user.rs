//! User model - one account per (normalized) email address.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Canonical form used for storage and lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// User entity.
///
/// `password_hash` is an argon2 PHC string; the raw password is never held
/// here. `is_verified` only ever moves from `false` to `true`.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl User {
    /// Create a new, unverified user.
    pub fn new(email: &str, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email: normalize_email(email),
            password_hash,
            is_verified: false,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Convert to sanitized response (no credential material).
    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self.clone())
    }
}

/// User response for API (without sensitive fields).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    pub user_id: Uuid,
    #[schema(example = "a@example.com")]
    pub email: String,
    pub is_verified: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            email: u.email,
            is_verified: u.is_verified,
            created_utc: u.created_utc,
            updated_utc: u.updated_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_is_unverified_with_normalized_email() {
        let user = User::new("  A@Example.COM ", "$argon2id$stub".to_string(), Utc::now());
        assert_eq!(user.email, "a@example.com");
        assert!(!user.is_verified);
        assert_eq!(user.created_utc, user.updated_utc);
    }

    #[test]
    fn sanitized_response_has_no_hash() {
        let user = User::new("a@example.com", "$argon2id$stub".to_string(), Utc::now());
        let json = serde_json::to_string(&user.sanitized()).unwrap();
        assert!(!json.contains("argon2"));
    }
}
