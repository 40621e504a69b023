use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::fmt;
use validator::ValidateEmail;

use crate::services::ServiceError;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 64;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for an argon2 PHC hash string
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash a password using Argon2id.
///
/// A fresh salt is drawn from the OS RNG on every call; salt and parameters
/// are embedded in the PHC output.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| ServiceError::Hashing(e.to_string()))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify a password against a stored hash.
///
/// `Ok(false)` on mismatch. A stored value that is not a PHC string is
/// [`ServiceError::MalformedHash`].
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<bool, ServiceError> {
    let parsed_hash = PasswordHash::new(password_hash.as_str())
        .map_err(|e| ServiceError::MalformedHash(e.to_string()))?;

    match Argon2::default().verify_password(password.as_str().as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(ServiceError::Hashing(e.to_string())),
    }
}

/// 8-64 characters with upper, lower, digit and special character.
pub fn validate_password_policy(password: &str) -> Result<(), ServiceError> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&len) {
        return Err(ServiceError::Validation(format!(
            "Password must be between {} and {} characters",
            MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH
        )));
    }

    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    if !(has_upper && has_lower && has_digit && has_special) {
        return Err(ServiceError::Validation(
            "Password must contain an uppercase letter, a lowercase letter, a digit and a special character"
                .to_string(),
        ));
    }

    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ServiceError> {
    if email.validate_email() {
        Ok(())
    } else {
        Err(ServiceError::Validation("Invalid email format".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password() {
        let password = Password::new("mySecurePassword123!");
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(hash.as_str().starts_with("$argon2id$"));
        assert!(!hash.as_str().contains("mySecurePassword123!"));
    }

    #[test]
    fn test_verify_password_correct_and_incorrect() {
        let password = Password::new("mySecurePassword123!");
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(verify_password(&password, &hash).unwrap());
        assert!(!verify_password(&Password::new("wrongPassword1!"), &hash).unwrap());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let password = Password::new("mySecurePassword123!");
        let hash1 = hash_password(&password).unwrap();
        let hash2 = hash_password(&password).unwrap();

        assert_ne!(hash1.as_str(), hash2.as_str());
        assert!(verify_password(&password, &hash1).unwrap());
        assert!(verify_password(&password, &hash2).unwrap());
    }

    #[test]
    fn test_malformed_hash() {
        let result = verify_password(
            &Password::new("whatever"),
            &PasswordHashString::new("not-a-phc-string".to_string()),
        );
        assert!(matches!(result, Err(ServiceError::MalformedHash(_))));
    }

    #[test]
    fn test_password_debug_is_redacted() {
        let rendered = format!("{:?}", Password::new("hunter2"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password_policy("Sup3r$ecret").is_ok());
        assert!(validate_password_policy("Sh0rt!").is_err());
        assert!(validate_password_policy("alllowercase1!").is_err());
        assert!(validate_password_policy("NoDigitsHere!").is_err());
        assert!(validate_password_policy("NoSpecial123").is_err());
        assert!(validate_password_policy(&format!("Aa1!{}", "x".repeat(61))).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@example.com").is_ok());
        assert!(validate_email("not-an-email").is_err());
    }
}
