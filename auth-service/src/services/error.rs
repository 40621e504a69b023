use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    // Validation
    #[error("Validation error: {0}")]
    Validation(String),

    // Conflict
    #[error("Email already registered")]
    DuplicateEmail,

    // Authentication
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email not verified")]
    NotVerified,

    #[error("No pending verification code")]
    OtpNotFound,

    #[error("Verification code expired")]
    OtpExpired,

    #[error("Verification code mismatch")]
    OtpMismatch,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    TokenExpired,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Session not found or expired")]
    SessionNotFound,

    #[error("User not found")]
    UserNotFound,

    // Dependencies
    #[error("Store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("Email error: {0}")]
    Email(String),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Malformed password hash: {0}")]
    MalformedHash(String),

    // Startup
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Failures that mean "the caller did not prove who they are".
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            ServiceError::InvalidCredentials
                | ServiceError::NotVerified
                | ServiceError::OtpExpired
                | ServiceError::OtpMismatch
                | ServiceError::InvalidSignature
                | ServiceError::TokenExpired
                | ServiceError::MalformedToken
                | ServiceError::SessionNotFound
        )
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Store(anyhow::Error::new(err))
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::DuplicateEmail => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid email or password"))
            }
            ServiceError::NotVerified => {
                AppError::Unauthorized(anyhow::anyhow!("Email not verified"))
            }
            ServiceError::OtpMismatch | ServiceError::OtpExpired => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired verification code"))
            }
            ServiceError::OtpNotFound => {
                AppError::NotFound(anyhow::anyhow!("No pending verification"))
            }
            ServiceError::InvalidSignature
            | ServiceError::TokenExpired
            | ServiceError::MalformedToken
            | ServiceError::SessionNotFound
            | ServiceError::UserNotFound => AppError::Unauthorized(anyhow::anyhow!("Unauthorized")),
            ServiceError::Store(e) => AppError::DatabaseError(e),
            ServiceError::Email(e) => AppError::EmailError(e),
            e @ (ServiceError::Timeout(_)
            | ServiceError::Hashing(_)
            | ServiceError::Signing(_)
            | ServiceError::MalformedHash(_)
            | ServiceError::Config(_)) => AppError::InternalError(anyhow::anyhow!(e.to_string())),
        }
    }
}
