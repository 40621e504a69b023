//! OTP challenge model - the single outstanding email verification code of a user.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

/// OTP challenge entity. Only the SHA-256 of the code is kept.
#[derive(Debug, Clone, FromRow)]
pub struct OtpChallenge {
    pub otp_id: Uuid,
    pub user_id: Uuid,
    pub code_hash: String,
    pub attempt_count: i32,
    pub issued_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
}

impl OtpChallenge {
    pub fn new(user_id: Uuid, code: &str, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            otp_id: Uuid::new_v4(),
            user_id,
            code_hash: hash_code(code),
            attempt_count: 0,
            issued_utc: now,
            expiry_utc: now + ttl,
        }
    }

    /// Expired once `now` is past `expiry_utc`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry_utc
    }
}

/// Hash an OTP code for storage and comparison.
pub fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}
