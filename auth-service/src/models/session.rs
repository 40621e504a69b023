//! Server-side session model (opaque-identifier alternative to bearer tokens).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Random bytes behind a session identifier (256 bits).
pub const SESSION_ID_BYTES: usize = 32;

/// Session entity.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub session_id: String,
    pub user_id: Uuid,
    pub created_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl Session {
    pub fn new(
        user_id: Uuid,
        user_agent: Option<String>,
        ip_address: Option<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            session_id: generate_session_id(),
            user_id,
            created_utc: now,
            expiry_utc: now + ttl,
            user_agent,
            ip_address,
        }
    }

    /// Valid strictly before `expiry_utc`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expiry_utc
    }
}

/// URL-safe identifier from the OS CSPRNG. Never contains `.`, which keeps it
/// distinguishable from a JWT.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Session info for API responses.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SessionInfo {
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

impl From<Session> for SessionInfo {
    fn from(s: Session) -> Self {
        Self {
            session_id: s.session_id,
            expires_at: s.expiry_utc,
        }
    }
}
