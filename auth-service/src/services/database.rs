//! PostgreSQL credential store.
//!
//! Email uniqueness is enforced by the `users_email_key` constraint, OTP
//! attempts are reserved with a guarded `UPDATE ... RETURNING`, and OTP
//! consumption is a single `DELETE ... RETURNING` feeding an `UPDATE`, so
//! none of them relies on check-then-act in application code.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{OtpChallenge, Session, User};
use crate::services::{CredentialStore, ServiceError};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[async_trait]
impl CredentialStore for Database {
    /// Health check - ping the database.
    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                ServiceError::from(e)
            })?;
        Ok(())
    }

    // ==================== User Operations ====================

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, password_hash, is_verified, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_verified)
        .bind(user.created_utc)
        .bind(user.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::DuplicateEmail
            } else {
                ServiceError::from(e)
            }
        })?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $1, updated_utc = $2 WHERE user_id = $3")
                .bind(password_hash)
                .bind(now)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::UserNotFound);
        }
        Ok(())
    }

    // ==================== OTP Operations ====================

    async fn upsert_otp(&self, otp: &OtpChallenge) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO otp_challenges (otp_id, user_id, code_hash, attempt_count, issued_utc, expiry_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                otp_id = EXCLUDED.otp_id,
                code_hash = EXCLUDED.code_hash,
                attempt_count = EXCLUDED.attempt_count,
                issued_utc = EXCLUDED.issued_utc,
                expiry_utc = EXCLUDED.expiry_utc
            "#,
        )
        .bind(otp.otp_id)
        .bind(otp.user_id)
        .bind(&otp.code_hash)
        .bind(otp.attempt_count)
        .bind(otp.issued_utc)
        .bind(otp.expiry_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_otp(&self, user_id: Uuid) -> Result<Option<OtpChallenge>, ServiceError> {
        let otp = sqlx::query_as::<_, OtpChallenge>(
            "SELECT * FROM otp_challenges WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(otp)
    }

    async fn reserve_otp_attempt(
        &self,
        user_id: Uuid,
        max_attempts: i32,
    ) -> Result<Option<OtpChallenge>, ServiceError> {
        let otp = sqlx::query_as::<_, OtpChallenge>(
            r#"
            UPDATE otp_challenges SET attempt_count = attempt_count + 1
            WHERE user_id = $1 AND attempt_count < $2
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await?;
        Ok(otp)
    }

    async fn delete_otp(&self, otp_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query("DELETE FROM otp_challenges WHERE otp_id = $1")
            .bind(otp_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn consume_otp_and_verify(
        &self,
        user_id: Uuid,
        otp_id: Uuid,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let verified: Option<Uuid> = sqlx::query_scalar(
            r#"
            WITH consumed AS (
                DELETE FROM otp_challenges
                WHERE user_id = $1 AND otp_id = $2 AND attempt_count <= $3 AND expiry_utc >= $4
                RETURNING user_id
            )
            UPDATE users SET is_verified = TRUE, updated_utc = $4
            FROM consumed
            WHERE users.user_id = consumed.user_id
            RETURNING users.user_id
            "#,
        )
        .bind(user_id)
        .bind(otp_id)
        .bind(max_attempts)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(verified.is_some())
    }

    // ==================== Session Operations ====================

    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, user_id, created_utc, expiry_utc, user_agent, ip_address)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&session.session_id)
        .bind(session.user_id)
        .bind(session.created_utc)
        .bind(session.expiry_utc)
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_live_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, ServiceError> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE session_id = $1 AND expiry_utc > $2",
        )
        .bind(session_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), ServiceError> {
        sqlx::query("DELETE FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expiry_utc <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
