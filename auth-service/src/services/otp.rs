//! One-time verification codes: issue, deliver, verify.

use chrono::Duration as ChronoDuration;
use rand::{rngs::OsRng, Rng};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::{OtpConfig, TimeoutConfig};
use crate::models::{otp_challenge::hash_code, OtpChallenge};
use crate::services::timeout::with_timeout;
use crate::services::{Clock, CredentialStore, EmailProvider, ServiceError};

pub const OTP_LENGTH: usize = 6;
const OTP_SUBJECT: &str = "Your verification code";

/// Outcome of issuing a code. The code itself only travels by email.
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub otp_id: Uuid,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    /// Whether the email left successfully. The challenge is valid either way.
    pub delivered: bool,
}

#[derive(Clone)]
pub struct OtpIssuer {
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn EmailProvider>,
    clock: Arc<dyn Clock>,
    lifetime: ChronoDuration,
    max_attempts: i32,
    store_timeout: Duration,
    email_timeout: Duration,
}

impl OtpIssuer {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn EmailProvider>,
        clock: Arc<dyn Clock>,
        config: &OtpConfig,
        timeouts: &TimeoutConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            clock,
            lifetime: ChronoDuration::minutes(config.expiry_minutes),
            max_attempts: config.max_attempts,
            store_timeout: timeouts.store(),
            email_timeout: timeouts.email(),
        }
    }

    /// Replace any outstanding challenge of `user_id` with a fresh code and
    /// mail it to `email`.
    #[tracing::instrument(skip_all, fields(user_id = %user_id))]
    pub async fn issue(&self, user_id: Uuid, email: &str) -> Result<IssuedOtp, ServiceError> {
        let code = generate_code();
        let challenge = OtpChallenge::new(user_id, &code, self.clock.now(), self.lifetime);

        with_timeout("store", self.store_timeout, self.store.upsert_otp(&challenge)).await?;

        let body = format!(
            "Your verification code is {}. It expires in {} minutes.",
            code,
            self.lifetime.num_minutes()
        );
        let delivered = match with_timeout(
            "email",
            self.email_timeout,
            self.mailer.send(email, OTP_SUBJECT, &body),
        )
        .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Verification email not delivered");
                false
            }
        };

        tracing::info!(otp_id = %challenge.otp_id, delivered, "Verification code issued");

        Ok(IssuedOtp {
            otp_id: challenge.otp_id,
            expires_at: challenge.expiry_utc,
            delivered,
        })
    }

    /// Check `submitted` against the live challenge of `user_id`. On a match
    /// the challenge is consumed and the user marked verified atomically.
    #[tracing::instrument(skip_all, fields(user_id = %user_id))]
    pub async fn verify(&self, user_id: Uuid, submitted: &str) -> Result<(), ServiceError> {
        if !is_well_formed(submitted) {
            return Err(ServiceError::Validation(format!(
                "Verification code must be {} digits",
                OTP_LENGTH
            )));
        }

        // The attempt is counted before the comparison so concurrent guesses
        // can never evaluate more than `max_attempts` codes.
        let challenge = with_timeout(
            "store",
            self.store_timeout,
            self.store.reserve_otp_attempt(user_id, self.max_attempts),
        )
        .await?
        .ok_or(ServiceError::OtpNotFound)?;

        let now = self.clock.now();
        if challenge.is_expired(now) {
            tracing::debug!(otp_id = %challenge.otp_id, "Verification code expired");
            return Err(ServiceError::OtpExpired);
        }

        let submitted_hash = hash_code(submitted);
        let matches: bool = submitted_hash
            .as_bytes()
            .ct_eq(challenge.code_hash.as_bytes())
            .into();

        if !matches {
            let remaining = (self.max_attempts - challenge.attempt_count).max(0);
            if remaining == 0 {
                with_timeout(
                    "store",
                    self.store_timeout,
                    self.store.delete_otp(challenge.otp_id),
                )
                .await?;
            }
            tracing::warn!(otp_id = %challenge.otp_id, remaining, "Verification code mismatch");
            return Err(ServiceError::OtpMismatch);
        }

        let consumed = with_timeout(
            "store",
            self.store_timeout,
            self.store
                .consume_otp_and_verify(user_id, challenge.otp_id, self.max_attempts, now),
        )
        .await?;

        if !consumed {
            return Err(ServiceError::OtpNotFound);
        }

        tracing::info!("Email verified");
        Ok(())
    }
}

fn generate_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

fn is_well_formed(code: &str) -> bool {
    code.len() == OTP_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}
