use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::{normalize_email, Session, User, UserResponse};
use crate::services::timeout::with_timeout;
use crate::services::{
    Clock, CredentialStore, EmailProvider, IssuedOtp, IssuedToken, JwtService, OtpIssuer,
    ServiceError, SessionRegistry,
};
use crate::utils::{
    hash_password, validate_email, validate_password_policy, verify_password, Password,
    PasswordHashString,
};

/// Verified against when the email is unknown so that login costs one argon2
/// verification on every path.
static DUMMY_HASH: Lazy<Option<PasswordHashString>> =
    Lazy::new(|| hash_password(&Password::new("dummy-password-for-timing")).ok());

/// The credential an authorized request presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialKind {
    Token { session_id: Uuid },
    Session { session_id: String },
}

/// Authenticated identity produced by [`AuthService::authorize`].
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub credential: CredentialKind,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub user: UserResponse,
    /// `None` when the challenge could not be stored. The account exists
    /// either way and `resend_otp` issues a fresh code.
    pub otp: Option<IssuedOtp>,
}

/// Outcome of a resend request. Deliberately identical in shape for unknown,
/// verified and pending accounts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResendOutcome {
    pub issued: bool,
}

/// Registration, verification, login and authorization over injected
/// collaborators.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    jwt: JwtService,
    otp: OtpIssuer,
    sessions: SessionRegistry,
    store_timeout: Duration,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn EmailProvider>,
        clock: Arc<dyn Clock>,
        config: &AuthConfig,
    ) -> Result<Self, ServiceError> {
        let jwt = JwtService::new(&config.jwt, clock.clone())?;
        let otp = OtpIssuer::new(
            store.clone(),
            mailer,
            clock.clone(),
            &config.otp,
            &config.timeouts,
        );
        let sessions = SessionRegistry::new(
            store.clone(),
            clock.clone(),
            &config.session,
            &config.timeouts,
        );

        Ok(Self {
            store,
            clock,
            jwt,
            otp,
            sessions,
            store_timeout: config.timeouts.store(),
        })
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    async fn store_call<T, F>(&self, fut: F) -> Result<T, ServiceError>
    where
        F: std::future::Future<Output = Result<T, ServiceError>>,
    {
        with_timeout("store", self.store_timeout, fut).await
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ==================== Registration & verification ====================

    #[tracing::instrument(skip_all)]
    pub async fn register(&self, email: &str, password: &str) -> Result<Registration, ServiceError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password_policy(password)?;

        if self
            .store_call(self.store.find_user_by_email(&email))
            .await?
            .is_some()
        {
            return Err(ServiceError::DuplicateEmail);
        }

        let password_hash = hash_password(&Password::new(password))?;
        let user = User::new(&email, password_hash.into_string(), self.now());

        // The unique constraint decides races between concurrent registrations.
        self.store_call(self.store.insert_user(&user)).await?;
        tracing::info!(user_id = %user.user_id, "User registered");

        let otp = match self.otp.issue(user.user_id, &user.email).await {
            Ok(issued) => Some(issued),
            Err(e) => {
                tracing::error!(user_id = %user.user_id, error = %e, "Verification code not issued");
                None
            }
        };

        Ok(Registration {
            user: user.sanitized(),
            otp,
        })
    }

    #[tracing::instrument(skip_all)]
    pub async fn verify(&self, email: &str, code: &str) -> Result<(), ServiceError> {
        let email = normalize_email(email);
        let user = self
            .store_call(self.store.find_user_by_email(&email))
            .await?
            .ok_or(ServiceError::OtpNotFound)?;

        self.otp.verify(user.user_id, code).await
    }

    /// Re-issue a code for a pending account, invalidating the previous one.
    /// Unknown and already verified emails get the same outcome shape.
    #[tracing::instrument(skip_all)]
    pub async fn resend_otp(&self, email: &str) -> Result<ResendOutcome, ServiceError> {
        let email = normalize_email(email);
        let Some(user) = self
            .store_call(self.store.find_user_by_email(&email))
            .await?
        else {
            tracing::debug!("Resend requested for unknown email");
            return Ok(ResendOutcome::default());
        };

        if user.is_verified {
            tracing::debug!(user_id = %user.user_id, "Resend requested for verified account");
            return Ok(ResendOutcome::default());
        }

        self.otp.issue(user.user_id, &user.email).await?;
        Ok(ResendOutcome { issued: true })
    }

    // ==================== Login ====================

    /// Check email and password. Unknown email and wrong password are
    /// indistinguishable to the caller.
    async fn authenticate(&self, email: &str, password: &str) -> Result<User, ServiceError> {
        let email = normalize_email(email);
        let password = Password::new(password);

        let Some(user) = self
            .store_call(self.store.find_user_by_email(&email))
            .await?
        else {
            if let Some(dummy) = DUMMY_HASH.as_ref() {
                let _ = verify_password(&password, dummy);
            }
            tracing::warn!("Login failed: unknown email");
            return Err(ServiceError::InvalidCredentials);
        };

        let stored = PasswordHashString::new(user.password_hash.clone());
        if !verify_password(&password, &stored)? {
            tracing::warn!(user_id = %user.user_id, "Login failed: wrong password");
            return Err(ServiceError::InvalidCredentials);
        }

        if !user.is_verified {
            tracing::warn!(user_id = %user.user_id, "Login refused: email not verified");
            return Err(ServiceError::NotVerified);
        }

        Ok(user)
    }

    #[tracing::instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedToken, ServiceError> {
        let user = self.authenticate(email, password).await?;
        let issued = self.jwt.issue_token(&user.email, user.user_id)?;
        tracing::info!(user_id = %user.user_id, session_id = %issued.session_id, "User logged in");
        Ok(issued)
    }

    #[tracing::instrument(skip_all)]
    pub async fn open_session(
        &self,
        email: &str,
        password: &str,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Result<Session, ServiceError> {
        let user = self.authenticate(email, password).await?;
        self.sessions
            .open(user.user_id, user_agent, ip_address)
            .await
    }

    pub async fn close_session(&self, session_id: &str) -> Result<(), ServiceError> {
        self.sessions.close(session_id).await
    }

    // ==================== Authorization ====================

    /// Resolve a raw bearer credential. A value containing `.` is a signed
    /// token; anything else is a session id.
    pub async fn authorize(&self, raw: &str) -> Result<Principal, ServiceError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ServiceError::MalformedToken);
        }

        if raw.contains('.') {
            let claims = self.jwt.validate_token(raw)?;
            return Ok(Principal {
                user_id: claims.uid,
                email: claims.sub,
                credential: CredentialKind::Token {
                    session_id: claims.sid,
                },
            });
        }

        let session = self.sessions.resolve(raw).await?;
        let user = self
            .store_call(self.store.find_user_by_id(session.user_id))
            .await?
            .ok_or(ServiceError::SessionNotFound)?;

        Ok(Principal {
            user_id: user.user_id,
            email: user.email,
            credential: CredentialKind::Session {
                session_id: session.session_id,
            },
        })
    }

    // ==================== Account ====================

    pub async fn get_user(&self, user_id: Uuid) -> Result<UserResponse, ServiceError> {
        self.store_call(self.store.find_user_by_id(user_id))
            .await?
            .map(|u| u.sanitized())
            .ok_or(ServiceError::UserNotFound)
    }

    #[tracing::instrument(skip_all, fields(user_id = %user_id))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current: &str,
        new: &str,
    ) -> Result<(), ServiceError> {
        let user = self
            .store_call(self.store.find_user_by_id(user_id))
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        let stored = PasswordHashString::new(user.password_hash);
        if !verify_password(&Password::new(current), &stored)? {
            return Err(ServiceError::InvalidCredentials);
        }

        validate_password_policy(new)?;
        let new_hash = hash_password(&Password::new(new))?;

        self.store_call(self.store.update_password_hash(
            user_id,
            new_hash.as_str(),
            self.now(),
        ))
        .await?;

        tracing::info!("Password changed");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), ServiceError> {
        self.store_call(self.store.health_check()).await
    }
}
