//! Credential store contract and the in-process implementation.
//!
//! The auth core only talks to [`CredentialStore`]. Uniqueness of email and
//! consumption of an OTP challenge are single operations of the store so
//! that concurrent requests can never both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{OtpChallenge, Session, User};
use crate::services::ServiceError;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn health_check(&self) -> Result<(), ServiceError>;

    // ==================== Users ====================

    /// Insert a user. Fails with [`ServiceError::DuplicateEmail`] when the
    /// email is already taken, decided atomically by the store.
    async fn insert_user(&self, user: &User) -> Result<(), ServiceError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError>;

    // ==================== OTP challenges ====================

    /// Store `otp` as the user's only challenge, replacing any prior one.
    async fn upsert_otp(&self, otp: &OtpChallenge) -> Result<(), ServiceError>;

    async fn find_otp(&self, user_id: Uuid) -> Result<Option<OtpChallenge>, ServiceError>;

    /// Count one submission against the user's challenge before the code is
    /// compared. Returns the challenge with its incremented `attempt_count`,
    /// or `None` when there is no challenge or `max_attempts` are spent.
    async fn reserve_otp_attempt(
        &self,
        user_id: Uuid,
        max_attempts: i32,
    ) -> Result<Option<OtpChallenge>, ServiceError>;

    async fn delete_otp(&self, otp_id: Uuid) -> Result<(), ServiceError>;

    /// Atomically delete challenge `otp_id` of `user_id` if it is still live
    /// at `now` and within `max_attempts`, and mark the user verified.
    /// `false` means someone else consumed or replaced it first.
    async fn consume_otp_and_verify(
        &self,
        user_id: Uuid,
        otp_id: Uuid,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError>;

    /// Session `session_id` if it exists and has not expired at `now`.
    async fn find_live_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, ServiceError>;

    async fn delete_session(&self, session_id: &str) -> Result<(), ServiceError>;

    /// Remove sessions that expired before `now`. Returns how many were removed.
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, ServiceError>;
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    user_ids_by_email: HashMap<String, Uuid>,
    otps: HashMap<Uuid, OtpChallenge>,
    sessions: HashMap<String, Session>,
}

/// Mutex-guarded maps honouring the same atomicity contract as the SQL store.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<std::sync::MutexGuard<'_, Tables>, ServiceError> {
        self.tables
            .lock()
            .map_err(|e| ServiceError::Store(anyhow::anyhow!("In-memory store mutex poisoned: {}", e)))
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        self.tables().map(|_| ())
    }

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        let mut tables = self.tables()?;
        if tables.user_ids_by_email.contains_key(&user.email) {
            return Err(ServiceError::DuplicateEmail);
        }
        tables
            .user_ids_by_email
            .insert(user.email.clone(), user.user_id);
        tables.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let tables = self.tables()?;
        Ok(tables
            .user_ids_by_email
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self.tables()?.users.get(&user_id).cloned())
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let mut tables = self.tables()?;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(ServiceError::UserNotFound)?;
        user.password_hash = password_hash.to_string();
        user.updated_utc = now;
        Ok(())
    }

    async fn upsert_otp(&self, otp: &OtpChallenge) -> Result<(), ServiceError> {
        self.tables()?.otps.insert(otp.user_id, otp.clone());
        Ok(())
    }

    async fn find_otp(&self, user_id: Uuid) -> Result<Option<OtpChallenge>, ServiceError> {
        Ok(self.tables()?.otps.get(&user_id).cloned())
    }

    async fn reserve_otp_attempt(
        &self,
        user_id: Uuid,
        max_attempts: i32,
    ) -> Result<Option<OtpChallenge>, ServiceError> {
        let mut tables = self.tables()?;
        match tables.otps.get_mut(&user_id) {
            Some(otp) if otp.attempt_count < max_attempts => {
                otp.attempt_count += 1;
                Ok(Some(otp.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_otp(&self, otp_id: Uuid) -> Result<(), ServiceError> {
        self.tables()?.otps.retain(|_, o| o.otp_id != otp_id);
        Ok(())
    }

    async fn consume_otp_and_verify(
        &self,
        user_id: Uuid,
        otp_id: Uuid,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut tables = self.tables()?;
        let live = tables.otps.get(&user_id).is_some_and(|o| {
            o.otp_id == otp_id && o.attempt_count <= max_attempts && !o.is_expired(now)
        });
        if !live {
            return Ok(false);
        }
        tables.otps.remove(&user_id);
        match tables.users.get_mut(&user_id) {
            Some(user) => {
                user.is_verified = true;
                user.updated_utc = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError> {
        self.tables()?
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn find_live_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, ServiceError> {
        Ok(self
            .tables()?
            .sessions
            .get(session_id)
            .filter(|s| s.is_valid(now))
            .cloned())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), ServiceError> {
        self.tables()?.sessions.remove(session_id);
        Ok(())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let mut tables = self.tables()?;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.is_valid(now));
        Ok((before - tables.sessions.len()) as u64)
    }
}

/// Store wrappers for exercising the services against misbehaving backends.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Arc;

    /// Delegates to an [`InMemoryStore`], optionally yielding to the
    /// scheduler before every call (like a database round trip) or failing
    /// OTP writes.
    pub(crate) struct ScriptedStore {
        inner: Arc<InMemoryStore>,
        yield_calls: bool,
        fail_otp_writes: bool,
    }

    impl ScriptedStore {
        pub(crate) fn yielding(inner: Arc<InMemoryStore>) -> Self {
            Self {
                inner,
                yield_calls: true,
                fail_otp_writes: false,
            }
        }

        pub(crate) fn failing_otp_writes(inner: Arc<InMemoryStore>) -> Self {
            Self {
                inner,
                yield_calls: false,
                fail_otp_writes: true,
            }
        }

        async fn pause(&self) {
            if self.yield_calls {
                tokio::task::yield_now().await;
            }
        }
    }

    #[async_trait]
    impl CredentialStore for ScriptedStore {
        async fn health_check(&self) -> Result<(), ServiceError> {
            self.pause().await;
            self.inner.health_check().await
        }

        async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
            self.pause().await;
            self.inner.insert_user(user).await
        }

        async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
            self.pause().await;
            self.inner.find_user_by_email(email).await
        }

        async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
            self.pause().await;
            self.inner.find_user_by_id(user_id).await
        }

        async fn update_password_hash(
            &self,
            user_id: Uuid,
            password_hash: &str,
            now: DateTime<Utc>,
        ) -> Result<(), ServiceError> {
            self.pause().await;
            self.inner.update_password_hash(user_id, password_hash, now).await
        }

        async fn upsert_otp(&self, otp: &OtpChallenge) -> Result<(), ServiceError> {
            self.pause().await;
            if self.fail_otp_writes {
                return Err(ServiceError::Store(anyhow::anyhow!("otp_challenges unavailable")));
            }
            self.inner.upsert_otp(otp).await
        }

        async fn find_otp(&self, user_id: Uuid) -> Result<Option<OtpChallenge>, ServiceError> {
            self.pause().await;
            self.inner.find_otp(user_id).await
        }

        async fn reserve_otp_attempt(
            &self,
            user_id: Uuid,
            max_attempts: i32,
        ) -> Result<Option<OtpChallenge>, ServiceError> {
            self.pause().await;
            self.inner.reserve_otp_attempt(user_id, max_attempts).await
        }

        async fn delete_otp(&self, otp_id: Uuid) -> Result<(), ServiceError> {
            self.pause().await;
            self.inner.delete_otp(otp_id).await
        }

        async fn consume_otp_and_verify(
            &self,
            user_id: Uuid,
            otp_id: Uuid,
            max_attempts: i32,
            now: DateTime<Utc>,
        ) -> Result<bool, ServiceError> {
            self.pause().await;
            self.inner
                .consume_otp_and_verify(user_id, otp_id, max_attempts, now)
                .await
        }

        async fn insert_session(&self, session: &Session) -> Result<(), ServiceError> {
            self.pause().await;
            self.inner.insert_session(session).await
        }

        async fn find_live_session(
            &self,
            session_id: &str,
            now: DateTime<Utc>,
        ) -> Result<Option<Session>, ServiceError> {
            self.pause().await;
            self.inner.find_live_session(session_id, now).await
        }

        async fn delete_session(&self, session_id: &str) -> Result<(), ServiceError> {
            self.pause().await;
            self.inner.delete_session(session_id).await
        }

        async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
            self.pause().await;
            self.inner.purge_expired_sessions(now).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(email: &str) -> User {
        User::new(email, "$argon2id$stub".to_string(), Utc::now())
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryStore::new();
        store.insert_user(&user("a@example.com")).await.unwrap();

        let err = store.insert_user(&user("a@example.com")).await.unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateEmail));
    }

    #[tokio::test]
    async fn upsert_replaces_prior_challenge() {
        let store = InMemoryStore::new();
        let u = user("a@example.com");
        store.insert_user(&u).await.unwrap();

        let now = Utc::now();
        let first = OtpChallenge::new(u.user_id, "111111", now, Duration::minutes(10));
        let second = OtpChallenge::new(u.user_id, "222222", now, Duration::minutes(10));
        store.upsert_otp(&first).await.unwrap();
        store.upsert_otp(&second).await.unwrap();

        let current = store.find_otp(u.user_id).await.unwrap().unwrap();
        assert_eq!(current.otp_id, second.otp_id);
        assert!(!store
            .consume_otp_and_verify(u.user_id, first.otp_id, 5, now)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn consume_succeeds_once() {
        let store = InMemoryStore::new();
        let u = user("a@example.com");
        store.insert_user(&u).await.unwrap();
        let now = Utc::now();
        let otp = OtpChallenge::new(u.user_id, "123456", now, Duration::minutes(10));
        store.upsert_otp(&otp).await.unwrap();

        assert!(store
            .consume_otp_and_verify(u.user_id, otp.otp_id, 5, now)
            .await
            .unwrap());
        assert!(!store
            .consume_otp_and_verify(u.user_id, otp.otp_id, 5, now)
            .await
            .unwrap());
        assert!(store.find_user_by_id(u.user_id).await.unwrap().unwrap().is_verified);
    }

    #[tokio::test]
    async fn reservations_stop_at_budget() {
        let store = InMemoryStore::new();
        let u = user("a@example.com");
        store.insert_user(&u).await.unwrap();
        let now = Utc::now();
        let otp = OtpChallenge::new(u.user_id, "123456", now, Duration::minutes(10));
        store.upsert_otp(&otp).await.unwrap();

        let first = store.reserve_otp_attempt(u.user_id, 2).await.unwrap().unwrap();
        assert_eq!(first.attempt_count, 1);
        let second = store.reserve_otp_attempt(u.user_id, 2).await.unwrap().unwrap();
        assert_eq!(second.attempt_count, 2);
        assert!(store.reserve_otp_attempt(u.user_id, 2).await.unwrap().is_none());

        // A challenge past its budget can no longer be consumed.
        assert!(!store
            .consume_otp_and_verify(u.user_id, otp.otp_id, 1, now)
            .await
            .unwrap());

        store.delete_otp(otp.otp_id).await.unwrap();
        assert!(store.find_otp(u.user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_drops_only_expired_sessions() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let live = Session::new(Uuid::new_v4(), None, None, now, Duration::hours(1));
        let stale = Session::new(Uuid::new_v4(), None, None, now - Duration::hours(2), Duration::hours(1));
        store.insert_session(&live).await.unwrap();
        store.insert_session(&stale).await.unwrap();

        assert_eq!(store.purge_expired_sessions(now).await.unwrap(), 1);
        assert!(store.find_live_session(&live.session_id, now).await.unwrap().is_some());
    }
}
