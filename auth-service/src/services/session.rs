use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::{SessionConfig, TimeoutConfig};
use crate::models::Session;
use crate::services::timeout::with_timeout;
use crate::services::{Clock, CredentialStore, ServiceError};

/// Server-side sessions keyed by an opaque random id.
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    lifetime: ChronoDuration,
    store_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        config: &SessionConfig,
        timeouts: &TimeoutConfig,
    ) -> Self {
        Self {
            store,
            clock,
            lifetime: ChronoDuration::hours(config.expiry_hours),
            store_timeout: timeouts.store(),
        }
    }

    #[tracing::instrument(skip_all, fields(user_id = %user_id))]
    pub async fn open(
        &self,
        user_id: Uuid,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Result<Session, ServiceError> {
        let session = Session::new(
            user_id,
            user_agent,
            ip_address,
            self.clock.now(),
            self.lifetime,
        );
        with_timeout(
            "store",
            self.store_timeout,
            self.store.insert_session(&session),
        )
        .await?;

        tracing::info!(expires_at = %session.expiry_utc, "Session opened");
        Ok(session)
    }

    pub async fn resolve(&self, session_id: &str) -> Result<Session, ServiceError> {
        with_timeout(
            "store",
            self.store_timeout,
            self.store.find_live_session(session_id, self.clock.now()),
        )
        .await?
        .ok_or(ServiceError::SessionNotFound)
    }

    /// Logout. Closing an unknown or already closed session succeeds.
    pub async fn close(&self, session_id: &str) -> Result<(), ServiceError> {
        with_timeout(
            "store",
            self.store_timeout,
            self.store.delete_session(session_id),
        )
        .await?;
        tracing::info!("Session closed");
        Ok(())
    }

    /// Drop expired rows. Resolution already ignores them; this only reclaims space.
    pub async fn purge_expired(&self) -> Result<u64, ServiceError> {
        with_timeout(
            "store",
            self.store_timeout,
            self.store.purge_expired_sessions(self.clock.now()),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{InMemoryStore, ManualClock};

    fn registry() -> (SessionRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let registry = SessionRegistry::new(
            Arc::new(InMemoryStore::new()),
            clock.clone(),
            &SessionConfig { expiry_hours: 24 },
            &TimeoutConfig {
                store_seconds: 5,
                email_seconds: 5,
            },
        );
        (registry, clock)
    }

    #[tokio::test]
    async fn open_then_resolve() {
        let (registry, _) = registry();
        let user_id = Uuid::new_v4();
        let session = registry
            .open(user_id, Some("curl/8".to_string()), Some("10.0.0.1".to_string()))
            .await
            .unwrap();

        let resolved = registry.resolve(&session.session_id).await.unwrap();
        assert_eq!(resolved.user_id, user_id);
        assert_eq!(resolved.user_agent.as_deref(), Some("curl/8"));
    }

    #[tokio::test]
    async fn expired_session_does_not_resolve() {
        let (registry, clock) = registry();
        let session = registry.open(Uuid::new_v4(), None, None).await.unwrap();

        clock.advance(ChronoDuration::hours(24));
        assert!(matches!(
            registry.resolve(&session.session_id).await,
            Err(ServiceError::SessionNotFound)
        ));
        assert_eq!(registry.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (registry, _) = registry();
        let session = registry.open(Uuid::new_v4(), None, None).await.unwrap();

        registry.close(&session.session_id).await.unwrap();
        registry.close(&session.session_id).await.unwrap();
        assert!(matches!(
            registry.resolve(&session.session_id).await,
            Err(ServiceError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (registry, _) = registry();
        assert!(matches!(
            registry.resolve("nope").await,
            Err(ServiceError::SessionNotFound)
        ));
    }
}
