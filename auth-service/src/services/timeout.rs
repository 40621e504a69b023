use std::future::Future;
use std::time::Duration;

use crate::services::ServiceError;

/// Bound a dependency call. `what` names the dependency in the error and log.
pub async fn with_timeout<T, F>(
    what: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(
                dependency = what,
                timeout_ms = limit.as_millis() as u64,
                "Dependency call timed out"
            );
            Err(ServiceError::Timeout(what))
        }
    }
}
