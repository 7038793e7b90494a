//! Deadlines for network round-trips.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::RemcError;

/// Run `operation` with a deadline. `None` means no deadline.
pub async fn with_timeout<T, Fut>(
    timeout: Option<Duration>,
    operation: Fut,
) -> Result<T, RemcError>
where
    Fut: Future<Output = T>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, operation).await.map_err(|_| {
            debug!(?limit, "Deadline elapsed");
            RemcError::Timeout(limit)
        }),
        None => Ok(operation.await),
    }
}
