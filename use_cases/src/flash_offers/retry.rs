use std::future::Future;
use std::time::Duration;

/// Runs a storage read, and if it fails, runs it exactly once more after `delay`.
/// The second error is returned as is.
pub async fn retry_once<T, F, Fut>(
    operation: &'static str,
    delay: Duration,
    mut attempt: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    match attempt().await {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::warn!(operation, "Storage read failed, retrying once: {err:?}");
            tokio::time::sleep(delay).await;
            attempt().await
        }
    }
}
