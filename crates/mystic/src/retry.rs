use std::{future::Future, time::Duration};

/// Runs `op` up to `max_attempts` times, sleeping between attempts with a
/// doubling delay. The last error is returned unchanged.
pub async fn retry_with_backoff<T, E, F, Fut>(
    max_attempts: usize,
    base_delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = base_delay;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts => {
                tracing::warn!(%error, attempt, "retrying after error");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
