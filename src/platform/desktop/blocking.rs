use anyhow::{anyhow, Result};

/// Runs blocking work (HTTP calls, file IO) off the UI thread.
pub async fn run_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| anyhow!("background task failed: {err}"))
}
