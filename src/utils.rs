use crate::error::{AppError, AppResult};
use std::time::Duration;
use tokio::task;
use tokio_util::sync::CancellationToken;

pub async fn run_blocking<F, T>(func: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    match task::spawn_blocking(func).await {
        Ok(Ok(res)) => Ok(res),
        Ok(Err(e)) => Err(e),
        Err(e) => Err(AppError::from(e)),
    }
}

/// Sleeps for `duration` unless the token fires first. Returns `false` when cancelled.
pub async fn sleep_or_cancel(duration: Duration, token: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !token.is_cancelled();
    }
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Truncates on a char boundary, appending `...` when anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Body snippet for error messages; invalid UTF-8 is replaced.
pub fn snippet(bytes: &[u8], max_chars: usize) -> String {
    truncate_chars(String::from_utf8_lossy(bytes).trim(), max_chars)
}
