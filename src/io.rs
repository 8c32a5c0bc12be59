use crate::error::{AppError, AppResult};
use crate::logging::{log, LogLevel};
use crate::utils;
use serde::Serialize;
use std::path::Path;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

pub fn map_io_error(error: std::io::Error, path: &Path) -> AppError {
    AppError::Io(format!("I/O error at path '{}': {}", path.display(), error))
}

pub async fn ensure_dir(dir: &Path) -> AppResult<()> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| map_io_error(e, dir))
}

pub async fn write_file_async(fpath: &Path, data: &[u8]) -> AppResult<()> {
    let mut file = File::create(fpath)
        .await
        .map_err(|e| map_io_error(e, fpath))?;
    file.write_all(data)
        .await
        .map_err(|e| map_io_error(e, fpath))?;
    file.flush().await.map_err(|e| map_io_error(e, fpath))?;

    Ok(())
}

/// Pretty-prints `data` off the async workers and writes it. A partial file is removed on failure.
pub async fn save_json<T>(fpath: &Path, data: T, log_ctx: &str) -> AppResult<()>
where
    T: Serialize + Send + Sync + 'static,
{
    let json_bytes =
        utils::run_blocking(move || serde_json::to_vec_pretty(&data).map_err(AppError::from))
            .await
            .map_err(|e| {
                log(
                    LogLevel::Error,
                    &format!(
                        "Save JSON ({}) FAIL - Serialize/Task Error: {}. File: '{}'",
                        log_ctx,
                        e,
                        fpath.display()
                    ),
                );
                e
            })?;

    if let Err(e) = write_file_async(fpath, &json_bytes).await {
        log(
            LogLevel::Error,
            &format!(
                "Save JSON ({}) FAIL - Write Error: {}. File: '{}'",
                log_ctx,
                e,
                fpath.display()
            ),
        );

        if fs::try_exists(fpath).await.unwrap_or(false) {
            let _ = fs::remove_file(fpath).await;
        }

        return Err(e);
    }
    Ok(())
}

pub async fn save_text(fpath: &Path, text: &str, log_ctx: &str) -> AppResult<()> {
    write_file_async(fpath, text.as_bytes()).await.map_err(|e| {
        log(
            LogLevel::Error,
            &format!("Save ({}) FAIL: {}", log_ctx, e),
        );
        e
    })
}
