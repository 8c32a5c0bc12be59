use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug, Clone)]
pub enum AppError {
    #[error("Catalog unreadable at '{path}': {reason}")]
    CatalogUnreadable { path: String, reason: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Persist error: {0}")]
    Persist(String),
    #[error("Invalid entity id: '{0}'")]
    InvalidEntityId(String),
    #[error("Filesystem I/O error: {0}")]
    Io(String),
    #[error("JSON serialization error: {0}")]
    SerdeSerialize(String),
    #[error("Invalid argument provided: {0}")]
    Argument(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Tokio task join error: {0}")]
    JoinError(String),
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Transport(e.to_string())
    }
}
impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}
impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() || e.is_eof() || e.is_syntax() || e.is_data() {
            AppError::Decode(e.to_string())
        } else {
            AppError::SerdeSerialize(e.to_string())
        }
    }
}
impl From<JoinError> for AppError {
    fn from(e: JoinError) -> Self {
        AppError::JoinError(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn catalog<P: AsRef<std::path::Path>, S: Into<String>>(path: P, reason: S) -> AppError {
        AppError::CatalogUnreadable {
            path: path.as_ref().display().to_string(),
            reason: reason.into(),
        }
    }

    /// Errors scoped to a single entity; the task retries these and the run carries on.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Transport(_) | AppError::Decode(_) | AppError::Persist(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::CatalogUnreadable { .. } | AppError::Argument(_) | AppError::ConfigError(_)
        )
    }
}
