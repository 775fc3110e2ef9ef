use thiserror::Error;

pub use anyhow::Context;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    Chrono(#[from] chrono::ParseError),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("storage is not configured")]
    StorageUnavailable,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn message<T: Into<String>>(msg: T) -> Self {
        AppError::Message(msg.into())
    }

    pub fn upstream<T: Into<String>>(msg: T) -> Self {
        AppError::Upstream(msg.into())
    }

    pub fn storage<T: Into<String>>(msg: T) -> Self {
        AppError::Storage(msg.into())
    }

    /// True for failures that originate in the history store rather than the live path.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            AppError::Storage(_) | AppError::StorageUnavailable | AppError::Csv(_)
        )
    }
}
