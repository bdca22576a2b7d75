use thiserror::Error;

pub type DcsResult<T> = Result<T, DcsError>;

#[derive(Debug, Error)]
pub enum DcsError {
    #[error("config error: {0}")]
    Config(String),

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
