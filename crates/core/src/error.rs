use thiserror::Error;

pub type OmniResult<T> = Result<T, OmniError>;

#[derive(Error, Debug)]
pub enum OmniError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("Transmission error: {0}")]
    Transmission(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
