use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrafficError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Timed out after {0}ms waiting for the live buffer lock")]
    LockTimeout(u64),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for TrafficError {
    fn from(err: sqlx::Error) -> Self {
        TrafficError::Store(err.to_string())
    }
}

impl From<regex::Error> for TrafficError {
    fn from(err: regex::Error) -> Self {
        TrafficError::InvalidFilter(err.to_string())
    }
}

impl From<envy::Error> for TrafficError {
    fn from(err: envy::Error) -> Self {
        TrafficError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrafficError>;
