//! Error types for apipulse

use thiserror::Error;

/// Main error type for apipulse
#[derive(Error, Debug)]
pub enum ApipulseError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Broker error: {0}")]
    Broker(#[from] redis::RedisError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Invalid argument: {0}")]
    Argument(String),
}

pub type Result<T> = std::result::Result<T, ApipulseError>;
