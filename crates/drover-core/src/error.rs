// Drover Error Types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DroverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Supervisor error: {0}")]
    Supervisor(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, DroverError>;
