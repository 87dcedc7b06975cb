use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Invalid log data: {0}")]
    InvalidData(String),

    #[error("Audit encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Audit sink error: {0}")]
    Sink(String),

    #[error("Audit queue is full")]
    QueueFull,

    #[error("Audit dispatcher is shut down")]
    Closed,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;
