use thiserror::Error;

/// Internal plumbing error type. Boundary-facing code should classify this
/// via [`crate::classifier`] rather than propagate it directly.
#[derive(Error, Debug)]
pub enum DbOpsError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("task {0} is not cancellable in its current state")]
    TaskNotCancellable(String),

    #[error("queue is full")]
    QueueFull,

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("pressure bus error: {0}")]
    Pressure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Clone for DbOpsError {
    fn clone(&self) -> Self {
        match self {
            DbOpsError::Configuration(s) => DbOpsError::Configuration(s.clone()),
            DbOpsError::InvalidArgument(s) => DbOpsError::InvalidArgument(s.clone()),
            DbOpsError::NotFound(s) => DbOpsError::NotFound(s.clone()),
            DbOpsError::TaskNotFound(s) => DbOpsError::TaskNotFound(s.clone()),
            DbOpsError::TaskNotCancellable(s) => DbOpsError::TaskNotCancellable(s.clone()),
            DbOpsError::QueueFull => DbOpsError::QueueFull,
            DbOpsError::OperationFailed(s) => DbOpsError::OperationFailed(s.clone()),
            DbOpsError::Serialization(e) => DbOpsError::Internal(e.to_string()),
            DbOpsError::LockPoisoned(s) => DbOpsError::LockPoisoned(s.clone()),
            DbOpsError::Pressure(s) => DbOpsError::Pressure(s.clone()),
            DbOpsError::Internal(s) => DbOpsError::Internal(s.clone()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbOpsError>;
