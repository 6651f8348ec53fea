use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Permission denied: {reason}")]
    PermissionDenied {
        capability: String,
        resource: Option<String>,
        reason: String,
    },

    #[error("Sandbox is not initialized")]
    NotInitialized,

    #[error("Sandbox has been disposed")]
    Disposed,

    #[error("Execution timed out after {0}ms")]
    Timeout(u64),

    #[error("Execution engine error: {0}")]
    Engine(String),

    #[error("Invalid permission set: {0}")]
    InvalidPermissionSet(String),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SandboxResult<T> = Result<T, SandboxError>;
