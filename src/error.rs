use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetlockError {
    #[error("workload '{0}' is not running or has no address - start it first, then retry")]
    WorkloadNotRunning(String),

    #[error("insufficient privilege to {0} - re-run with elevated privileges (e.g. sudo)")]
    InsufficientPrivilege(String),

    #[error("container engine error: {0}")]
    Engine(String),

    #[error("firewall error: {0}")]
    Firewall(String),

    #[error("command execution failed: {0}")]
    ExecutionFailed(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NetlockError>;
