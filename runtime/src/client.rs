use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("No container runtime available. Please install Docker or Podman to run the test cluster.")]
    NoRuntimeAvailable,

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to {operation} container '{container}': {reason}")]
    CommandFailed {
        operation: String,
        container: String,
        reason: String,
    },

    #[error("Container operation timed out after {timeout:?}: {operation} {container}")]
    OperationTimeout {
        operation: String,
        container: String,
        timeout: Duration,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Request/response access to the container runtime.
///
/// Implementations are shared by reference across every container group of a
/// session, so they must not rely on exclusive access.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    async fn start(&self, name: &str) -> RuntimeResult<()>;

    /// Stop a container, killing it once `grace_period` has elapsed.
    /// A zero grace period kills immediately.
    async fn stop(&self, name: &str, grace_period: Duration) -> RuntimeResult<()>;

    async fn restart(&self, name: &str, grace_period: Duration) -> RuntimeResult<()>;

    async fn fetch_logs(&self, name: &str) -> RuntimeResult<String>;

    fn runtime_name(&self) -> &'static str;
}
