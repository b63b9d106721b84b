use thiserror::Error;

/// Host-side failures while setting up a sandbox.
///
/// Failures of the guest program are never errors at this level; they are
/// reported as an [`ExecutionOutcome`](crate::ExecutionOutcome).
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to allocate runtime: {0}")]
    RuntimeAllocation(String),

    #[error("failed to allocate context: {0}")]
    ContextAllocation(String),

    #[error("failed to install sandbox globals: {0}")]
    Bootstrap(String),

    #[error("module error: {0}")]
    Module(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
