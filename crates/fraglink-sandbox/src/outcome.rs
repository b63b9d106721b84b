//! Results of a sandboxed execution.

use serde::{Deserialize, Serialize};

use crate::state::ExecutionPhase;

/// How an execution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The unit settled successfully. `value` is the rendered result, empty
    /// when the unit produced `undefined`.
    Completed { value: String },
    /// The unit threw or rejected (including syntax errors and stack
    /// overflow).
    Threw { error: String },
    /// The unit asked for a capability outside the allowlist.
    CapabilityDenied { error: String },
    /// The wall-clock limit elapsed before the unit settled.
    TimedOut { limit_ms: u64 },
    /// An allocation failed against the memory ceiling.
    MemoryExceeded { limit_bytes: usize },
    /// The host failed; the guest never got a chance to run to completion.
    Internal { error: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed { .. })
    }

    /// Machine-readable error code, `None` on success.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            ExecutionOutcome::Completed { .. } => None,
            ExecutionOutcome::Threw { .. } => Some("RUNTIME_THROW"),
            ExecutionOutcome::CapabilityDenied { .. } => Some("CAPABILITY_DENIED"),
            ExecutionOutcome::TimedOut { .. } => Some("TIMEOUT"),
            ExecutionOutcome::MemoryExceeded { .. } => Some("MEMORY_EXCEEDED"),
            ExecutionOutcome::Internal { .. } => Some("INTERNAL_ERROR"),
        }
    }

    /// The rendered value on success, the error text otherwise.
    pub fn message(&self) -> String {
        match self {
            ExecutionOutcome::Completed { value } => value.clone(),
            ExecutionOutcome::Threw { error }
            | ExecutionOutcome::CapabilityDenied { error }
            | ExecutionOutcome::Internal { error } => error.clone(),
            ExecutionOutcome::TimedOut { limit_ms } => {
                format!("TimeoutError: execution exceeded the {limit_ms} ms time limit")
            }
            ExecutionOutcome::MemoryExceeded { limit_bytes } => {
                format!("MemoryExceededError: execution exceeded the {limit_bytes} byte memory limit")
            }
        }
    }

    /// The lifecycle phase this outcome corresponds to.
    pub fn terminal_phase(&self) -> ExecutionPhase {
        match self {
            ExecutionOutcome::Completed { .. } => ExecutionPhase::Completed,
            ExecutionOutcome::TimedOut { .. } => ExecutionPhase::TimedOut,
            ExecutionOutcome::MemoryExceeded { .. } => ExecutionPhase::MemoryExceeded,
            ExecutionOutcome::Threw { .. }
            | ExecutionOutcome::CapabilityDenied { .. }
            | ExecutionOutcome::Internal { .. } => ExecutionPhase::Threw,
        }
    }
}

/// Everything observed during one execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub outcome: ExecutionOutcome,
    pub stdout: String,
    pub stderr: String,
    /// Lifecycle phases in the order they were entered; ends in `Disposed`.
    pub phases: Vec<ExecutionPhase>,
    pub elapsed_ms: u64,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// The caller-facing result shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub result_or_error: String,
}

impl ExecutionResult {
    /// A failed result produced by the host rather than by an execution.
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            stdout: String::new(),
            stderr: format!("{message}\n"),
            result_or_error: message,
        }
    }
}

impl From<ExecutionReport> for ExecutionResult {
    fn from(report: ExecutionReport) -> Self {
        Self {
            success: report.outcome.is_success(),
            result_or_error: report.outcome.message(),
            stdout: report.stdout,
            stderr: report.stderr,
        }
    }
}
