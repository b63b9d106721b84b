//! Response types for compile-and-execute requests.

use fraglink_codegen::CompileDiagnostic;
use fraglink_sandbox::{ExecutionOutcome, ExecutionResult};
use serde::Serialize;
use uuid::Uuid;

/// Response for one execution request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    /// Correlates this response with the `execute` tracing span.
    pub execution_id: Uuid,
    /// The caller-facing result.
    pub result: ExecutionResult,
    /// Detailed outcome, including the limit that was hit if any.
    pub outcome: ExecutionOutcome,
    /// Recoverable problems found while compiling.
    pub diagnostics: Vec<CompileDiagnostic>,
    /// blake3 digest of the compiled unit.
    pub digest: String,
    /// Wall-clock time spent compiling and executing, in milliseconds.
    pub elapsed_ms: u64,
}

impl ExecutionResponse {
    pub fn is_success(&self) -> bool {
        self.result.success
    }
}
