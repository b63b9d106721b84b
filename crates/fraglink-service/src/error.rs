//! Façade error types with machine-readable code mapping.
//!
//! Only precondition violations are errors here. Anything that goes wrong
//! once the unit is running is reported inside the execution result.

use fraglink_core::CoreError;
use serde::Serialize;

use crate::config::ConfigError;

/// Structured error detail for callers that render errors as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "BAD_REQUEST").
    pub code: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// Errors returned before any code runs.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request carried no fragments at all.
    #[error("graph has no fragments")]
    EmptyGraph,

    /// The entry id names no fragment in the request.
    #[error("entry fragment not found: {0}")]
    EntryNotFound(String),

    /// The fragments or edges do not form a valid graph.
    #[error("invalid graph: {0}")]
    InvalidGraph(#[from] CoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ServiceError {
    /// Machine-readable code, in the same vocabulary as HTTP-facing errors.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::EntryNotFound(_) => "NOT_FOUND",
            ServiceError::EmptyGraph | ServiceError::InvalidGraph(_) => "BAD_REQUEST",
            ServiceError::Config(_) => "INTERNAL_ERROR",
        }
    }

    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_the_error_kind() {
        assert_eq!(ServiceError::EmptyGraph.code(), "BAD_REQUEST");
        assert_eq!(ServiceError::EntryNotFound("a".into()).code(), "NOT_FOUND");
        let duplicate = ServiceError::from(CoreError::DuplicateFragment { id: "a".into() });
        assert_eq!(duplicate.code(), "BAD_REQUEST");
    }

    #[test]
    fn detail_serializes_code_and_message() {
        let json = serde_json::to_value(ServiceError::EntryNotFound("main".into()).detail()).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["message"], "entry fragment not found: main");
    }
}
