//! Parse error type for the static analysis crate.

use serde::Serialize;

/// Why a piece of source could not be analyzed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseError {
    /// The JavaScript grammar could not be loaded into the parser.
    #[error("failed to load JavaScript grammar: {message}")]
    Grammar { message: String },

    /// The parser returned no tree at all.
    #[error("parser produced no syntax tree")]
    NoTree,

    /// The source contains a syntax error. Positions are 1-based.
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
}
