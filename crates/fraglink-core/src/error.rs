//! Core error types for fraglink-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! ways a fragment graph can be malformed at construction time.

use crate::id::FragmentId;
use thiserror::Error;

/// Core errors produced by the fraglink-core crate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Two fragments share the same id.
    #[error("duplicate fragment id: '{id}'")]
    DuplicateFragment { id: FragmentId },

    /// A fragment id was not found in the graph.
    #[error("fragment not found: '{id}'")]
    FragmentNotFound { id: FragmentId },

    /// An edge failed validation.
    #[error("invalid edge: {reason}")]
    InvalidEdge { reason: String },

    /// A fragment failed validation.
    #[error("invalid fragment: {reason}")]
    InvalidFragment { reason: String },
}
