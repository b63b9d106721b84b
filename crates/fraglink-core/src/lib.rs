//! Data model for fragment graphs.
//!
//! A program is a set of [`Fragment`]s (pieces of JavaScript source with their
//! imports and exports) connected by [`DependencyEdge`]s. [`FragmentGraph`] is
//! the validated, queryable form the compiler walks; [`CompileRequest`] is the
//! wire shape a graph store hands over.

pub mod edge;
pub mod error;
pub mod fragment;
pub mod graph;
pub mod id;

// Re-export commonly used types
pub use edge::DependencyEdge;
pub use error::CoreError;
pub use fragment::{CompileRequest, Fragment};
pub use graph::FragmentGraph;
pub use id::FragmentId;
