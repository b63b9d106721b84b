//! Dependency edges between fragments.

use serde::{Deserialize, Serialize};

use crate::id::FragmentId;

/// `source` depends on `target`: the compiled code of `source` may reference
/// symbols exported by `target`, so `target` is emitted first.
///
/// Edges are directed and may form cycles. The `target` of an edge is allowed
/// to be absent from the graph; such edges are kept and reported by the
/// compiler instead of being rejected up front.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Optional edge identity assigned by the graph store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The dependent fragment.
    pub source: FragmentId,
    /// The fragment depended upon.
    pub target: FragmentId,
    /// Optional display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl DependencyEdge {
    /// Creates an unlabelled edge.
    pub fn new(source: impl Into<FragmentId>, target: impl Into<FragmentId>) -> Self {
        DependencyEdge {
            id: None,
            source: source.into(),
            target: target.into(),
            label: None,
        }
    }

    /// Whether the edge points back at its own source.
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}
