//! Fragment identifiers.
//!
//! Fragment ids are caller-chosen strings (graph stores use labels such as
//! `"main"` or uuids), so unlike numeric graph indices they are wrapped in a
//! string newtype. The petgraph `NodeIndex` of a fragment is an internal
//! detail of [`FragmentGraph`](crate::graph::FragmentGraph).

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identity of a fragment within one graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentId(pub String);

impl FragmentId {
    /// Creates an id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        FragmentId(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FragmentId {
    fn from(id: &str) -> Self {
        FragmentId(id.to_string())
    }
}

impl From<String> for FragmentId {
    fn from(id: String) -> Self {
        FragmentId(id)
    }
}

impl Borrow<str> for FragmentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FragmentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
