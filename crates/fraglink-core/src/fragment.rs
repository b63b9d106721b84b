//! Fragments and the compile request wire shape.
//!
//! Field names serialize in camelCase (`fileName`, `exportedFunctions`,
//! `entryId`) so graph stores written in other languages can hand over their
//! JSON unchanged.

use serde::{Deserialize, Serialize};

use crate::edge::DependencyEdge;
use crate::id::FragmentId;

/// A unit of JavaScript source code plus its import/export metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    /// Unique id; also used as the display label.
    pub id: FragmentId,
    /// Display name (e.g. `"utils/math.js"`). Also accepted as an alias when
    /// import specifiers are resolved to fragments.
    #[serde(default)]
    pub file_name: String,
    /// JavaScript source text. May contain `import`/`export` declarations.
    #[serde(default)]
    pub code: String,
    /// Import entries emitted ahead of the code: raw import statements or
    /// bare specifiers / fragment ids, depending on who produced the graph.
    #[serde(default)]
    pub imports: Vec<String>,
    /// Symbols this fragment makes visible to dependents. When empty, the
    /// compiler falls back to the names extracted from `code`.
    #[serde(default)]
    pub exported_functions: Vec<String>,
    /// Informational lint results attached by the producer; never consumed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lint_errors: Vec<serde_json::Value>,
}

impl Fragment {
    /// Creates a fragment with the given id and code, using the id as file name.
    pub fn new(id: impl Into<FragmentId>, code: impl Into<String>) -> Self {
        let id = id.into();
        Fragment {
            file_name: id.0.clone(),
            id,
            code: code.into(),
            imports: Vec::new(),
            exported_functions: Vec::new(),
            lint_errors: Vec::new(),
        }
    }

    /// Builder-style setter for the display file name.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Builder-style setter for the import entries.
    pub fn with_imports<I, S>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imports = imports.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style setter for the declared export list.
    pub fn with_exports<I, S>(mut self, exports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exported_functions = exports.into_iter().map(Into::into).collect();
        self
    }

    /// Name to show in logs and banners: the file name, or the id when unset.
    pub fn display_name(&self) -> &str {
        if self.file_name.is_empty() {
            self.id.as_str()
        } else {
            &self.file_name
        }
    }
}

/// Everything needed to compile (and run) one entry fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    /// All fragments of the graph, in store order.
    pub fragments: Vec<Fragment>,
    /// Explicit dependency edges. `None` means "derive them from each
    /// fragment's imports" before compiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<DependencyEdge>>,
    /// The fragment to execute.
    pub entry_id: FragmentId,
}

impl CompileRequest {
    /// Creates a request with explicit edges.
    pub fn new(
        fragments: Vec<Fragment>,
        edges: Vec<DependencyEdge>,
        entry_id: impl Into<FragmentId>,
    ) -> Self {
        CompileRequest {
            fragments,
            edges: Some(edges),
            entry_id: entry_id.into(),
        }
    }

    /// Creates a request whose edges are derived from fragment imports.
    pub fn from_imports(fragments: Vec<Fragment>, entry_id: impl Into<FragmentId>) -> Self {
        CompileRequest {
            fragments,
            edges: None,
            entry_id: entry_id.into(),
        }
    }
}
