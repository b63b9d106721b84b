//! Recoverable problems found while compiling a graph.
//!
//! Compilation never fails outright: a missing fragment drops its branch, a
//! cycle is cut by the visited-set, unparseable code is emitted verbatim. Each
//! of these leaves a [`CompileDiagnostic`] in the compiled unit.

use std::fmt;

use fraglink_core::FragmentId;
use serde::{Deserialize, Serialize};

/// A recoverable compile problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompileDiagnostic {
    /// A fragment id (the entry, or an edge target) has no fragment.
    MissingFragment {
        id: FragmentId,
        /// The dependent whose edge pointed here; `None` for the entry.
        referenced_by: Option<FragmentId>,
    },
    /// An edge leads back to a fragment still being compiled; it was skipped.
    Cycle { from: FragmentId, to: FragmentId },
    /// The fragment's code could not be parsed and was emitted verbatim.
    UnparsedFragment { id: FragmentId, message: String },
    /// Two fragments export the same name into one scope; the later wins.
    ExportCollision {
        name: String,
        previous: FragmentId,
        replaced_by: FragmentId,
        /// The dependent whose bindings collided; `None` for the global scope.
        dependent: Option<FragmentId>,
    },
    /// An export name that cannot be referenced as an identifier was skipped.
    InvalidExportName { id: FragmentId, name: String },
}

impl CompileDiagnostic {
    /// Whether this reports the entry fragment itself as missing.
    pub fn is_missing_entry(&self) -> bool {
        matches!(
            self,
            CompileDiagnostic::MissingFragment {
                referenced_by: None,
                ..
            }
        )
    }
}

impl fmt::Display for CompileDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileDiagnostic::MissingFragment {
                id,
                referenced_by: Some(from),
            } => write!(f, "fragment '{from}' depends on missing fragment '{id}'"),
            CompileDiagnostic::MissingFragment {
                id,
                referenced_by: None,
            } => write!(f, "entry fragment '{id}' not found"),
            CompileDiagnostic::Cycle { from, to } => {
                write!(f, "dependency cycle: '{from}' -> '{to}' skipped")
            }
            CompileDiagnostic::UnparsedFragment { id, message } => {
                write!(f, "fragment '{id}' emitted verbatim: {message}")
            }
            CompileDiagnostic::ExportCollision {
                name,
                previous,
                replaced_by,
                dependent,
            } => match dependent {
                Some(dependent) => write!(
                    f,
                    "'{name}' exported by both '{previous}' and '{replaced_by}'; \
                     '{dependent}' sees the one from '{replaced_by}'"
                ),
                None => write!(
                    f,
                    "global '{name}' from '{previous}' overwritten by '{replaced_by}'"
                ),
            },
            CompileDiagnostic::InvalidExportName { id, name } => {
                write!(f, "fragment '{id}' exports '{name}', which is not an identifier")
            }
        }
    }
}
