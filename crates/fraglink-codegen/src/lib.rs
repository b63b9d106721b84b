//! Graph compilation: fragment graph in, one executable JavaScript unit out.
//!
//! The compiler walks the dependency graph from an entry fragment,
//! dependencies first, and emits each reachable fragment exactly once inside
//! its own function scope. Exports are hoisted into per-fragment namespace
//! records so dependents can reach them.
//!
//! # Modules
//!
//! - [`compiler`] -- visitation and unit assembly ([`compile`])
//! - [`codegen`] -- text emission for one fragment
//! - [`lower`] -- rewriting `import`/`export` syntax
//! - [`runtime`] -- the prelude every unit starts with
//! - [`sanitize`] -- identifier and literal helpers
//! - [`diagnostics`] -- recoverable compile problems
//!
//! The unit is the body of an async function: it may use top-level `await`
//! and `return`. The sandbox supplies that wrapper.

pub mod codegen;
pub mod compiler;
pub mod diagnostics;
pub mod lower;
pub mod runtime;
pub mod sanitize;

pub use compiler::compile;
pub use diagnostics::CompileDiagnostic;
pub use sanitize::sanitize_identifier;

use fraglink_core::FragmentId;
use serde::{Deserialize, Serialize};

/// Where hoisted exports become visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoistMode {
    /// Per-fragment namespace records; dependents get their direct
    /// dependencies' exports as local bindings.
    #[default]
    Namespaced,
    /// Namespace records plus `globalThis[name]`, last writer wins.
    Global,
}

impl std::str::FromStr for HoistMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "namespaced" => Ok(HoistMode::Namespaced),
            "global" => Ok(HoistMode::Global),
            other => Err(format!(
                "invalid hoist mode '{other}': expected 'namespaced' or 'global'"
            )),
        }
    }
}

/// Options controlling compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Hoisting strategy.
    pub hoist_mode: HoistMode,
    /// Export of the entry fragment to call (and await) after all fragments
    /// are loaded. Its return value becomes the unit's result. `None` runs
    /// the fragments for their side effects only.
    pub entry_export: Option<String>,
    /// Whether to emit a `// fragment: ...` comment above each fragment.
    pub banners: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            hoist_mode: HoistMode::Namespaced,
            entry_export: None,
            banners: true,
        }
    }
}

/// Output of one compilation pass. Produced fresh per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledUnit {
    /// The entry fragment requested.
    pub entry_id: FragmentId,
    /// Emitted source text; empty when the entry does not exist.
    pub source: String,
    /// Fragment ids in emission order (dependencies before dependents).
    pub order: Vec<FragmentId>,
    /// Recoverable problems, in discovery order.
    pub diagnostics: Vec<CompileDiagnostic>,
    /// blake3 hex digest of `source`.
    pub digest: String,
}

impl CompiledUnit {
    /// Builds a unit, computing the digest of `source`.
    pub fn new(
        entry_id: FragmentId,
        source: String,
        order: Vec<FragmentId>,
        diagnostics: Vec<CompileDiagnostic>,
    ) -> Self {
        let digest = blake3::hash(source.as_bytes()).to_hex().to_string();
        CompiledUnit {
            entry_id,
            source,
            order,
            diagnostics,
            digest,
        }
    }

    /// Whether no fragment was emitted.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Whether the entry fragment was missing from the graph.
    pub fn entry_missing(&self) -> bool {
        self.diagnostics.iter().any(CompileDiagnostic::is_missing_entry)
    }
}
