//! Import specifier resolution and edge derivation.
//!
//! Graph producers do not always supply explicit edges; some only store the
//! import entries of each fragment. [`derive_dependency_edges`] converts those
//! imports into [`DependencyEdge`]s up front so the compiler only ever deals
//! with edges.
//!
//! Resolution is by name, not by path: a specifier matches a fragment whose
//! id or file name equals it, or equals it after normalization (relative
//! prefixes, a trailing `/index` and common script extensions removed).
//! Anything else is an external module.

use std::collections::HashMap;

use fraglink_core::{DependencyEdge, Fragment, FragmentGraph, FragmentId};

use crate::analysis::{analyze_source, ImportDecl};

const EXTENSIONS: [&str; 6] = [".js", ".mjs", ".cjs", ".jsx", ".ts", ".tsx"];

/// Maps import specifiers to fragment ids.
#[derive(Debug, Clone, Default)]
pub struct ModuleResolver {
    exact: HashMap<String, FragmentId>,
    normalized: HashMap<String, FragmentId>,
}

impl ModuleResolver {
    /// Builds a resolver over the given fragments. Ids take precedence over
    /// file names; earlier fragments win ties.
    pub fn new<'a, I>(fragments: I) -> Self
    where
        I: IntoIterator<Item = &'a Fragment>,
    {
        let fragments: Vec<&Fragment> = fragments.into_iter().collect();
        let mut resolver = ModuleResolver::default();

        for fragment in &fragments {
            resolver.register(fragment.id.as_str(), &fragment.id);
        }
        for fragment in &fragments {
            if !fragment.file_name.is_empty() {
                resolver.register(&fragment.file_name, &fragment.id);
            }
        }
        resolver
    }

    /// Builds a resolver over every fragment of a graph.
    pub fn from_graph(graph: &FragmentGraph) -> Self {
        Self::new(graph.fragments())
    }

    fn register(&mut self, key: &str, id: &FragmentId) {
        self.exact
            .entry(key.to_string())
            .or_insert_with(|| id.clone());
        let normalized = normalize(key);
        if !normalized.is_empty() {
            self.normalized.entry(normalized).or_insert_with(|| id.clone());
        }
    }

    /// Fragment id an import specifier refers to, if any.
    pub fn resolve(&self, specifier: &str) -> Option<&FragmentId> {
        let specifier = specifier.trim();
        self.exact
            .get(specifier)
            .or_else(|| self.normalized.get(&normalize(specifier)))
    }
}

/// Strips relative prefixes, a trailing `/index`, and a script extension.
fn normalize(specifier: &str) -> String {
    let mut rest = specifier.trim();
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix("../") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else {
            break;
        }
    }
    for ext in EXTENSIONS {
        if let Some(stripped) = rest.strip_suffix(ext) {
            rest = stripped;
            break;
        }
    }
    if let Some(stripped) = rest.strip_suffix("/index") {
        rest = stripped;
    }
    rest.to_string()
}

/// What an entry of a fragment's `imports` list is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportEntry {
    /// One or more ES `import` declarations and nothing else.
    Statements(Vec<ImportDecl>),
    /// A bare module specifier or fragment id (`"./util.js"`, `"lodash"`).
    Specifier(String),
    /// Any other statement text (e.g. `const fs = require("fs");`).
    Verbatim,
}

/// Classifies one import entry.
pub fn classify_import_entry(entry: &str) -> ImportEntry {
    let trimmed = entry.trim();
    if trimmed.is_empty() {
        return ImportEntry::Verbatim;
    }

    if trimmed.starts_with("import") {
        if let Ok(analysis) = analyze_source(trimmed) {
            if !analysis.imports.is_empty() && analysis.imports.len() == analysis.statement_count {
                return ImportEntry::Statements(analysis.imports);
            }
        }
    }

    let is_specifier = !trimmed
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, ';' | '(' | ')' | '=' | '{' | '}' | ','));
    if is_specifier {
        let unquoted = trimmed.trim_matches(|c| c == '"' || c == '\'');
        return ImportEntry::Specifier(unquoted.to_string());
    }
    ImportEntry::Verbatim
}

/// Every module specifier a fragment refers to: its import entries first,
/// then the imports and re-exports found in its code.
fn fragment_specifiers(fragment: &Fragment) -> Vec<String> {
    let mut specifiers = Vec::new();
    for entry in &fragment.imports {
        match classify_import_entry(entry) {
            ImportEntry::Statements(decls) => {
                specifiers.extend(decls.into_iter().map(|d| d.source));
            }
            ImportEntry::Specifier(spec) => specifiers.push(spec),
            ImportEntry::Verbatim => {}
        }
    }

    match analyze_source(&fragment.code) {
        Ok(analysis) => {
            specifiers.extend(analysis.imports.into_iter().map(|d| d.source));
            specifiers.extend(
                analysis
                    .exports
                    .iter()
                    .filter_map(|e| e.reexport_source().map(str::to_string)),
            );
        }
        Err(err) => {
            tracing::debug!(
                fragment = %fragment.id,
                error = %err,
                "fragment code not analyzable, using import entries only"
            );
        }
    }
    specifiers
}

/// Derives dependency edges from the imports of every fragment.
///
/// Edges follow fragment order, then specifier order. Specifiers that do not
/// resolve to a fragment (external modules) and self-references produce no
/// edge; each (source, target) pair appears once and is labelled with the
/// first specifier that produced it.
pub fn derive_dependency_edges(fragments: &[Fragment]) -> Vec<DependencyEdge> {
    let resolver = ModuleResolver::new(fragments);
    let mut edges: Vec<DependencyEdge> = Vec::new();

    for fragment in fragments {
        for specifier in fragment_specifiers(fragment) {
            let Some(target) = resolver.resolve(&specifier) else {
                continue;
            };
            if *target == fragment.id {
                continue;
            }
            let duplicate = edges
                .iter()
                .any(|e| e.source == fragment.id && e.target == *target);
            if duplicate {
                continue;
            }
            edges.push(DependencyEdge {
                id: None,
                source: fragment.id.clone(),
                target: target.clone(),
                label: Some(specifier),
            });
        }
    }

    tracing::debug!(
        fragments = fragments.len(),
        edges = edges.len(),
        "derived dependency edges from imports"
    );
    edges
}
