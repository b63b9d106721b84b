//! Structured import/export declarations of a piece of source.
//!
//! Only top-level statements are inspected; `import` and `export` cannot
//! appear anywhere else in valid JavaScript. Every declaration carries the
//! byte span of its statement so the compiler can splice rewritten text into
//! the original source.

use std::ops::Range;

use tree_sitter::Node;

use crate::error::ParseError;
use crate::syntax;

/// One name bound by an `import` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// Name exported by the imported module.
    pub imported: String,
    /// Local name it is bound to.
    pub local: String,
}

/// A top-level `import` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportDecl {
    /// Module specifier, quotes removed.
    pub source: String,
    /// `import d from "m"`
    pub default: Option<String>,
    /// `import * as ns from "m"`
    pub namespace: Option<String>,
    /// `import { a, b as c } from "m"`
    pub named: Vec<ImportBinding>,
    /// Byte span of the whole statement.
    pub span: Range<usize>,
}

impl ImportDecl {
    /// Side-effect-only import (`import "m"`).
    pub fn is_bare(&self) -> bool {
        self.default.is_none() && self.namespace.is_none() && self.named.is_empty()
    }
}

/// One name made visible by an export clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBinding {
    /// Local (or, for re-exports, upstream) name.
    pub local: String,
    /// Name dependents see.
    pub exported: String,
}

/// A top-level `export` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportDecl {
    /// `export function f() {}`, `export const a = 1, b = 2`,
    /// `export default function f() {}`.
    Declaration {
        names: Vec<String>,
        default: bool,
        span: Range<usize>,
        declaration: Range<usize>,
    },
    /// `export default <expression>`.
    DefaultValue {
        span: Range<usize>,
        value: Range<usize>,
    },
    /// `export { a, b as c }` and `export { a } from "m"`.
    Clause {
        bindings: Vec<ExportBinding>,
        source: Option<String>,
        span: Range<usize>,
    },
    /// `export * as ns from "m"`.
    Namespace {
        exported: String,
        source: String,
        span: Range<usize>,
    },
    /// `export * from "m"`.
    Star { source: String, span: Range<usize> },
}

impl ExportDecl {
    /// Byte span of the whole statement.
    pub fn span(&self) -> &Range<usize> {
        match self {
            ExportDecl::Declaration { span, .. }
            | ExportDecl::DefaultValue { span, .. }
            | ExportDecl::Clause { span, .. }
            | ExportDecl::Namespace { span, .. }
            | ExportDecl::Star { span, .. } => span,
        }
    }

    /// Module this statement re-exports from, if any.
    pub fn reexport_source(&self) -> Option<&str> {
        match self {
            ExportDecl::Clause { source, .. } => source.as_deref(),
            ExportDecl::Namespace { source, .. } | ExportDecl::Star { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Names this statement makes visible under a name (star re-exports and
    /// anonymous default values contribute none).
    pub fn exported_names(&self) -> Vec<&str> {
        match self {
            ExportDecl::Declaration { names, .. } => names.iter().map(String::as_str).collect(),
            ExportDecl::Clause { bindings, .. } => {
                bindings.iter().map(|b| b.exported.as_str()).collect()
            }
            ExportDecl::Namespace { exported, .. } => vec![exported.as_str()],
            ExportDecl::DefaultValue { .. } | ExportDecl::Star { .. } => Vec::new(),
        }
    }
}

/// Result of analyzing one source text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceAnalysis {
    pub imports: Vec<ImportDecl>,
    pub exports: Vec<ExportDecl>,
    /// Number of top-level statements (comments excluded).
    pub statement_count: usize,
}

/// Parses `source` and collects its top-level import/export declarations.
///
/// Any syntax error fails the whole analysis with the first error position.
pub fn analyze_source(source: &str) -> Result<SourceAnalysis, ParseError> {
    let tree = syntax::parse(source)?;
    if let Some(diag) = syntax::first_error(&tree, source) {
        return Err(diag.into());
    }

    let root = tree.root_node();
    let mut analysis = SourceAnalysis::default();
    let mut cursor = root.walk();
    for node in root.named_children(&mut cursor) {
        match node.kind() {
            "comment" => continue,
            "import_statement" => analysis.imports.push(import_decl(node, source)),
            "export_statement" => analysis.exports.push(export_decl(node, source)),
            _ => {}
        }
        analysis.statement_count += 1;
    }
    Ok(analysis)
}

// ---------------------------------------------------------------------------
// Node helpers
// ---------------------------------------------------------------------------

fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or_default()
}

/// Text of a string literal without its quotes.
fn unquote(literal: &str) -> String {
    let trimmed = literal.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next_back()) {
        (Some(open), Some(close)) if open == close && matches!(open, '"' | '\'' | '`') => {
            chars.as_str().to_string()
        }
        _ => trimmed.to_string(),
    }
}

/// Text of an identifier or string-literal module export name.
fn export_name(node: Node<'_>, source: &str) -> String {
    if node.kind() == "string" {
        unquote(text(node, source))
    } else {
        text(node, source).to_string()
    }
}

fn named_children_of(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn import_decl(node: Node<'_>, source: &str) -> ImportDecl {
    let mut decl = ImportDecl {
        source: node
            .child_by_field_name("source")
            .map(|s| unquote(text(s, source)))
            .unwrap_or_default(),
        span: node.byte_range(),
        ..ImportDecl::default()
    };

    let Some(clause) = named_children_of(node)
        .into_iter()
        .find(|child| child.kind() == "import_clause")
    else {
        return decl;
    };

    for part in named_children_of(clause) {
        match part.kind() {
            "identifier" => decl.default = Some(text(part, source).to_string()),
            "namespace_import" => {
                decl.namespace = named_children_of(part)
                    .into_iter()
                    .find(|n| n.kind() == "identifier")
                    .map(|n| text(n, source).to_string());
            }
            "named_imports" => {
                for spec in named_children_of(part) {
                    if spec.kind() != "import_specifier" {
                        continue;
                    }
                    let Some(name) = spec.child_by_field_name("name") else {
                        continue;
                    };
                    let imported = export_name(name, source);
                    let local = spec
                        .child_by_field_name("alias")
                        .map(|alias| text(alias, source).to_string())
                        .unwrap_or_else(|| imported.clone());
                    if imported == "default" {
                        decl.default.get_or_insert(local);
                    } else {
                        decl.named.push(ImportBinding { imported, local });
                    }
                }
            }
            _ => {}
        }
    }
    decl
}

fn export_decl(node: Node<'_>, source: &str) -> ExportDecl {
    let span = node.byte_range();
    let mut cursor = node.walk();
    let is_default = node.children(&mut cursor).any(|c| c.kind() == "default");

    if let Some(declaration) = node.child_by_field_name("declaration") {
        return ExportDecl::Declaration {
            names: declared_names(declaration, source),
            default: is_default,
            span,
            declaration: declaration.byte_range(),
        };
    }
    if let Some(value) = node.child_by_field_name("value") {
        return ExportDecl::DefaultValue {
            span,
            value: value.byte_range(),
        };
    }

    let module = node
        .child_by_field_name("source")
        .map(|s| unquote(text(s, source)));
    let children = named_children_of(node);

    if let Some(clause) = children.iter().find(|c| c.kind() == "export_clause") {
        let bindings = named_children_of(*clause)
            .into_iter()
            .filter(|spec| spec.kind() == "export_specifier")
            .filter_map(|spec| {
                let local = export_name(spec.child_by_field_name("name")?, source);
                let exported = spec
                    .child_by_field_name("alias")
                    .map(|alias| export_name(alias, source))
                    .unwrap_or_else(|| local.clone());
                Some(ExportBinding { local, exported })
            })
            .collect();
        return ExportDecl::Clause {
            bindings,
            source: module,
            span,
        };
    }

    if let Some(ns) = children.iter().find(|c| c.kind() == "namespace_export") {
        let exported = named_children_of(*ns)
            .into_iter()
            .next()
            .map(|name| export_name(name, source))
            .unwrap_or_default();
        return ExportDecl::Namespace {
            exported,
            source: module.unwrap_or_default(),
            span,
        };
    }

    match module {
        Some(source) => ExportDecl::Star { source, span },
        None => ExportDecl::Clause {
            bindings: Vec::new(),
            source: None,
            span,
        },
    }
}

/// Names bound by a declaration node.
fn declared_names(declaration: Node<'_>, source: &str) -> Vec<String> {
    match declaration.kind() {
        "function_declaration" | "generator_function_declaration" | "class_declaration" => {
            declaration
                .child_by_field_name("name")
                .map(|name| vec![text(name, source).to_string()])
                .unwrap_or_default()
        }
        "lexical_declaration" | "variable_declaration" => {
            let mut names = Vec::new();
            for declarator in named_children_of(declaration) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                if let Some(pattern) = declarator.child_by_field_name("name") {
                    pattern_names(pattern, source, &mut names);
                }
            }
            names
        }
        _ => Vec::new(),
    }
}

/// Identifiers bound by a (possibly destructuring) binding pattern.
fn pattern_names(pattern: Node<'_>, source: &str, out: &mut Vec<String>) {
    match pattern.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => {
            out.push(text(pattern, source).to_string());
        }
        "assignment_pattern" | "object_assignment_pattern" => {
            if let Some(left) = pattern.child_by_field_name("left") {
                pattern_names(left, source, out);
            }
        }
        "pair_pattern" => {
            if let Some(value) = pattern.child_by_field_name("value") {
                pattern_names(value, source, out);
            }
        }
        _ => {
            for child in named_children_of(pattern) {
                pattern_names(child, source, out);
            }
        }
    }
}
