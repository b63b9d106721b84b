//! Lowering of ES module syntax into plain statements.
//!
//! Fragment bodies run inside function scopes, where `import` and `export`
//! are not valid. Lowering rewrites them in place:
//!
//! - `import { a as b } from "x"` -> `const { a: b } = <module x>;`
//! - `export function f() {}` -> `function f() {}` plus a hoist binding
//! - `export { a as b }` -> removed, binding `b` -> `a`
//! - `export default <expr>` -> `const __fl_default_export = <expr>;`
//! - `export { a } from "x"` / `export * from "x"` -> a temporary bound to
//!   `<module x>` plus re-export bindings
//!
//! `<module x>` is the namespace record of the fragment `x` resolves to, or
//! `require("x")` for external modules. Statements are replaced without
//! adding line breaks, so line numbers in error messages stay close to the
//! fragment's own.

use std::ops::Range;

use fraglink_check::{
    analyze_source, classify_import_entry, ExportDecl, ImportDecl, ImportEntry, ModuleResolver,
    ParseError,
};
use fraglink_core::Fragment;

use crate::runtime;
use crate::sanitize::js_string;

/// Local holding an anonymous default export.
const DEFAULT_EXPORT_LOCAL: &str = "__fl_default_export";

/// A fragment with its module syntax rewritten.
#[derive(Debug, Clone, Default)]
pub struct LoweredFragment {
    /// Lowered `imports` entries, emitted ahead of the body.
    pub prologue: String,
    /// Lowered code.
    pub body: String,
    /// Exported name -> local expression, in declaration order.
    pub bindings: Vec<(String, String)>,
    /// Expressions whose function-valued properties are all re-exported.
    pub star_sources: Vec<String>,
    /// Export names found by analysis (fallback export list).
    pub extracted_exports: Vec<String>,
    /// Why the code could not be lowered, if it could not.
    pub parse_error: Option<ParseError>,
}

impl LoweredFragment {
    /// Local expression bound to an exported name.
    pub fn binding(&self, exported: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(name, _)| name == exported)
            .map(|(_, local)| local.as_str())
    }

    fn bind(&mut self, exported: impl Into<String>, local: impl Into<String>) {
        let exported = exported.into();
        let local = local.into();
        match self.bindings.iter_mut().find(|(name, _)| *name == exported) {
            Some(existing) => existing.1 = local,
            None => self.bindings.push((exported, local)),
        }
    }
}

/// Source expression for a module specifier.
fn module_expr(specifier: &str, resolver: &ModuleResolver) -> String {
    match resolver.resolve(specifier) {
        Some(id) => format!("{}({})", runtime::RECORD, js_string(id.as_str())),
        None => format!("require({})", js_string(specifier)),
    }
}

/// Lowers one import declaration to `const` bindings on a single line.
fn lower_import(decl: &ImportDecl, resolver: &ModuleResolver) -> String {
    let module = module_expr(&decl.source, resolver);
    if decl.is_bare() {
        return format!("{module};");
    }

    let mut parts = Vec::new();
    if let Some(ns) = &decl.namespace {
        parts.push(format!("const {ns} = {module};"));
    }
    if let Some(default) = &decl.default {
        parts.push(format!("const {default} = {}({module});", runtime::DEFAULT));
    }
    if !decl.named.is_empty() {
        let names: Vec<String> = decl
            .named
            .iter()
            .map(|b| {
                if b.imported == b.local {
                    b.local.clone()
                } else {
                    format!("{}: {}", js_string(&b.imported), b.local)
                }
            })
            .collect();
        parts.push(format!("const {{ {} }} = {module};", names.join(", ")));
    }
    parts.join(" ")
}

fn lower_entries(fragment: &Fragment, resolver: &ModuleResolver) -> String {
    let mut prologue = String::new();
    for entry in &fragment.imports {
        match classify_import_entry(entry) {
            ImportEntry::Statements(decls) => {
                for decl in &decls {
                    prologue.push_str(&lower_import(decl, resolver));
                    prologue.push('\n');
                }
            }
            ImportEntry::Specifier(_) => {}
            ImportEntry::Verbatim => {
                if !entry.trim().is_empty() {
                    prologue.push_str(entry);
                    prologue.push('\n');
                }
            }
        }
    }
    prologue
}

/// Lowers a fragment's import entries and code.
///
/// Unparseable code is kept verbatim with `parse_error` set; the import
/// entries are still lowered.
pub fn lower_fragment(fragment: &Fragment, resolver: &ModuleResolver) -> LoweredFragment {
    let mut lowered = LoweredFragment {
        prologue: lower_entries(fragment, resolver),
        ..LoweredFragment::default()
    };

    let code = fragment.code.as_str();
    let analysis = match analyze_source(code) {
        Ok(analysis) => analysis,
        Err(err) => {
            lowered.body = code.to_string();
            lowered.parse_error = Some(err);
            return lowered;
        }
    };

    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    for decl in &analysis.imports {
        edits.push((decl.span.clone(), lower_import(decl, resolver)));
    }

    let mut reexports = 0usize;
    for decl in &analysis.exports {
        for name in decl.exported_names() {
            if !lowered.extracted_exports.iter().any(|n| n == name) {
                lowered.extracted_exports.push(name.to_string());
            }
        }

        let replacement = match decl {
            ExportDecl::Declaration {
                names,
                default,
                declaration,
                ..
            } => {
                for name in names {
                    lowered.bind(name.clone(), name.clone());
                }
                if *default {
                    if let Some(first) = names.first() {
                        lowered.bind("default", first.clone());
                    }
                }
                code.get(declaration.clone()).unwrap_or_default().to_string()
            }
            ExportDecl::DefaultValue { value, .. } => {
                lowered.bind("default", DEFAULT_EXPORT_LOCAL);
                format!(
                    "const {DEFAULT_EXPORT_LOCAL} = {};",
                    code.get(value.clone()).unwrap_or_default()
                )
            }
            ExportDecl::Clause {
                bindings,
                source: None,
                ..
            } => {
                for binding in bindings {
                    lowered.bind(binding.exported.clone(), binding.local.clone());
                }
                String::new()
            }
            ExportDecl::Clause {
                bindings,
                source: Some(source),
                ..
            } => {
                let temp = format!("__fl_reexport_{reexports}");
                reexports += 1;
                for binding in bindings {
                    let local = if binding.local == "default" {
                        format!("{}({temp})", runtime::DEFAULT)
                    } else {
                        format!("{temp}[{}]", js_string(&binding.local))
                    };
                    lowered.bind(binding.exported.clone(), local);
                }
                format!("const {temp} = {};", module_expr(source, resolver))
            }
            ExportDecl::Namespace {
                exported, source, ..
            } => {
                let temp = format!("__fl_reexport_{reexports}");
                reexports += 1;
                lowered.bind(exported.clone(), temp.clone());
                format!("const {temp} = {};", module_expr(source, resolver))
            }
            ExportDecl::Star { source, .. } => {
                let temp = format!("__fl_reexport_{reexports}");
                reexports += 1;
                lowered.star_sources.push(temp.clone());
                format!("const {temp} = {};", module_expr(source, resolver))
            }
        };
        edits.push((decl.span().clone(), replacement));
    }

    edits.sort_by_key(|(range, _)| range.start);
    let mut body = String::with_capacity(code.len());
    let mut cursor = 0;
    for (range, replacement) in edits {
        if range.start < cursor {
            continue;
        }
        body.push_str(code.get(cursor..range.start).unwrap_or_default());
        body.push_str(&replacement);
        cursor = range.end;
    }
    body.push_str(code.get(cursor..).unwrap_or_default());
    lowered.body = body;
    lowered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ModuleResolver {
        let fragments = vec![Fragment::new("math", "").with_file_name("math.js")];
        ModuleResolver::new(&fragments)
    }

    fn lower(code: &str) -> LoweredFragment {
        lower_fragment(&Fragment::new("subject", code), &resolver())
    }

    #[test]
    fn fragment_imports_read_namespace_records() {
        let lowered = lower("import { add, sub as minus } from './math.js';\nadd(1, 2);");
        assert_eq!(
            lowered.body,
            "const { add, \"sub\": minus } = __fl_record(\"math\");\nadd(1, 2);"
        );
    }

    #[test]
    fn external_imports_use_require() {
        let lowered = lower("import assert, * as all from 'assert';\nimport 'polyfill';");
        assert_eq!(
            lowered.body,
            "const all = require(\"assert\"); const assert = __fl_default(require(\"assert\"));\n\
             require(\"polyfill\");"
        );
    }

    #[test]
    fn export_keywords_are_stripped_and_bound() {
        let lowered = lower("export function f() { return 1; }\nexport const k = 2;");
        assert_eq!(lowered.body, "function f() { return 1; }\nconst k = 2;");
        assert_eq!(lowered.binding("f"), Some("f"));
        assert_eq!(lowered.binding("k"), Some("k"));
        assert_eq!(lowered.extracted_exports, vec!["f", "k"]);
    }

    #[test]
    fn export_clauses_bind_the_exported_name() {
        let lowered = lower("function a() {}\nexport { a as b };");
        assert_eq!(lowered.body, "function a() {}\n");
        assert_eq!(lowered.binding("b"), Some("a"));
        assert_eq!(lowered.binding("a"), None);
    }

    #[test]
    fn default_exports_get_a_local() {
        let anonymous = lower("export default () => 42;");
        assert_eq!(anonymous.body, "const __fl_default_export = () => 42;");
        assert_eq!(anonymous.binding("default"), Some("__fl_default_export"));

        let named = lower("export default function main() {}");
        assert_eq!(named.body, "function main() {}");
        assert_eq!(named.binding("default"), Some("main"));
        assert_eq!(named.binding("main"), Some("main"));
    }

    #[test]
    fn reexports_go_through_temporaries() {
        let lowered = lower("export { add as plus } from 'math';\nexport * from 'util';");
        assert_eq!(
            lowered.body,
            "const __fl_reexport_0 = __fl_record(\"math\");\nconst __fl_reexport_1 = require(\"util\");"
        );
        assert_eq!(lowered.binding("plus"), Some("__fl_reexport_0[\"add\"]"));
        assert_eq!(lowered.star_sources, vec!["__fl_reexport_1"]);
    }

    #[test]
    fn import_entries_form_the_prologue() {
        let fragment = Fragment::new("x", "")
            .with_imports(["import { add } from 'math';", "./math.js", "const u = require('util');"]);
        let lowered = lower_fragment(&fragment, &resolver());
        assert_eq!(
            lowered.prologue,
            "const { add } = __fl_record(\"math\");\nconst u = require('util');\n"
        );
    }

    #[test]
    fn unparseable_code_is_kept_verbatim() {
        let lowered = lower("export function (");
        assert_eq!(lowered.body, "export function (");
        assert!(lowered.parse_error.is_some());
        assert!(lowered.bindings.is_empty());
    }
}
