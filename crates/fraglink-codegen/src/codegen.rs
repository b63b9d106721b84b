//! Text emission for a single fragment.
//!
//! Each fragment becomes one awaited async wrapper whose value is stored as
//! the fragment's namespace record:
//!
//! ```text
//! // fragment: utils/math.js (math)
//! __fl_fragments["math"] = await (async function __fragment_math() {
//! let helper = __fl_import("helpers", "helper");   <- dependency bindings
//! const __fl_module = { exports: {} };
//! const module = __fl_module;
//! const exports = __fl_module.exports;
//! let __fl_hoist = null;
//! try {
//! await (async function () { __fl_hoist = () => { __fl_export(__fl_module.exports, "add", () => add); };
//! <lowered import entries>
//! <lowered code>
//! ;
//! })();
//! } finally {
//! if (__fl_hoist !== null) { __fl_hoist(); }
//! }
//! return __fl_module.exports;
//! })();
//! ```
//!
//! The outer scope holds the exports of the fragment's direct dependencies
//! and the record under a reserved name; the inner scope holds the fragment's
//! own declarations, which shadow them. The hoist closure is created before
//! the body and called once the inner function ends, however it ends, so a
//! top-level `return` or a fragment-level `module` binding cannot skip or
//! redirect it. Hoists read bindings through thunks, which yield `undefined`
//! for names that were never declared or never initialized.

use fraglink_core::{Fragment, FragmentId};

use crate::lower::LoweredFragment;
use crate::runtime;
use crate::sanitize::{comment_text, js_string, wrapper_name};
use crate::HoistMode;

/// Everything needed to emit one fragment.
pub(crate) struct FragmentEmission<'a> {
    pub fragment: &'a Fragment,
    pub lowered: &'a LoweredFragment,
    /// Local name -> dependency it is read from (namespaced mode only).
    pub dependency_bindings: &'a [(String, FragmentId)],
    /// Exported name -> local expression.
    pub hoists: &'a [(String, String)],
    pub mode: HoistMode,
    pub banner: bool,
}

/// Appends the wrapper for one fragment to `out`.
pub(crate) fn emit_fragment(out: &mut String, emission: &FragmentEmission<'_>) {
    let fragment = emission.fragment;
    let id = js_string(fragment.id.as_str());
    let record = format!("{}.exports", runtime::MODULE);

    if emission.banner {
        out.push_str(&format!(
            "// fragment: {} ({})\n",
            comment_text(fragment.display_name()),
            comment_text(fragment.id.as_str())
        ));
    }
    out.push_str(&format!(
        "{}[{id}] = await (async function {}() {{\n",
        runtime::FRAGMENTS,
        wrapper_name(fragment.id.as_str())
    ));

    for (name, target) in emission.dependency_bindings {
        out.push_str(&format!(
            "let {name} = {}({}, {});\n",
            runtime::IMPORT,
            js_string(target.as_str()),
            js_string(name)
        ));
    }

    out.push_str(&format!("const {} = {{ exports: {{}} }};\n", runtime::MODULE));
    out.push_str(&format!("const module = {};\n", runtime::MODULE));
    out.push_str(&format!("const exports = {record};\n"));
    out.push_str(&format!("let {} = null;\n", runtime::HOIST));
    out.push_str("try {\n");

    // The hoist closure shares the opening line so body line numbers stay put.
    out.push_str("await (async function () {");
    out.push_str(&hoist_closure(emission, &record));
    out.push('\n');

    out.push_str(&emission.lowered.prologue);
    out.push_str(&emission.lowered.body);
    if !emission.lowered.body.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(";\n");
    out.push_str("})();\n");
    out.push_str("} finally {\n");
    out.push_str(&format!(
        "if ({hoist} !== null) {{ {hoist}(); }}\n",
        hoist = runtime::HOIST
    ));
    out.push_str("}\n");
    out.push_str(&format!("return {record};\n"));
    out.push_str("})();\n");
}

/// ` __fl_hoist = () => { ... };`, or nothing when the fragment exports nothing.
fn hoist_closure(emission: &FragmentEmission<'_>, record: &str) -> String {
    if emission.hoists.is_empty() && emission.lowered.star_sources.is_empty() {
        return String::new();
    }
    let exporter = match emission.mode {
        HoistMode::Namespaced => runtime::EXPORT,
        HoistMode::Global => runtime::EXPORT_GLOBAL,
    };
    let mut statements = Vec::with_capacity(emission.hoists.len() + emission.lowered.star_sources.len());
    for (exported, local) in emission.hoists {
        statements.push(format!(
            "{exporter}({record}, {}, () => {local});",
            js_string(exported)
        ));
    }
    for source in &emission.lowered.star_sources {
        statements.push(format!(
            "{}({record}, {source}, {exporter});",
            runtime::EXPORT_ALL
        ));
    }
    format!(" {} = () => {{ {} }};", runtime::HOIST, statements.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_wrapper_with_bindings_and_hoists() {
        let fragment = Fragment::new("my file!.js", "function f() {}");
        let lowered = LoweredFragment {
            body: "function f() {}".to_string(),
            ..LoweredFragment::default()
        };
        let deps = vec![("g".to_string(), FragmentId::from("dep"))];
        let hoists = vec![("f".to_string(), "f".to_string())];

        let mut out = String::new();
        emit_fragment(
            &mut out,
            &FragmentEmission {
                fragment: &fragment,
                lowered: &lowered,
                dependency_bindings: &deps,
                hoists: &hoists,
                mode: HoistMode::Namespaced,
                banner: true,
            },
        );

        let expected = "\
// fragment: my file!.js (my file!.js)
__fl_fragments[\"my file!.js\"] = await (async function __fragment_my_file__js() {
let g = __fl_import(\"dep\", \"g\");
const __fl_module = { exports: {} };
const module = __fl_module;
const exports = __fl_module.exports;
let __fl_hoist = null;
try {
await (async function () { __fl_hoist = () => { __fl_export(__fl_module.exports, \"f\", () => f); };
function f() {}
;
})();
} finally {
if (__fl_hoist !== null) { __fl_hoist(); }
}
return __fl_module.exports;
})();
";
        assert_eq!(out, expected);
    }

    #[test]
    fn global_mode_uses_global_exporter() {
        let fragment = Fragment::new("a", "");
        let lowered = LoweredFragment {
            star_sources: vec!["__fl_reexport_0".to_string()],
            ..LoweredFragment::default()
        };
        let hoists = vec![("f".to_string(), "f".to_string())];
        let mut out = String::new();
        emit_fragment(
            &mut out,
            &FragmentEmission {
                fragment: &fragment,
                lowered: &lowered,
                dependency_bindings: &[],
                hoists: &hoists,
                mode: HoistMode::Global,
                banner: false,
            },
        );
        assert!(out.starts_with("__fl_fragments[\"a\"]"));
        assert!(out.contains("__fl_export_global(__fl_module.exports, \"f\", () => f);"));
        assert!(out.contains("__fl_export_all(__fl_module.exports, __fl_reexport_0, __fl_export_global);"));
    }

    #[test]
    fn fragments_without_exports_get_no_hoist_closure() {
        let fragment = Fragment::new("a", "run();");
        let lowered = LoweredFragment {
            body: "run();".to_string(),
            ..LoweredFragment::default()
        };
        let mut out = String::new();
        emit_fragment(
            &mut out,
            &FragmentEmission {
                fragment: &fragment,
                lowered: &lowered,
                dependency_bindings: &[],
                hoists: &[],
                mode: HoistMode::Namespaced,
                banner: false,
            },
        );
        assert!(out.contains("await (async function () {\nrun();\n"));
        assert!(!out.contains("__fl_hoist = "));
        assert!(out.contains("return __fl_module.exports;"));
    }
}
