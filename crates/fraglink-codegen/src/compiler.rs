//! Top-level compilation pipeline:
//! entry check -> dependency-first visitation -> per-fragment lowering and
//! emission -> prelude and harness assembly -> digest.
//!
//! Visitation is a post-order depth-first walk driven by an explicit stack,
//! so deep dependency chains cannot overflow the native stack. A visited-set
//! guarantees each fragment is emitted at most once and cycles terminate; an
//! in-progress set tells a back edge (a real cycle) apart from a fragment
//! already emitted through another path.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use fraglink_check::ModuleResolver;
use fraglink_core::{Fragment, FragmentGraph, FragmentId};

use crate::codegen::{emit_fragment, FragmentEmission};
use crate::diagnostics::CompileDiagnostic;
use crate::lower::{lower_fragment, LoweredFragment};
use crate::runtime;
use crate::sanitize::{comment_text, is_binding_name, js_string};
use crate::{CompileOptions, CompiledUnit, HoistMode};

/// Compile the fragments reachable from `entry_id` into one unit.
///
/// Never fails. A missing entry yields an empty unit flagged with a
/// [`CompileDiagnostic::MissingFragment`]; other problems are recorded as
/// diagnostics and compilation continues.
pub fn compile(graph: &FragmentGraph, entry_id: &str, options: &CompileOptions) -> CompiledUnit {
    let entry = FragmentId::from(entry_id);

    if !graph.contains(entry_id) {
        tracing::warn!(entry = %entry, "entry fragment not found, producing empty unit");
        let diagnostic = CompileDiagnostic::MissingFragment {
            id: entry.clone(),
            referenced_by: None,
        };
        return CompiledUnit::new(entry, String::new(), Vec::new(), vec![diagnostic]);
    }

    let mut compiler = GraphCompiler::new(graph, options);
    compiler.visit(&entry);
    let unit = compiler.finish(entry);

    tracing::debug!(
        entry = %unit.entry_id,
        fragments = unit.order.len(),
        diagnostics = unit.diagnostics.len(),
        digest = %unit.digest,
        "compiled fragment graph"
    );
    unit
}

/// One pending fragment on the visitation stack.
struct Frame {
    id: FragmentId,
    next_dependency: usize,
}

/// State of a single compilation pass.
struct GraphCompiler<'g> {
    graph: &'g FragmentGraph,
    options: &'g CompileOptions,
    resolver: ModuleResolver,
    visited: HashSet<FragmentId>,
    in_progress: HashSet<FragmentId>,
    lowered: HashMap<FragmentId, LoweredFragment>,
    /// Global mode: exported name -> fragment that last hoisted it.
    global_names: HashMap<String, FragmentId>,
    order: Vec<FragmentId>,
    diagnostics: Vec<CompileDiagnostic>,
    fragments_text: String,
}

impl<'g> GraphCompiler<'g> {
    fn new(graph: &'g FragmentGraph, options: &'g CompileOptions) -> Self {
        GraphCompiler {
            graph,
            options,
            resolver: ModuleResolver::from_graph(graph),
            visited: HashSet::new(),
            in_progress: HashSet::new(),
            lowered: HashMap::new(),
            global_names: HashMap::new(),
            order: Vec::new(),
            diagnostics: Vec::new(),
            fragments_text: String::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Visitation
    // -----------------------------------------------------------------------

    fn visit(&mut self, entry: &FragmentId) {
        let graph = self.graph;
        let mut stack: Vec<Frame> = Vec::new();
        self.enter(entry, None, &mut stack);

        while let Some(frame) = stack.last_mut() {
            let dependencies = graph.dependencies(frame.id.as_str());
            if frame.next_dependency < dependencies.len() {
                let target = dependencies[frame.next_dependency].clone();
                frame.next_dependency += 1;
                let parent = frame.id.clone();
                self.enter(&target, Some(parent), &mut stack);
            } else if let Some(done) = stack.pop() {
                self.in_progress.remove(&done.id);
                self.emit(&done.id);
            }
        }
    }

    /// Marks `id` visited and pushes it, unless already seen or missing.
    fn enter(&mut self, id: &FragmentId, referenced_by: Option<FragmentId>, stack: &mut Vec<Frame>) {
        if self.visited.contains(id) {
            if self.in_progress.contains(id) {
                if let Some(from) = referenced_by {
                    tracing::debug!(from = %from, to = %id, "dependency cycle, edge skipped");
                    self.diagnostics.push(CompileDiagnostic::Cycle {
                        from,
                        to: id.clone(),
                    });
                }
            }
            return;
        }
        self.visited.insert(id.clone());

        if !self.graph.contains(id.as_str()) {
            tracing::warn!(fragment = %id, "dependency fragment not found, branch skipped");
            self.diagnostics.push(CompileDiagnostic::MissingFragment {
                id: id.clone(),
                referenced_by,
            });
            return;
        }

        self.in_progress.insert(id.clone());
        stack.push(Frame {
            id: id.clone(),
            next_dependency: 0,
        });
    }

    // -----------------------------------------------------------------------
    // Per-fragment work
    // -----------------------------------------------------------------------

    fn lowered(&mut self, fragment: &Fragment) -> &LoweredFragment {
        let resolver = &self.resolver;
        self.lowered
            .entry(fragment.id.clone())
            .or_insert_with(|| lower_fragment(fragment, resolver))
    }

    /// Exported name -> local expression for a fragment, plus the names that
    /// had to be skipped.
    fn hoists(&mut self, fragment: &Fragment) -> (Vec<(String, String)>, Vec<String>) {
        let lowered = self.lowered(fragment);
        let names: &[String] = if fragment.exported_functions.is_empty() {
            &lowered.extracted_exports
        } else {
            &fragment.exported_functions
        };

        let mut hoists: Vec<(String, String)> = Vec::new();
        let mut invalid = Vec::new();
        for name in names {
            if hoists.iter().any(|(exported, _)| exported == name) {
                continue;
            }
            match lowered.binding(name) {
                Some(local) => hoists.push((name.clone(), local.to_string())),
                None if is_binding_name(name) => hoists.push((name.clone(), name.clone())),
                None => invalid.push(name.clone()),
            }
        }
        if let Some(local) = lowered.binding("default") {
            if !hoists.iter().any(|(exported, _)| exported == "default") {
                hoists.push(("default".to_string(), local.to_string()));
            }
        }
        (hoists, invalid)
    }

    /// Namespaced mode: names of direct dependencies' exports, bound in the
    /// dependent's outer scope. A later edge wins a name clash.
    fn dependency_bindings(&mut self, fragment: &Fragment) -> Vec<(String, FragmentId)> {
        let graph = self.graph;
        let mut bindings: IndexMap<String, FragmentId> = IndexMap::new();

        for target_id in graph.dependencies(fragment.id.as_str()) {
            if *target_id == fragment.id {
                continue;
            }
            let Some(target) = graph.fragment(target_id.as_str()) else {
                continue;
            };
            let (target_hoists, _) = self.hoists(target);
            for (name, _) in target_hoists {
                if name == "default" || !is_binding_name(&name) {
                    continue;
                }
                if let Some(previous) = bindings.get(&name) {
                    if previous != target_id {
                        self.diagnostics.push(CompileDiagnostic::ExportCollision {
                            name: name.clone(),
                            previous: previous.clone(),
                            replaced_by: target_id.clone(),
                            dependent: Some(fragment.id.clone()),
                        });
                    }
                }
                bindings.insert(name, target_id.clone());
            }
        }
        bindings.into_iter().collect()
    }

    fn emit(&mut self, id: &FragmentId) {
        let graph = self.graph;
        let Some(fragment) = graph.fragment(id.as_str()) else {
            return;
        };
        tracing::debug!(fragment = %id, "emitting fragment");

        let (hoists, invalid) = self.hoists(fragment);
        for name in invalid {
            self.diagnostics.push(CompileDiagnostic::InvalidExportName {
                id: id.clone(),
                name,
            });
        }

        let dependency_bindings = match self.options.hoist_mode {
            HoistMode::Namespaced => self.dependency_bindings(fragment),
            HoistMode::Global => {
                self.record_global_names(id, &hoists);
                Vec::new()
            }
        };

        let lowered = self.lowered(fragment).clone();
        if let Some(err) = &lowered.parse_error {
            tracing::warn!(fragment = %id, error = %err, "fragment code unparseable, emitted verbatim");
            self.diagnostics.push(CompileDiagnostic::UnparsedFragment {
                id: id.clone(),
                message: err.to_string(),
            });
        }

        emit_fragment(
            &mut self.fragments_text,
            &FragmentEmission {
                fragment,
                lowered: &lowered,
                dependency_bindings: &dependency_bindings,
                hoists: &hoists,
                mode: self.options.hoist_mode,
                banner: self.options.banners,
            },
        );
        self.order.push(id.clone());
    }

    /// Global mode: records which fragment owns each global name.
    fn record_global_names(&mut self, id: &FragmentId, hoists: &[(String, String)]) {
        for (name, _) in hoists {
            if name == "default" {
                continue;
            }
            if let Some(previous) = self.global_names.insert(name.clone(), id.clone()) {
                if previous != *id {
                    tracing::debug!(name = %name, previous = %previous, replaced_by = %id, "global export overwritten");
                    self.diagnostics.push(CompileDiagnostic::ExportCollision {
                        name: name.clone(),
                        previous,
                        replaced_by: id.clone(),
                        dependent: None,
                    });
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Assembly
    // -----------------------------------------------------------------------

    fn finish(self, entry: FragmentId) -> CompiledUnit {
        let mut source = String::with_capacity(runtime::PRELUDE.len() + self.fragments_text.len() + 128);
        source.push_str(runtime::PRELUDE);
        source.push_str(&self.fragments_text);

        source.push_str(&format!("// entry: {}\n", comment_text(entry.as_str())));
        if let Some(export) = &self.options.entry_export {
            source.push_str(&format!(
                "return await {}({}, {});\n",
                runtime::INVOKE,
                js_string(entry.as_str()),
                js_string(export)
            ));
        }

        CompiledUnit::new(entry, source, self.order, self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fraglink_core::DependencyEdge;

    fn graph(fragments: Vec<Fragment>, edges: &[(&str, &str)]) -> FragmentGraph {
        FragmentGraph::from_parts(
            fragments,
            edges.iter().map(|(s, t)| DependencyEdge::new(*s, *t)),
        )
        .unwrap()
    }

    fn order(unit: &CompiledUnit) -> Vec<&str> {
        unit.order.iter().map(|id| id.as_str()).collect()
    }

    #[test]
    fn dependencies_are_emitted_before_dependents() {
        let g = graph(
            vec![
                Fragment::new("a", "b();"),
                Fragment::new("b", "function b() { return c(); }").with_exports(["b"]),
                Fragment::new("c", "function c() { return 1; }").with_exports(["c"]),
            ],
            &[("a", "b"), ("b", "c")],
        );
        let unit = compile(&g, "a", &CompileOptions::default());
        assert_eq!(order(&unit), vec!["c", "b", "a"]);

        let c_hoist = unit
            .source
            .find("__fl_export(__fl_module.exports, \"c\"")
            .unwrap();
        let b_code = unit.source.find("function b() { return c(); }").unwrap();
        assert!(c_hoist < b_code);
        assert!(unit.diagnostics.is_empty());
    }

    #[test]
    fn cycles_emit_each_fragment_once() {
        let g = graph(
            vec![Fragment::new("a", "// A"), Fragment::new("b", "// B")],
            &[("a", "b"), ("b", "a")],
        );
        let unit = compile(&g, "a", &CompileOptions::default());
        assert_eq!(order(&unit), vec!["b", "a"]);
        assert_eq!(unit.source.matches("// A\n").count(), 1);
        assert_eq!(unit.source.matches("// B\n").count(), 1);
        assert_eq!(
            unit.diagnostics,
            vec![CompileDiagnostic::Cycle {
                from: FragmentId::from("b"),
                to: FragmentId::from("a"),
            }]
        );
    }

    #[test]
    fn shared_dependencies_are_not_cycles() {
        let g = graph(
            vec![
                Fragment::new("a", ""),
                Fragment::new("b", ""),
                Fragment::new("c", ""),
                Fragment::new("shared", ""),
            ],
            &[("a", "b"), ("a", "c"), ("b", "shared"), ("c", "shared")],
        );
        let unit = compile(&g, "a", &CompileOptions::default());
        assert_eq!(order(&unit), vec!["shared", "b", "c", "a"]);
        assert!(unit.diagnostics.is_empty());
    }

    #[test]
    fn missing_entry_yields_empty_flagged_unit() {
        let g = graph(vec![Fragment::new("a", "")], &[]);
        let unit = compile(&g, "nope", &CompileOptions::default());
        assert!(unit.is_empty());
        assert!(unit.source.is_empty());
        assert!(unit.entry_missing());
    }

    #[test]
    fn missing_dependency_is_skipped_and_reported() {
        let g = graph(vec![Fragment::new("a", "// A")], &[("a", "ghost")]);
        let unit = compile(&g, "a", &CompileOptions::default());
        assert_eq!(order(&unit), vec!["a"]);
        assert!(!unit.entry_missing());
        assert_eq!(
            unit.diagnostics,
            vec![CompileDiagnostic::MissingFragment {
                id: FragmentId::from("ghost"),
                referenced_by: Some(FragmentId::from("a")),
            }]
        );
    }

    #[test]
    fn unreachable_fragments_are_not_emitted() {
        let g = graph(
            vec![Fragment::new("a", "// A"), Fragment::new("island", "// ISLAND")],
            &[],
        );
        let unit = compile(&g, "a", &CompileOptions::default());
        assert_eq!(order(&unit), vec!["a"]);
        assert!(!unit.source.contains("ISLAND"));
    }

    #[test]
    fn namespaced_mode_binds_dependency_exports() {
        let g = graph(
            vec![
                Fragment::new("main", "console.log(add(1, 2));"),
                Fragment::new("math", "export function add(a, b) { return a + b; }"),
            ],
            &[("main", "math")],
        );
        let unit = compile(&g, "main", &CompileOptions::default());
        assert!(unit
            .source
            .contains("let add = __fl_import(\"math\", \"add\");"));
        assert!(!unit.source.contains("__fl_export_global("));
    }

    #[test]
    fn clashing_dependency_exports_are_reported() {
        let g = graph(
            vec![
                Fragment::new("main", "f();"),
                Fragment::new("x", "function f() {}").with_exports(["f"]),
                Fragment::new("y", "function f() {}").with_exports(["f"]),
            ],
            &[("main", "x"), ("main", "y")],
        );
        let unit = compile(&g, "main", &CompileOptions::default());
        assert_eq!(unit.source.matches("let f = ").count(), 1);
        assert!(unit.source.contains("let f = __fl_import(\"y\", \"f\");"));
        assert_eq!(
            unit.diagnostics,
            vec![CompileDiagnostic::ExportCollision {
                name: "f".into(),
                previous: FragmentId::from("x"),
                replaced_by: FragmentId::from("y"),
                dependent: Some(FragmentId::from("main")),
            }]
        );
    }

    #[test]
    fn global_mode_reports_overwrites() {
        let g = graph(
            vec![
                Fragment::new("main", "f();"),
                Fragment::new("x", "function f() {}").with_exports(["f"]),
                Fragment::new("y", "function f() {}").with_exports(["f"]),
            ],
            &[("main", "x"), ("main", "y")],
        );
        let options = CompileOptions {
            hoist_mode: HoistMode::Global,
            ..CompileOptions::default()
        };
        let unit = compile(&g, "main", &options);
        assert!(!unit.source.contains("let f = "));
        assert_eq!(unit.source.matches("__fl_export_global(__fl_module.exports, \"f\"").count(), 2);
        assert!(matches!(
            unit.diagnostics.as_slice(),
            [CompileDiagnostic::ExportCollision { dependent: None, .. }]
        ));
    }

    #[test]
    fn declared_exports_take_precedence_over_extracted() {
        let g = graph(
            vec![Fragment::new("a", "export function f() {}\nfunction g() {}").with_exports(["g"])],
            &[],
        );
        let unit = compile(&g, "a", &CompileOptions::default());
        assert!(unit.source.contains("__fl_export(__fl_module.exports, \"g\""));
        assert!(!unit.source.contains("__fl_export(__fl_module.exports, \"f\""));
    }

    #[test]
    fn invalid_export_names_are_skipped() {
        let g = graph(vec![Fragment::new("a", "").with_exports(["not-an-ident"])], &[]);
        let unit = compile(&g, "a", &CompileOptions::default());
        assert!(!unit.source.contains("not-an-ident"));
        assert!(matches!(
            unit.diagnostics.as_slice(),
            [CompileDiagnostic::InvalidExportName { .. }]
        ));
    }

    #[test]
    fn unparseable_fragment_is_flagged() {
        let g = graph(vec![Fragment::new("a", "function (")], &[]);
        let unit = compile(&g, "a", &CompileOptions::default());
        assert!(unit.source.contains("function ("));
        assert!(matches!(
            unit.diagnostics.as_slice(),
            [CompileDiagnostic::UnparsedFragment { .. }]
        ));
    }

    #[test]
    fn entry_export_adds_invocation_harness() {
        let g = graph(vec![Fragment::new("a", "export function run() { return 1; }")], &[]);
        let options = CompileOptions {
            entry_export: Some("run".to_string()),
            ..CompileOptions::default()
        };
        let unit = compile(&g, "a", &options);
        assert!(unit
            .source
            .trim_end()
            .ends_with("return await __fl_invoke(\"a\", \"run\");"));
    }

    #[test]
    fn compilation_is_deterministic() {
        let g = graph(
            vec![Fragment::new("a", "x();"), Fragment::new("b", "export function x() {}")],
            &[("a", "b")],
        );
        let first = compile(&g, "a", &CompileOptions::default());
        let second = compile(&g, "a", &CompileOptions::default());
        assert_eq!(first.source, second.source);
        assert_eq!(first.digest, second.digest);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Whatever the edges, every fragment reachable from the entry is
            /// emitted exactly once and nothing else is.
            #[test]
            fn reachable_fragments_are_emitted_exactly_once(
                edges in proptest::collection::vec((0u8..6, 0u8..7), 0..20)
            ) {
                let fragments: Vec<Fragment> =
                    (0u8..6).map(|i| Fragment::new(format!("f{i}"), "")).collect();
                let edges: Vec<DependencyEdge> = edges
                    .into_iter()
                    .map(|(s, t)| DependencyEdge::new(format!("f{s}"), format!("f{t}")))
                    .collect();
                let g = FragmentGraph::from_parts(fragments, edges).unwrap();

                let unit = compile(&g, "f0", &CompileOptions::default());
                let mut emitted: Vec<&str> = unit.order.iter().map(|id| id.as_str()).collect();
                let total = emitted.len();
                emitted.sort_unstable();
                emitted.dedup();
                prop_assert_eq!(emitted.len(), total);

                let mut reachable: Vec<String> =
                    g.reachable_from("f0").into_iter().map(|id| id.0).collect();
                reachable.sort_unstable();
                prop_assert_eq!(emitted, reachable.iter().map(String::as_str).collect::<Vec<_>>());
            }

            /// A fragment is emitted only after every present dependency that
            /// is not part of a cycle with it.
            #[test]
            fn acyclic_dependencies_precede_dependents(
                edges in proptest::collection::vec((0u8..6, 0u8..6), 0..20)
            ) {
                // only forward edges: s < t keeps the graph acyclic
                let edges: Vec<DependencyEdge> = edges
                    .into_iter()
                    .filter(|(s, t)| s < t)
                    .map(|(s, t)| DependencyEdge::new(format!("f{s}"), format!("f{t}")))
                    .collect();
                let fragments: Vec<Fragment> =
                    (0u8..6).map(|i| Fragment::new(format!("f{i}"), "")).collect();
                let g = FragmentGraph::from_parts(fragments, edges.clone()).unwrap();

                let unit = compile(&g, "f0", &CompileOptions::default());
                let position = |id: &FragmentId| unit.order.iter().position(|o| o == id);
                for edge in &edges {
                    if let (Some(s), Some(t)) = (position(&edge.source), position(&edge.target)) {
                        prop_assert!(t < s);
                    }
                }
            }
        }
    }
}
