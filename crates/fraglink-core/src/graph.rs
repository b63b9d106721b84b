//! FragmentGraph: the validated container the compiler walks.
//!
//! Fragments live in a private petgraph `StableGraph`; an insertion-ordered
//! id index maps caller ids to node indices. Dependencies are additionally
//! kept as an ordered per-source list, because edge order drives emission
//! order and because edges may point at fragments that do not exist. Those
//! dangling edges have no petgraph counterpart (there is no node to attach
//! them to) but stay visible through [`FragmentGraph::dependencies`] so the
//! compiler can report them.
//!
//! All mutations go through builder methods. Edges may be added before the
//! fragments they mention; the petgraph edge is materialized as soon as both
//! endpoints exist.

use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::Dfs;
use petgraph::Directed;
use smallvec::SmallVec;

use crate::edge::DependencyEdge;
use crate::error::CoreError;
use crate::fragment::Fragment;
use crate::id::FragmentId;

/// Ordered dependency targets of a single fragment.
pub type Dependencies = SmallVec<[FragmentId; 4]>;

/// The fragment dependency graph.
#[derive(Debug, Clone, Default)]
pub struct FragmentGraph {
    /// Fragments and their resolvable dependency edges.
    graph: StableGraph<Fragment, DependencyEdge, Directed, u32>,
    /// Fragment id -> node index, in insertion order.
    indices: IndexMap<FragmentId, NodeIndex<u32>>,
    /// Source id -> dependency targets in declared order (dangling included).
    dependencies: IndexMap<FragmentId, Dependencies>,
    /// Number of distinct declared edges.
    declared_edges: usize,
}

impl FragmentGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from fragments and edges, adding all fragments first.
    pub fn from_parts<F, E>(fragments: F, edges: E) -> Result<Self, CoreError>
    where
        F: IntoIterator<Item = Fragment>,
        E: IntoIterator<Item = DependencyEdge>,
    {
        let mut graph = FragmentGraph::new();
        for fragment in fragments {
            graph.add_fragment(fragment)?;
        }
        for edge in edges {
            graph.add_dependency(edge)?;
        }
        Ok(graph)
    }

    // -----------------------------------------------------------------------
    // Builder methods
    // -----------------------------------------------------------------------

    /// Adds a fragment. Rejects empty and duplicate ids.
    pub fn add_fragment(&mut self, fragment: Fragment) -> Result<(), CoreError> {
        if fragment.id.as_str().is_empty() {
            return Err(CoreError::InvalidFragment {
                reason: "fragment id must not be empty".to_string(),
            });
        }
        if self.indices.contains_key(&fragment.id) {
            return Err(CoreError::DuplicateFragment { id: fragment.id });
        }

        let id = fragment.id.clone();
        let idx = self.graph.add_node(fragment);
        self.indices.insert(id.clone(), idx);
        self.link_pending(&id);
        Ok(())
    }

    /// Declares that `edge.source` depends on `edge.target`.
    ///
    /// Either endpoint may be missing from the graph. Re-declaring an
    /// existing dependency is a no-op.
    pub fn add_dependency(&mut self, edge: DependencyEdge) -> Result<(), CoreError> {
        if edge.source.as_str().is_empty() || edge.target.as_str().is_empty() {
            return Err(CoreError::InvalidEdge {
                reason: format!(
                    "edge endpoints must not be empty (source: '{}', target: '{}')",
                    edge.source, edge.target
                ),
            });
        }

        let targets = self.dependencies.entry(edge.source.clone()).or_default();
        if targets.contains(&edge.target) {
            return Ok(());
        }
        targets.push(edge.target.clone());
        self.declared_edges += 1;

        if let (Some(&from), Some(&to)) = (
            self.indices.get(&edge.source),
            self.indices.get(&edge.target),
        ) {
            self.graph.add_edge(from, to, edge);
        }
        Ok(())
    }

    /// Materializes petgraph edges declared before `id` was added.
    fn link_pending(&mut self, id: &FragmentId) {
        let Some(&idx) = self.indices.get(id) else {
            return;
        };

        let mut pending: Vec<(NodeIndex<u32>, NodeIndex<u32>, DependencyEdge)> = Vec::new();
        for (source, targets) in &self.dependencies {
            if source == id {
                for target in targets {
                    if let Some(&to) = self.indices.get(target) {
                        pending.push((idx, to, DependencyEdge::new(source.clone(), target.clone())));
                    }
                }
            } else if targets.contains(id) {
                if let Some(&from) = self.indices.get(source) {
                    pending.push((from, idx, DependencyEdge::new(source.clone(), id.clone())));
                }
            }
        }
        for (from, to, edge) in pending {
            self.graph.add_edge(from, to, edge);
        }
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    /// Returns a read-only reference to the underlying petgraph graph.
    pub fn graph(&self) -> &StableGraph<Fragment, DependencyEdge, Directed, u32> {
        &self.graph
    }

    /// Looks up a fragment by id.
    pub fn fragment(&self, id: &str) -> Option<&Fragment> {
        self.indices.get(id).and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Like [`fragment`](Self::fragment) but as a `Result`.
    pub fn require(&self, id: &str) -> Result<&Fragment, CoreError> {
        self.fragment(id).ok_or_else(|| CoreError::FragmentNotFound {
            id: FragmentId::from(id),
        })
    }

    /// Whether a fragment with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.indices.contains_key(id)
    }

    /// Dependency targets of `id` in declared order, including targets that
    /// are not present in the graph.
    pub fn dependencies(&self, id: &str) -> &[FragmentId] {
        self.dependencies
            .get(id)
            .map(|targets| targets.as_slice())
            .unwrap_or(&[])
    }

    /// All fragments in insertion order.
    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> + '_ {
        self.indices
            .values()
            .filter_map(move |&idx| self.graph.node_weight(idx))
    }

    /// Number of fragments.
    pub fn fragment_count(&self) -> usize {
        self.indices.len()
    }

    /// Number of distinct declared dependencies (dangling ones included).
    pub fn dependency_count(&self) -> usize {
        self.declared_edges
    }

    /// Whether the graph has no fragments.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Declared dependencies whose target fragment does not exist.
    pub fn dangling_dependencies(&self) -> Vec<DependencyEdge> {
        self.dependencies
            .iter()
            .flat_map(|(source, targets)| {
                targets
                    .iter()
                    .filter(|target| !self.contains(target.as_str()))
                    .map(move |target| DependencyEdge::new(source.clone(), target.clone()))
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Ids of every fragment reachable from `id` (itself included), in
    /// insertion order. Empty when `id` does not exist.
    pub fn reachable_from(&self, id: &str) -> Vec<FragmentId> {
        let Some(&start) = self.indices.get(id) else {
            return Vec::new();
        };

        let mut seen = std::collections::HashSet::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(idx) = dfs.next(&self.graph) {
            seen.insert(idx);
        }

        self.indices
            .iter()
            .filter(|(_, idx)| seen.contains(*idx))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Groups of fragments that depend on each other cyclically. Each group
    /// is ordered by insertion; single fragments appear only when they depend
    /// on themselves.
    pub fn cycles(&self) -> Vec<Vec<FragmentId>> {
        let mut groups: Vec<Vec<FragmentId>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&idx| self.graph.find_edge(idx, idx).is_some())
            })
            .map(|component| {
                let mut ids: Vec<(usize, FragmentId)> = component
                    .into_iter()
                    .filter_map(|idx| {
                        let fragment = self.graph.node_weight(idx)?;
                        let position = self.indices.get_index_of(&fragment.id)?;
                        Some((position, fragment.id.clone()))
                    })
                    .collect();
                ids.sort_by_key(|(position, _)| *position);
                ids.into_iter().map(|(_, id)| id).collect()
            })
            .collect();
        groups.sort_by_key(|group| {
            group
                .first()
                .and_then(|id| self.indices.get_index_of(id))
                .unwrap_or(usize::MAX)
        });
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(id: &str) -> Fragment {
        Fragment::new(id, format!("// {id}"))
    }

    fn ids(list: &[FragmentId]) -> Vec<&str> {
        list.iter().map(|id| id.as_str()).collect()
    }

    #[test]
    fn add_and_lookup_fragments() {
        let graph = FragmentGraph::from_parts([frag("a"), frag("b")], Vec::<DependencyEdge>::new()).unwrap();
        assert_eq!(graph.fragment_count(), 2);
        assert_eq!(graph.fragment("a").unwrap().code, "// a");
        assert!(graph.fragment("zzz").is_none());
        let order: Vec<&str> = graph.fragments().map(|f| f.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = FragmentGraph::from_parts([frag("a"), frag("a")], Vec::<DependencyEdge>::new()).unwrap_err();
        assert_eq!(
            err,
            CoreError::DuplicateFragment {
                id: FragmentId::from("a")
            }
        );
    }

    #[test]
    fn empty_ids_are_rejected() {
        let mut graph = FragmentGraph::new();
        assert!(matches!(
            graph.add_fragment(frag("")),
            Err(CoreError::InvalidFragment { .. })
        ));
        assert!(matches!(
            graph.add_dependency(DependencyEdge::new("a", "")),
            Err(CoreError::InvalidEdge { .. })
        ));
    }

    #[test]
    fn dependencies_keep_declared_order_and_dangling_targets() {
        let graph = FragmentGraph::from_parts(
            [frag("a"), frag("b"), frag("c")],
            [
                DependencyEdge::new("a", "c"),
                DependencyEdge::new("a", "ghost"),
                DependencyEdge::new("a", "b"),
                DependencyEdge::new("a", "c"),
            ],
        )
        .unwrap();

        assert_eq!(ids(graph.dependencies("a")), vec!["c", "ghost", "b"]);
        assert!(graph.dependencies("b").is_empty());
        assert_eq!(graph.dependency_count(), 3);
        assert_eq!(graph.graph().edge_count(), 2);
        assert_eq!(
            graph.dangling_dependencies(),
            vec![DependencyEdge::new("a", "ghost")]
        );
    }

    #[test]
    fn edges_declared_before_fragments_are_linked_later() {
        let mut graph = FragmentGraph::new();
        graph.add_dependency(DependencyEdge::new("a", "b")).unwrap();
        graph.add_fragment(frag("b")).unwrap();
        assert_eq!(graph.graph().edge_count(), 0);
        graph.add_fragment(frag("a")).unwrap();
        assert_eq!(graph.graph().edge_count(), 1);
        assert_eq!(ids(&graph.reachable_from("a")), vec!["b", "a"]);
    }

    #[test]
    fn reachability_follows_edges_only() {
        let graph = FragmentGraph::from_parts(
            [frag("a"), frag("b"), frag("c"), frag("d")],
            [DependencyEdge::new("a", "b"), DependencyEdge::new("b", "c")],
        )
        .unwrap();
        assert_eq!(ids(&graph.reachable_from("a")), vec!["a", "b", "c"]);
        assert_eq!(ids(&graph.reachable_from("d")), vec!["d"]);
        assert!(graph.reachable_from("missing").is_empty());
    }

    #[test]
    fn cycles_are_reported_as_groups() {
        let graph = FragmentGraph::from_parts(
            [frag("a"), frag("b"), frag("c"), frag("solo")],
            [
                DependencyEdge::new("b", "a"),
                DependencyEdge::new("a", "b"),
                DependencyEdge::new("c", "a"),
                DependencyEdge::new("solo", "solo"),
            ],
        )
        .unwrap();

        let cycles = graph.cycles();
        assert_eq!(cycles.len(), 2);
        assert_eq!(ids(&cycles[0]), vec!["a", "b"]);
        assert_eq!(ids(&cycles[1]), vec!["solo"]);
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let graph = FragmentGraph::from_parts(
            [frag("a"), frag("b")],
            [DependencyEdge::new("a", "b")],
        )
        .unwrap();
        assert!(graph.cycles().is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Every declared edge is either materialized or dangling, never lost.
            #[test]
            fn declared_edges_are_accounted_for(
                edges in proptest::collection::vec((0u8..6, 0u8..8), 0..24)
            ) {
                let fragments = (0u8..6).map(|i| frag(&format!("f{i}")));
                let edges: Vec<DependencyEdge> = edges
                    .into_iter()
                    .map(|(s, t)| DependencyEdge::new(format!("f{s}"), format!("f{t}")))
                    .collect();
                let graph = FragmentGraph::from_parts(fragments, edges.clone()).unwrap();

                let distinct: std::collections::HashSet<_> =
                    edges.iter().map(|e| (e.source.clone(), e.target.clone())).collect();
                prop_assert_eq!(graph.dependency_count(), distinct.len());
                prop_assert_eq!(
                    graph.graph().edge_count() + graph.dangling_dependencies().len(),
                    distinct.len()
                );
            }
        }
    }
}
