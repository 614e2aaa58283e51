//! Bounded diagram specifications.
//!
//! A [`DiagramSpec`] is a renderer-neutral description of a call diagram
//! with at most `max_nodes` nodes. When the input is larger, the most
//! connected nodes are kept and everything else folds into an
//! [`ExternalAggregate`]; no edge count is ever lost, only redirected.
//! Text emitters for the spec live in `visualize`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::callgraph::{DependencyGraph, EXTERNAL_NODE};
use crate::common::GraphTraversal;
use crate::error::{RevscopeError, RevscopeResult};
use crate::hints::module_group;

/// Diagram layout kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    /// Top-down call flow
    Flow,
    /// Left-to-right dependency hierarchy
    Hierarchy,
    /// Radial grouping by module
    MindMap,
}

impl ChartKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flow => "flow",
            Self::Hierarchy => "hierarchy",
            Self::MindMap => "mind_map",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartKind {
    type Err = RevscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flow" | "flowchart" => Ok(Self::Flow),
            "hierarchy" | "graph" => Ok(Self::Hierarchy),
            "mind_map" | "mindmap" | "radial" => Ok(Self::MindMap),
            other => Err(RevscopeError::invalid_argument(format!(
                "unknown chart kind `{}` (expected flow, hierarchy or mind_map)",
                other
            ))),
        }
    }
}

/// Edge of a [`GraphInput`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEdge {
    pub from: String,
    pub to: String,
    #[serde(default = "one")]
    pub count: usize,
}

fn one() -> usize {
    1
}

/// Generic directed graph accepted by the renderer.
///
/// Node order matters: it breaks ranking ties. Nodes mentioned only by
/// edges are appended in order of first mention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphInput {
    #[serde(default)]
    pub nodes: Vec<String>,
    pub edges: Vec<InputEdge>,
}

impl GraphInput {
    /// From a plain `caller → [callees]` mapping.
    pub fn from_adjacency(map: &BTreeMap<String, Vec<String>>) -> Self {
        let mut input = GraphInput {
            nodes: map.keys().cloned().collect(),
            edges: Vec::new(),
        };
        for (from, targets) in map {
            for to in targets {
                input.edges.push(InputEdge {
                    from: from.clone(),
                    to: to.clone(),
                    count: 1,
                });
            }
        }
        input
    }
}

impl From<&DependencyGraph> for GraphInput {
    fn from(graph: &DependencyGraph) -> Self {
        GraphInput {
            nodes: graph.nodes.iter().map(|n| n.name.clone()).collect(),
            edges: graph
                .edges
                .iter()
                .map(|e| InputEdge {
                    from: e.caller.clone(),
                    to: e.callee.clone(),
                    count: e.count,
                })
                .collect(),
        }
    }
}

/// Kept node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramNode {
    /// Renderer-safe identifier (`[A-Za-z0-9_]+`, unique)
    pub id: String,
    /// Original name
    pub label: String,
    /// Distinct neighbours in the full input (self excluded)
    pub degree: usize,
    /// BFS level among kept nodes, 0 for roots
    pub level: usize,
    pub group: String,
}

/// Edge between two kept nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramEdge {
    pub from: String,
    pub to: String,
    pub count: usize,
}

/// Everything that did not fit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAggregate {
    /// Dropped node names, in input order
    pub dropped: Vec<String>,
    /// Kept node label → calls it receives from dropped nodes
    pub inbound: BTreeMap<String, usize>,
    /// Kept node label → calls it makes to dropped nodes
    pub outbound: BTreeMap<String, usize>,
    /// Calls among dropped nodes
    pub internal: usize,
}

impl ExternalAggregate {
    pub fn is_empty(&self) -> bool {
        self.dropped.is_empty()
    }

    /// Call count folded into the aggregate.
    pub fn total(&self) -> usize {
        self.inbound.values().sum::<usize>() + self.outbound.values().sum::<usize>() + self.internal
    }
}

/// Renderer-neutral diagram description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramSpec {
    pub kind: ChartKind,
    /// Kept nodes, most connected first
    pub nodes: Vec<DiagramNode>,
    pub edges: Vec<DiagramEdge>,
    pub external: ExternalAggregate,
    /// Input node count before truncation
    pub total_nodes: usize,
    pub truncated: bool,
}

impl DiagramSpec {
    /// Call count represented by the spec. Always equals the input total.
    pub fn edge_total(&self) -> usize {
        self.edges.iter().map(|e| e.count).sum::<usize>() + self.external.total()
    }

    pub fn node(&self, label: &str) -> Option<&DiagramNode> {
        self.nodes.iter().find(|n| n.label == label)
    }
}

/// Build a diagram spec with at most `max_nodes` nodes.
pub fn render(input: &GraphInput, kind: ChartKind, max_nodes: usize) -> RevscopeResult<DiagramSpec> {
    if max_nodes == 0 {
        return Err(RevscopeError::invalid_argument("max_nodes must be at least 1"));
    }

    // Node order: declared nodes first, then first mention by an edge.
    let mut names: Vec<&str> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for n in &input.nodes {
        if !index.contains_key(n.as_str()) {
            index.insert(n.as_str(), names.len());
            names.push(n.as_str());
        }
    }
    for e in &input.edges {
        for n in [e.from.as_str(), e.to.as_str()] {
            if !index.contains_key(n) {
                index.insert(n, names.len());
                names.push(n);
            }
        }
    }

    // Merge duplicate edges, keeping first-appearance order.
    let mut pairs: Vec<((usize, usize), usize)> = Vec::new();
    let mut pair_slot: HashMap<(usize, usize), usize> = HashMap::new();
    for e in &input.edges {
        let key = (index[e.from.as_str()], index[e.to.as_str()]);
        match pair_slot.get(&key) {
            Some(&slot) => pairs[slot].1 += e.count,
            None => {
                pair_slot.insert(key, pairs.len());
                pairs.push((key, e.count));
            }
        }
    }

    let mut degree = vec![0usize; names.len()];
    for &((a, b), _) in &pairs {
        if a != b {
            degree[a] += 1;
            degree[b] += 1;
        }
    }

    let mut ranked: Vec<usize> = (0..names.len()).collect();
    ranked.sort_by(|&a, &b| degree[b].cmp(&degree[a]).then(a.cmp(&b)));
    let truncated = names.len() > max_nodes;
    ranked.truncate(max_nodes);
    let kept: HashSet<usize> = ranked.iter().copied().collect();

    let ids = unique_ids(&names, &ranked);

    let mut edges = Vec::new();
    let mut external = ExternalAggregate::default();
    for &((a, b), count) in &pairs {
        match (kept.contains(&a), kept.contains(&b)) {
            (true, true) => edges.push(DiagramEdge {
                from: ids[&a].clone(),
                to: ids[&b].clone(),
                count,
            }),
            (true, false) => *external.outbound.entry(names[a].to_string()).or_insert(0) += count,
            (false, true) => *external.inbound.entry(names[b].to_string()).or_insert(0) += count,
            (false, false) => external.internal += count,
        }
    }
    external.dropped = (0..names.len())
        .filter(|i| !kept.contains(i))
        .map(|i| names[i].to_string())
        .collect();

    let levels = KeptGraph {
        ranked: &ranked,
        pairs: &pairs,
        kept: &kept,
    }
    .levels();

    let nodes = ranked
        .iter()
        .map(|&i| DiagramNode {
            id: ids[&i].clone(),
            label: names[i].to_string(),
            degree: degree[i],
            level: levels.get(&i).copied().unwrap_or(0),
            group: if names[i] == EXTERNAL_NODE {
                "external".to_string()
            } else {
                module_group(names[i]).to_string()
            },
        })
        .collect();

    if truncated {
        tracing::debug!(
            total = names.len(),
            kept = max_nodes,
            dropped = external.dropped.len(),
            "diagram truncated"
        );
    }

    Ok(DiagramSpec {
        kind,
        nodes,
        edges,
        external,
        total_nodes: names.len(),
        truncated,
    })
}

/// Kept subgraph, for BFS levels.
struct KeptGraph<'a> {
    ranked: &'a [usize],
    pairs: &'a [((usize, usize), usize)],
    kept: &'a HashSet<usize>,
}

impl GraphTraversal for KeptGraph<'_> {
    type Node = usize;

    fn neighbors(&self, node: &usize) -> Vec<usize> {
        self.pairs
            .iter()
            .filter(|((a, b), _)| a == node && a != b && self.kept.contains(b))
            .map(|((_, b), _)| *b)
            .collect()
    }

    fn contains_node(&self, node: &usize) -> bool {
        self.kept.contains(node)
    }
}

impl KeptGraph<'_> {
    /// Levels from kept nodes without kept callers; nodes only reachable
    /// through a cycle seed their own walk, in rank order.
    fn levels(&self) -> HashMap<usize, usize> {
        let has_caller: HashSet<usize> = self
            .pairs
            .iter()
            .filter(|((a, b), _)| a != b && self.kept.contains(a) && self.kept.contains(b))
            .map(|((_, b), _)| *b)
            .collect();
        let roots: Vec<usize> = self
            .ranked
            .iter()
            .copied()
            .filter(|i| !has_caller.contains(i))
            .collect();
        let mut levels = self.levels_from(roots);
        for &i in self.ranked {
            if !levels.contains_key(&i) {
                for (node, level) in self.levels_from([i]) {
                    levels.entry(node).or_insert(level);
                }
            }
        }
        levels
    }
}

/// Sanitized, collision-free ids for the kept nodes.
fn unique_ids(names: &[&str], ranked: &[usize]) -> HashMap<usize, String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut ids = HashMap::new();
    for &i in ranked {
        let base = sanitize_id(names[i]);
        let mut id = base.clone();
        let mut n = 2;
        while !used.insert(id.clone()) {
            id = format!("{}_{}", base, n);
            n += 1;
        }
        ids.insert(i, id);
    }
    ids
}

/// Replace everything outside `[A-Za-z0-9_]`; prefix ids that would start
/// with a digit or be empty.
pub fn sanitize_id(name: &str) -> String {
    let mut id: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if id.is_empty() || id.starts_with(|c: char| c.is_ascii_digit()) {
        id.insert(0, 'n');
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(from: &str, to: &str, count: usize) -> InputEdge {
        InputEdge {
            from: from.to_string(),
            to: to.to_string(),
            count,
        }
    }

    fn star(n: usize) -> GraphInput {
        // hub calls every leaf once; leaf_i calls leaf_{i+1} i times
        let mut input = GraphInput::default();
        input.nodes.push("hub".to_string());
        for i in 0..n {
            input.nodes.push(format!("leaf_{}", i));
            input.edges.push(edge("hub", &format!("leaf_{}", i), 1));
        }
        for i in 0..n.saturating_sub(1) {
            input.edges.push(edge(&format!("leaf_{}", i), &format!("leaf_{}", i + 1), i + 1));
        }
        input
    }

    #[test]
    fn test_zero_nodes_rejected() {
        let err = render(&star(3), ChartKind::Flow, 0).unwrap_err();
        assert!(matches!(err, RevscopeError::InvalidArgument { .. }));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("flowchart".parse::<ChartKind>().unwrap(), ChartKind::Flow);
        assert_eq!("graph".parse::<ChartKind>().unwrap(), ChartKind::Hierarchy);
        assert_eq!("mindmap".parse::<ChartKind>().unwrap(), ChartKind::MindMap);
        assert!("pie".parse::<ChartKind>().is_err());
    }

    #[test]
    fn test_small_graph_not_truncated() {
        let spec = render(&star(3), ChartKind::Flow, 10).unwrap();
        assert!(!spec.truncated);
        assert_eq!(spec.nodes.len(), 4);
        assert!(spec.external.is_empty());
        assert_eq!(spec.nodes[0].label, "hub");
        assert_eq!(spec.node("hub").unwrap().level, 0);
        assert_eq!(spec.node("leaf_2").unwrap().level, 1);
    }

    #[test]
    fn test_truncation_conserves_edges() {
        let input = star(40);
        let input_total: usize = input.edges.iter().map(|e| e.count).sum();
        let spec = render(&input, ChartKind::Hierarchy, 5).unwrap();
        assert!(spec.truncated);
        assert_eq!(spec.nodes.len(), 5);
        assert_eq!(spec.total_nodes, 41);
        assert_eq!(spec.external.dropped.len(), 36);
        assert_eq!(spec.edge_total(), input_total);
        assert_eq!(spec.nodes[0].label, "hub");
    }

    #[test]
    fn test_ties_broken_by_input_order() {
        let input = GraphInput {
            nodes: vec!["b".into(), "a".into(), "c".into()],
            edges: vec![],
        };
        let spec = render(&input, ChartKind::Flow, 2).unwrap();
        let labels: Vec<_> = spec.nodes.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "a"]);
        assert_eq!(spec.external.dropped, vec!["c"]);
    }

    #[test]
    fn test_duplicate_edges_merge() {
        let input = GraphInput {
            nodes: vec![],
            edges: vec![edge("a", "b", 2), edge("a", "b", 3)],
        };
        let spec = render(&input, ChartKind::Flow, 5).unwrap();
        assert_eq!(spec.edges.len(), 1);
        assert_eq!(spec.edges[0].count, 5);
    }

    #[test]
    fn test_ids_are_sanitized_and_unique() {
        let input = GraphInput {
            nodes: vec!["a.b".into(), "a_b".into(), EXTERNAL_NODE.into(), "9lives".into()],
            edges: vec![],
        };
        let spec = render(&input, ChartKind::MindMap, 10).unwrap();
        let ids: Vec<_> = spec.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a_b", "a_b_2", "_external_", "n9lives"]);
        assert_eq!(spec.node(EXTERNAL_NODE).unwrap().group, "external");
    }

    #[test]
    fn test_cycle_levels_terminate() {
        let input = GraphInput {
            nodes: vec![],
            edges: vec![edge("x", "y", 1), edge("y", "x", 1)],
        };
        let spec = render(&input, ChartKind::Flow, 5).unwrap();
        assert_eq!(spec.node("x").unwrap().level, 0);
        assert_eq!(spec.node("y").unwrap().level, 1);
    }

    #[test]
    fn test_from_dependency_graph() {
        let graph = DependencyGraph::default();
        let input = GraphInput::from(&graph);
        assert!(input.nodes.is_empty());
        let spec = render(&input, ChartKind::Flow, 3).unwrap();
        assert!(spec.nodes.is_empty());
        assert_eq!(spec.edge_total(), 0);
    }
}
