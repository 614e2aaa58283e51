//! Function dependency graph.
//!
//! Nodes are function names, edges are caller → callee relations weighted
//! by call-site count. Calls to names with no local definition (libc, imports,
//! indirect thunks) collapse into one sentinel node, [`EXTERNAL_NODE`], whose
//! incoming edges remember which names they stand for.
//!
//! Everything derived here (fan counts, cycles, components, importance,
//! critical functions) depends only on the multiset of records, never on the
//! order they were supplied in.
//!
//! # Performance Characteristics
//!
//! - Build: O(|F| log |F| + |C| log |E|) with BTreeMap accumulation
//! - Cycles: O(|V| + |E|) via petgraph's Tarjan SCC
//! - Components: near-linear via union-find

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::common::GraphTraversal;
use crate::func::FunctionRecord;
use crate::hints::module_group;

/// Sentinel node standing for every callee without a local definition.
///
/// Not a valid C identifier, so it can never collide with a real function.
pub const EXTERNAL_NODE: &str = "<external>";

/// A function (or the external sentinel) in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub name: String,
    /// Signature of the earliest definition
    #[serde(default)]
    pub signature: String,
    /// Chunk holding the earliest definition
    #[serde(default)]
    pub chunk_id: usize,
    #[serde(default)]
    pub header_line: usize,
    /// Number of definitions merged into this node
    #[serde(default)]
    pub definitions: usize,
    /// Distinct callers, self excluded
    pub fan_in: usize,
    /// Distinct callees, self excluded
    pub fan_out: usize,
    #[serde(default)]
    pub self_recursive: bool,
    /// Member of a multi-function strongly connected component
    #[serde(default)]
    pub in_cycle: bool,
    #[serde(default)]
    pub cyclomatic: usize,
    #[serde(default)]
    pub importance: f64,
    #[serde(default)]
    pub module_group: String,
    #[serde(default)]
    pub external: bool,
}

/// Caller → callee relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub caller: String,
    pub callee: String,
    /// Call sites summed over every definition of the caller
    pub count: usize,
    /// For edges into the external node: callee names folded into it
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_names: BTreeMap<String, usize>,
}

/// Strongly connected set of two or more mutually recursive functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    /// Sorted member names
    pub members: Vec<String>,
}

/// Weakly connected component (external node excluded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Sorted member names
    pub members: Vec<String>,
    /// Contains a cycle or a self-recursive function
    pub has_cycle: bool,
}

/// Aggregate numbers over the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_functions: usize,
    /// Distinct internal caller → callee pairs (self-edges included)
    pub total_edges: usize,
    /// Internal call sites
    pub total_calls: usize,
    /// Call sites into the external node
    pub external_calls: usize,
    pub distinct_external_names: usize,
    pub max_fan_in: usize,
    pub max_fan_out: usize,
    /// Deepest BFS level from functions nobody calls
    pub max_call_depth: usize,
    pub cycle_count: usize,
    /// Self-recursive or part of a cycle
    pub recursive_functions: usize,
    pub avg_complexity: f64,
}

/// The function dependency graph of one file.
///
/// Deserializing re-sorts nodes and edges, so lookups stay valid for
/// graphs that were edited or assembled outside [`DependencyGraph::build`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "GraphFields")]
pub struct DependencyGraph {
    /// Sorted by name; the external node, if any, comes last
    pub nodes: Vec<GraphNode>,
    /// Sorted by (caller, callee)
    pub edges: Vec<GraphEdge>,
    pub cycles: Vec<Cycle>,
    pub components: Vec<Component>,
    /// Highest-importance functions, best first
    pub critical_functions: Vec<String>,
    pub stats: GraphStats,
}

/// Wire shape of [`DependencyGraph`], before ordering is restored.
#[derive(Deserialize)]
struct GraphFields {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    cycles: Vec<Cycle>,
    components: Vec<Component>,
    critical_functions: Vec<String>,
    stats: GraphStats,
}

impl From<GraphFields> for DependencyGraph {
    fn from(f: GraphFields) -> Self {
        let mut graph = Self {
            nodes: f.nodes,
            edges: f.edges,
            cycles: f.cycles,
            components: f.components,
            critical_functions: f.critical_functions,
            stats: f.stats,
        };
        graph.normalize();
        graph
    }
}

impl GraphTraversal for DependencyGraph {
    type Node = String;

    fn neighbors(&self, node: &String) -> Vec<String> {
        self.callees_of(node)
            .into_iter()
            .filter(|c| *c != EXTERNAL_NODE)
            .map(String::from)
            .collect()
    }

    fn contains_node(&self, node: &String) -> bool {
        node != EXTERNAL_NODE && self.node(node).is_some()
    }
}

impl DependencyGraph {
    /// Build the graph from extracted function records.
    ///
    /// Repeated definitions of a name merge into one node; the earliest
    /// definition supplies signature and location, and call counts of all
    /// definitions are summed.
    pub fn build<'r>(records: impl IntoIterator<Item = &'r FunctionRecord>) -> Self {
        let records: Vec<&FunctionRecord> = records.into_iter().collect();

        // Earliest definition per name, plus definition counts.
        let mut canonical: BTreeMap<&str, &FunctionRecord> = BTreeMap::new();
        let mut definitions: BTreeMap<&str, usize> = BTreeMap::new();
        for &r in &records {
            *definitions.entry(r.name.as_str()).or_insert(0) += 1;
            canonical
                .entry(r.name.as_str())
                .and_modify(|cur| {
                    if (r.span.start, r.ordinal) < (cur.span.start, cur.ordinal) {
                        *cur = r;
                    }
                })
                .or_insert(r);
        }

        // Accumulate edges.
        let mut acc: BTreeMap<(&str, &str), (usize, BTreeMap<String, usize>)> = BTreeMap::new();
        for &r in &records {
            for (callee, &n) in &r.calls {
                if canonical.contains_key(callee.as_str()) {
                    acc.entry((r.name.as_str(), callee.as_str())).or_default().0 += n;
                } else {
                    let slot = acc.entry((r.name.as_str(), EXTERNAL_NODE)).or_default();
                    slot.0 += n;
                    *slot.1.entry(callee.clone()).or_insert(0) += n;
                }
            }
        }
        let edges: Vec<GraphEdge> = acc
            .into_iter()
            .map(|((caller, callee), (count, external_names))| GraphEdge {
                caller: caller.to_string(),
                callee: callee.to_string(),
                count,
                external_names,
            })
            .collect();

        let has_external = edges.iter().any(|e| e.callee == EXTERNAL_NODE);

        // Fan counts over distinct neighbours, self-edges excluded.
        let mut fan_in: HashMap<&str, usize> = HashMap::new();
        let mut fan_out: HashMap<&str, usize> = HashMap::new();
        let mut recursive: BTreeSet<&str> = BTreeSet::new();
        for e in &edges {
            if e.caller == e.callee {
                recursive.insert(e.caller.as_str());
                continue;
            }
            *fan_out.entry(e.caller.as_str()).or_insert(0) += 1;
            *fan_in.entry(e.callee.as_str()).or_insert(0) += 1;
        }

        let cycles = find_cycles(canonical.keys().copied(), &edges);
        let in_cycle: BTreeSet<&str> = cycles
            .iter()
            .flat_map(|c| c.members.iter().map(String::as_str))
            .collect();

        let mut nodes: Vec<GraphNode> = canonical
            .iter()
            .map(|(&name, r)| {
                let fi = fan_in.get(name).copied().unwrap_or(0);
                let fo = fan_out.get(name).copied().unwrap_or(0);
                let cyclomatic = r.metrics.cyclomatic;
                GraphNode {
                    name: name.to_string(),
                    signature: r.signature.clone(),
                    chunk_id: r.chunk_id,
                    header_line: r.header_line(),
                    definitions: definitions.get(name).copied().unwrap_or(1),
                    fan_in: fi,
                    fan_out: fo,
                    self_recursive: recursive.contains(name),
                    in_cycle: in_cycle.contains(name),
                    cyclomatic,
                    importance: importance(fi, fo, cyclomatic),
                    module_group: module_group(name).to_string(),
                    external: false,
                }
            })
            .collect();

        if has_external {
            nodes.push(GraphNode {
                name: EXTERNAL_NODE.to_string(),
                signature: String::new(),
                chunk_id: 0,
                header_line: 0,
                definitions: 0,
                fan_in: fan_in.get(EXTERNAL_NODE).copied().unwrap_or(0),
                fan_out: 0,
                self_recursive: false,
                in_cycle: false,
                cyclomatic: 0,
                importance: 0.0,
                module_group: "external".to_string(),
                external: true,
            });
        }

        let components = find_components(&nodes, &edges);
        let critical_functions = pick_critical(&nodes);

        let mut graph = Self {
            nodes,
            edges,
            cycles,
            components,
            critical_functions,
            stats: GraphStats::default(),
        };
        graph.stats = graph.compute_stats();

        tracing::debug!(
            functions = graph.stats.total_functions,
            edges = graph.stats.total_edges,
            cycles = graph.stats.cycle_count,
            "dependency graph built"
        );
        graph
    }

    /// Restore the lookup order: nodes by name with the external node
    /// last, edges by (caller, callee).
    pub fn normalize(&mut self) {
        self.nodes
            .sort_by(|a, b| a.external.cmp(&b.external).then_with(|| a.name.cmp(&b.name)));
        self.edges
            .sort_by(|a, b| a.caller.cmp(&b.caller).then_with(|| a.callee.cmp(&b.callee)));
    }

    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        let idx = self.nodes.partition_point(|n| !n.external && n.name.as_str() < name);
        match self.nodes.get(idx) {
            Some(n) if n.name == name => Some(n),
            _ => self.nodes.last().filter(|n| n.external && n.name == name),
        }
    }

    /// Functions only: every node but the external sentinel.
    pub fn functions(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|n| !n.external)
    }

    /// Outgoing edges of `caller`, sorted by callee.
    pub fn edges_from(&self, caller: &str) -> &[GraphEdge] {
        let lo = self.edges.partition_point(|e| e.caller.as_str() < caller);
        let hi = self.edges.partition_point(|e| e.caller.as_str() <= caller);
        &self.edges[lo..hi]
    }

    pub fn callees_of(&self, caller: &str) -> Vec<&str> {
        self.edges_from(caller).iter().map(|e| e.callee.as_str()).collect()
    }

    pub fn callers_of(&self, callee: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.callee == callee)
            .map(|e| e.caller.as_str())
            .collect()
    }

    /// External callee names of `caller` with their call counts.
    pub fn external_calls_of(&self, caller: &str) -> BTreeMap<String, usize> {
        self.edges_from(caller)
            .iter()
            .find(|e| e.callee == EXTERNAL_NODE)
            .map(|e| e.external_names.clone())
            .unwrap_or_default()
    }

    /// Functions nobody else calls.
    pub fn roots(&self) -> Vec<String> {
        self.functions()
            .filter(|n| n.fan_in == 0)
            .map(|n| n.name.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn compute_stats(&self) -> GraphStats {
        let functions: Vec<&GraphNode> = self.functions().collect();
        let total_functions = functions.len();
        let internal: Vec<&GraphEdge> = self.edges.iter().filter(|e| e.callee != EXTERNAL_NODE).collect();
        let external_names: BTreeSet<&str> = self
            .edges
            .iter()
            .flat_map(|e| e.external_names.keys().map(String::as_str))
            .collect();
        let avg_complexity = if total_functions == 0 {
            0.0
        } else {
            functions.iter().map(|n| n.cyclomatic as f64).sum::<f64>() / total_functions as f64
        };

        GraphStats {
            total_functions,
            total_edges: internal.len(),
            total_calls: internal.iter().map(|e| e.count).sum(),
            external_calls: self
                .edges
                .iter()
                .filter(|e| e.callee == EXTERNAL_NODE)
                .map(|e| e.count)
                .sum(),
            distinct_external_names: external_names.len(),
            max_fan_in: functions.iter().map(|n| n.fan_in).max().unwrap_or(0),
            max_fan_out: functions.iter().map(|n| n.fan_out).max().unwrap_or(0),
            max_call_depth: self.max_depth_from(self.roots()),
            cycle_count: self.cycles.len(),
            recursive_functions: functions.iter().filter(|n| n.self_recursive || n.in_cycle).count(),
            avg_complexity,
        }
    }
}

/// 2·fan-in + 0.5·fan-out + 0.1·cyclomatic
pub fn importance(fan_in: usize, fan_out: usize, cyclomatic: usize) -> f64 {
    2.0 * fan_in as f64 + 0.5 * fan_out as f64 + 0.1 * cyclomatic as f64
}

fn find_cycles<'a>(names: impl Iterator<Item = &'a str>, edges: &'a [GraphEdge]) -> Vec<Cycle> {
    let mut g: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in names {
        g.add_node(name);
    }
    for e in edges {
        if e.callee != EXTERNAL_NODE && e.caller != e.callee {
            g.add_edge(e.caller.as_str(), e.callee.as_str(), ());
        }
    }
    let mut cycles: Vec<Cycle> = tarjan_scc(&g)
        .into_iter()
        .filter(|scc| scc.len() >= 2)
        .map(|scc| {
            let mut members: Vec<String> = scc.into_iter().map(String::from).collect();
            members.sort();
            Cycle { members }
        })
        .collect();
    cycles.sort_by(|a, b| a.members.cmp(&b.members));
    cycles
}

fn find_components(nodes: &[GraphNode], edges: &[GraphEdge]) -> Vec<Component> {
    let functions: Vec<&GraphNode> = nodes.iter().filter(|n| !n.external).collect();
    let index: HashMap<&str, usize> = functions
        .iter()
        .enumerate()
        .map(|(i, n)| (n.name.as_str(), i))
        .collect();

    let mut uf = UnionFind::<usize>::new(functions.len());
    for e in edges {
        if let (Some(&a), Some(&b)) = (index.get(e.caller.as_str()), index.get(e.callee.as_str())) {
            uf.union(a, b);
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..functions.len() {
        groups.entry(uf.find(i)).or_default().push(i);
    }

    let mut components: Vec<Component> = groups
        .into_values()
        .map(|members| Component {
            has_cycle: members
                .iter()
                .any(|&i| functions[i].in_cycle || functions[i].self_recursive),
            members: members.iter().map(|&i| functions[i].name.clone()).collect(),
        })
        .collect();
    components.sort_by(|a, b| a.members.cmp(&b.members));
    components
}

/// Top `max(1, n / 10)` functions by importance, ties broken by name.
fn pick_critical(nodes: &[GraphNode]) -> Vec<String> {
    let mut ranked: Vec<&GraphNode> = nodes.iter().filter(|n| !n.external).collect();
    if ranked.is_empty() {
        return Vec::new();
    }
    ranked.sort_by(|a, b| {
        b.importance
            .total_cmp(&a.importance)
            .then_with(|| a.name.cmp(&b.name))
    });
    let take = (ranked.len() / 10).max(1);
    ranked.into_iter().take(take).map(|n| n.name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::metrics::ComplexityMetrics;
    use crate::source::Span;

    fn make_func(name: &str, start: usize, calls: &[(&str, usize)]) -> FunctionRecord {
        FunctionRecord {
            name: name.to_string(),
            ordinal: 1,
            signature: format!("void {}(void)", name),
            return_type: "void".to_string(),
            params: "void".to_string(),
            chunk_id: 1,
            span: Span::new(start, start + 10, start + 1, start + 1),
            body: Span::new(start + 5, start + 10, start + 1, start + 1),
            text: String::new(),
            incomplete: false,
            calls: calls.iter().map(|(n, c)| (n.to_string(), *c)).collect(),
            metrics: ComplexityMetrics {
                cyclomatic: 1,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_empty_graph() {
        let g = DependencyGraph::build(std::iter::empty());
        assert!(g.is_empty());
        assert!(g.critical_functions.is_empty());
        assert_eq!(g.stats.max_call_depth, 0);
    }

    #[test]
    fn test_internal_and_external_edges() {
        let funcs = vec![
            make_func("main", 0, &[("parse", 1), ("printf", 2)]),
            make_func("parse", 20, &[("strlen", 1), ("printf", 1)]),
        ];
        let g = DependencyGraph::build(&funcs);

        assert_eq!(g.callees_of("main"), vec![EXTERNAL_NODE, "parse"]);
        let ext = g.external_calls_of("main");
        assert_eq!(ext.get("printf"), Some(&2));

        let external = g.node(EXTERNAL_NODE).unwrap();
        assert!(external.external);
        assert_eq!(external.fan_in, 2);
        assert_eq!(g.stats.external_calls, 4);
        assert_eq!(g.stats.distinct_external_names, 2);
        assert_eq!(g.stats.total_edges, 1);
        assert_eq!(g.node("parse").unwrap().fan_in, 1);
        assert_eq!(g.node("main").unwrap().fan_out, 2);
    }

    #[test]
    fn test_mutual_recursion_is_a_cycle() {
        let funcs = vec![
            make_func("even", 0, &[("odd", 1)]),
            make_func("odd", 20, &[("even", 1)]),
            make_func("lonely", 40, &[]),
        ];
        let g = DependencyGraph::build(&funcs);
        assert_eq!(g.cycles.len(), 1);
        assert_eq!(g.cycles[0].members, vec!["even", "odd"]);
        assert_eq!(g.components.len(), 2);
        let with_cycle = g.components.iter().find(|c| c.has_cycle).unwrap();
        assert_eq!(with_cycle.members, vec!["even", "odd"]);
    }

    #[test]
    fn test_self_recursion_is_flagged_not_counted_as_fan() {
        let funcs = vec![make_func("fact", 0, &[("fact", 3)])];
        let g = DependencyGraph::build(&funcs);
        let n = g.node("fact").unwrap();
        assert!(n.self_recursive);
        assert_eq!(n.fan_in, 0);
        assert_eq!(n.fan_out, 0);
        assert!(g.cycles.is_empty());
        assert!(g.components[0].has_cycle);
    }

    #[test]
    fn test_duplicate_definitions_merge() {
        let mut second = make_func("dup", 50, &[("b", 1)]);
        second.ordinal = 2;
        let funcs = vec![make_func("dup", 0, &[("a", 1)]), second];
        let g = DependencyGraph::build(&funcs);
        let n = g.node("dup").unwrap();
        assert_eq!(n.definitions, 2);
        assert_eq!(n.header_line, 1);
        assert_eq!(g.external_calls_of("dup").len(), 2);
    }

    #[test]
    fn test_order_independent() {
        let a = vec![
            make_func("x", 0, &[("y", 1), ("z", 2)]),
            make_func("y", 20, &[("z", 1), ("memcpy", 1)]),
            make_func("z", 40, &[("x", 1)]),
        ];
        let mut b = a.clone();
        b.reverse();
        assert_eq!(DependencyGraph::build(&a), DependencyGraph::build(&b));
    }

    #[test]
    fn test_critical_and_depth() {
        let funcs = vec![
            make_func("main", 0, &[("a", 1), ("b", 1)]),
            make_func("a", 20, &[("util", 1)]),
            make_func("b", 40, &[("util", 1)]),
            make_func("util", 60, &[]),
        ];
        let g = DependencyGraph::build(&funcs);
        assert_eq!(g.critical_functions, vec!["util"]);
        assert_eq!(g.stats.max_call_depth, 2);
        assert_eq!(g.roots(), vec!["main"]);
    }

    #[test]
    fn test_serde_round_trip_keeps_lookups() {
        let funcs = vec![make_func("main", 0, &[("helper", 1), ("exit", 1)]), make_func("helper", 20, &[])];
        let g = DependencyGraph::build(&funcs);
        let json = serde_json::to_string(&g).unwrap();
        let back: DependencyGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back.callees_of("main"), g.callees_of("main"));
        assert!(back.node(EXTERNAL_NODE).is_some());
    }

    #[test]
    fn test_deserialize_restores_lookup_order() {
        let funcs = vec![
            make_func("main", 0, &[("helper", 1), ("exit", 1), ("abort", 2)]),
            make_func("helper", 20, &[("util", 1)]),
            make_func("util", 40, &[]),
        ];
        let g = DependencyGraph::build(&funcs);
        let mut json = serde_json::to_value(&g).unwrap();
        for key in ["nodes", "edges"] {
            json[key].as_array_mut().unwrap().reverse();
        }

        let back: DependencyGraph = serde_json::from_value(json).unwrap();
        assert_eq!(back, g);
        assert_eq!(back.node("helper").unwrap().fan_in, 1);
        assert!(back.node(EXTERNAL_NODE).unwrap().external);
        assert_eq!(back.callees_of("main"), vec![EXTERNAL_NODE, "helper"]);
        assert_eq!(back.callees_of("helper"), vec!["util"]);
    }
}
