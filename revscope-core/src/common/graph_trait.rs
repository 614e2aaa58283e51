//! Graph traversal abstraction.
//!
//! Implementors supply adjacency; reachability and BFS levels come for free.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

/// Directed graph walked by breadth-first search.
///
/// # Example
/// ```ignore
/// impl GraphTraversal for DependencyGraph {
///     type Node = String;
///
///     fn neighbors(&self, node: &String) -> Vec<String> {
///         self.callees_of(node).into_iter().map(String::from).collect()
///     }
///
///     fn contains_node(&self, node: &String) -> bool {
///         self.node(node).is_some()
///     }
/// }
///
/// let depth = graph.max_depth_from(graph.roots());
/// ```
pub trait GraphTraversal {
    /// Node identifier.
    type Node: Clone + Eq + Hash;

    /// Outgoing neighbors of `node`.
    fn neighbors(&self, node: &Self::Node) -> Vec<Self::Node>;

    fn contains_node(&self, node: &Self::Node) -> bool;

    /// Every node reachable from any of `roots`, roots included.
    ///
    /// Single multi-source BFS: O(|V| + |E|) however many roots there are.
    /// Roots not in the graph are ignored.
    fn reachable_from<I>(&self, roots: I) -> HashSet<Self::Node>
    where
        I: IntoIterator<Item = Self::Node>,
    {
        self.levels_from(roots).into_keys().collect()
    }

    /// Convenience wrapper around `reachable_from` for one root.
    fn reachable_from_single(&self, root: Self::Node) -> HashSet<Self::Node> {
        self.reachable_from(std::iter::once(root))
    }

    /// BFS level of every reachable node (roots are level 0).
    fn levels_from<I>(&self, roots: I) -> HashMap<Self::Node, usize>
    where
        I: IntoIterator<Item = Self::Node>,
    {
        let mut levels = HashMap::new();
        let mut queue = VecDeque::new();

        for root in roots {
            if self.contains_node(&root) && !levels.contains_key(&root) {
                levels.insert(root.clone(), 0);
                queue.push_back((root, 0));
            }
        }

        while let Some((node, level)) = queue.pop_front() {
            for next in self.neighbors(&node) {
                if !levels.contains_key(&next) {
                    levels.insert(next.clone(), level + 1);
                    queue.push_back((next, level + 1));
                }
            }
        }

        levels
    }

    /// Deepest BFS level reached from `roots`; 0 for an empty walk.
    fn max_depth_from<I>(&self, roots: I) -> usize
    where
        I: IntoIterator<Item = Self::Node>,
    {
        self.levels_from(roots).into_values().max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct AdjGraph {
        nodes: HashSet<String>,
        edges: HashMap<String, Vec<String>>,
    }

    impl AdjGraph {
        fn with_edges(edges: &[(&str, &str)]) -> Self {
            let mut g = Self::default();
            for (from, to) in edges {
                g.nodes.insert(from.to_string());
                g.nodes.insert(to.to_string());
                g.edges.entry(from.to_string()).or_default().push(to.to_string());
            }
            g
        }
    }

    impl GraphTraversal for AdjGraph {
        type Node = String;

        fn neighbors(&self, node: &String) -> Vec<String> {
            self.edges.get(node).cloned().unwrap_or_default()
        }

        fn contains_node(&self, node: &String) -> bool {
            self.nodes.contains(node)
        }
    }

    #[test]
    fn test_empty_walk() {
        let g = AdjGraph::default();
        assert!(g.reachable_from(Vec::<String>::new()).is_empty());
        assert_eq!(g.max_depth_from(Vec::<String>::new()), 0);
    }

    #[test]
    fn test_chain_levels() {
        let g = AdjGraph::with_edges(&[("main", "parse"), ("parse", "read_byte"), ("main", "log")]);
        let levels = g.levels_from(["main".to_string()]);
        assert_eq!(levels["main"], 0);
        assert_eq!(levels["parse"], 1);
        assert_eq!(levels["log"], 1);
        assert_eq!(levels["read_byte"], 2);
        assert_eq!(g.max_depth_from(["main".to_string()]), 2);
    }

    #[test]
    fn test_cycle_terminates() {
        let g = AdjGraph::with_edges(&[("a", "b"), ("b", "c"), ("c", "a")]);
        assert_eq!(g.reachable_from_single("a".to_string()).len(), 3);
    }

    #[test]
    fn test_missing_root_ignored() {
        let g = AdjGraph::with_edges(&[("a", "b")]);
        let reach = g.reachable_from(["a".to_string(), "nope".to_string()]);
        assert_eq!(reach.len(), 2);
        assert!(!reach.contains("nope"));
    }
}
