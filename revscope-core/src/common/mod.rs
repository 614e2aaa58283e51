//! Shared graph utilities.
//!
//! The dependency graph and the diagram layout both walk caller → callee
//! edges; the BFS logic lives here once.

mod graph_trait;

pub use graph_trait::GraphTraversal;
