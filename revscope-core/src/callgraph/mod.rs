//! Function dependency analysis.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐     ┌─────────────────────┐
//! │   func/extractor    │     │      calls.rs       │
//! │  ─────────────────  │     │  ─────────────────  │
//! │  Function records   │────▶│  Call sites per     │
//! │  per chunk          │     │  function body      │
//! └──────────┬──────────┘     └─────────────────────┘
//!            │
//!            ▼
//!            ┌─────────────────────┐
//!            │      graph.rs       │
//!            │  ─────────────────  │
//!            │  Build call graph   │
//!            │  Cycles, components │
//!            │  Critical functions │
//!            └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use revscope_core::callgraph::build_from_chunks;
//!
//! let graph = build_from_chunks(&chunks);
//! for cycle in &graph.cycles {
//!     println!("mutual recursion: {}", cycle.members.join(" <-> "));
//! }
//! ```

pub mod calls;
pub mod graph;

pub use calls::{extract_call_sites, extract_calls, CallSite};
pub use graph::{
    importance, Component, Cycle, DependencyGraph, GraphEdge, GraphNode, GraphStats, EXTERNAL_NODE,
};

use crate::chunk::Chunk;

/// Build the dependency graph over every function of every chunk.
pub fn build_from_chunks(chunks: &[Chunk]) -> DependencyGraph {
    DependencyGraph::build(chunks.iter().flat_map(|c| c.functions.iter()))
}
