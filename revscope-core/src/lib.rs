//! revscope-core: structural analysis engine for large decompiled C sources
//!
//! Recovers program structure from raw, often non-compilable, decompiler
//! output using lexical analysis alone. No compiler front end and no
//! preprocessing: malformed braces, inline assembly and truncated functions
//! are flagged, never fatal.
//!
//! # Features
//!
//! - **Chunking**: split huge files into boundary-safe, size-bounded chunks
//! - **Function extraction**: signatures, bodies, calls and metrics
//! - **Call graph**: fan-in/fan-out, cycles, components, critical functions
//! - **Risk scoring**: ordered, configurable table of security patterns
//! - **Search**: typed regex search over classified tokens
//! - **Diagrams**: size-bounded diagram specs, Mermaid and DOT text
//! - **Advice and reports**: ranked refactor suggestions, markdown reports
//!
//! # Quick Start
//!
//! Use the [`prelude`] module for convenient imports:
//!
//! ```rust,ignore
//! use revscope_core::prelude::*;
//!
//! let analysis = Revscope::new()
//!     .max_chunk_size(400)
//!     .analyze(&SourceInput::from_path("firmware.c"))?;
//!
//! for cycle in &analysis.graph.cycles {
//!     println!("cycle: {}", cycle.members.join(" -> "));
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`lexer`]: classified token stream with brace/paren depth
//! - [`chunk`]: boundary-safe chunking
//! - [`func`]: function definition extraction
//! - [`callgraph`]: call sites and the dependency graph
//! - [`score`]: complexity metrics, risk table, lexical signals
//! - [`search`]: typed pattern search
//! - [`diagram`]: renderer-neutral diagram specs
//! - [`advisor`]: refactor suggestion table
//! - [`report`]: report synthesis
//! - [`recommend`]: next-capability heuristic
//! - [`ops`]: request/response operations and the JSON dispatcher
//! - [`builder`]: fluent whole-file pipeline
//! - [`error`]: typed error handling
//!
//! # Cargo Features
//!
//! - `render` (default): Mermaid and Graphviz DOT text emitters
//! - `full`: Enable all optional features

// Core modules (always available)
pub mod advisor;
pub mod builder;
pub mod callgraph;
pub mod chunk;
pub mod common;
pub mod config;
pub mod diagram;
pub mod error;
pub mod func;
pub mod hints;
pub mod history;
pub mod lexer;
pub mod logging;
pub mod ops;
pub mod prelude;
pub mod recommend;
pub mod report;
pub mod scan;
pub mod score;
pub mod search;
pub mod source;

// Common trait re-exports
pub use common::GraphTraversal;

// Feature-gated modules
#[cfg(feature = "render")]
pub mod visualize;

// ============================================================================
// Explicit Re-exports (avoiding glob imports for clear API surface)
// ============================================================================

// Error types
pub use error::{IoResultExt, RevscopeError, RevscopeResult};

// Source and scanning
pub use lexer::{scan as scan_tokens, Token, TokenKind};
pub use source::{LineIndex, SourceFile, SourceInfo, SourceInput, Span};

// Chunking and extraction
pub use chunk::{chunk_source, plan_chunks, Chunk, ChunkBounds};
pub use func::{assign_ordinals, extract_functions, fragment_record, FunctionRecord};

// Call graph
pub use callgraph::{
    build_from_chunks, extract_call_sites, extract_calls, CallSite, Component, Cycle,
    DependencyGraph, GraphEdge, GraphNode, GraphStats, EXTERNAL_NODE,
};

// Scoring
pub use score::{
    complexity_level, worst_severity, ComplexityMetrics, LexicalSignals, RiskFinding,
    RiskOverrides, RiskRule, RiskTable, Severity,
};

// Search, diagrams, advice
pub use advisor::{advise, Advice, AdvisorInput, AdvisorThresholds, Priority, Suggestion};
pub use diagram::{render, ChartKind, DiagramSpec, GraphInput, InputEdge};
pub use search::{search, MatchKind, SearchMatch, SearchQuery, SearchType};

// Reports and recommendations
pub use recommend::{recommend, NextStep, Recommendation};
pub use report::{print_json, print_plain, security_score, synthesize, Report, RiskSummary, SectionSource};

// Pipeline, operations, history
pub use builder::{analyze_function_text, FileAnalysis, FunctionAnalysis, Revscope};
pub use history::{History, HistoryEntry};
pub use ops::{Engine, FollowUp, Operation};

// Configuration
pub use config::{load_config, load_config_file, AnalysisConfig, RevscopeConfig, CONFIG_FILE};

// Logging
pub use logging::{init_structured_logging, log_operation, log_operation_failure, log_rejected_request};

// File discovery
pub use scan::{analyze_files_parallel, gather_c_files, gather_c_files_with_excludes, FileSummary};

#[cfg(feature = "render")]
pub use visualize::{to_dot, to_mermaid};

#[cfg(test)]
mod tests;
