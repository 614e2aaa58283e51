//! Prelude module for convenient imports.
//!
//! Import commonly used types with a single line:
//!
//! ```rust,ignore
//! use revscope_core::prelude::*;
//! ```
//!
//! This provides the types most callers need to run an analysis without
//! pulling in every per-component helper.

// Errors
pub use crate::error::{RevscopeError, RevscopeResult};

// Inputs
pub use crate::source::{SourceFile, SourceInput};

// Pipeline
pub use crate::builder::{FileAnalysis, FunctionAnalysis, Revscope};
pub use crate::chunk::Chunk;
pub use crate::func::FunctionRecord;

// Graph
pub use crate::callgraph::DependencyGraph;
pub use crate::common::GraphTraversal;

// Scoring and advice
pub use crate::advisor::{Advice, AdvisorThresholds};
pub use crate::score::{RiskFinding, RiskTable, Severity};

// Operations
pub use crate::diagram::{ChartKind, DiagramSpec};
pub use crate::ops::Engine;
pub use crate::report::Report;
pub use crate::search::{SearchQuery, SearchType};

// Configuration
pub use crate::config::{load_config, RevscopeConfig};
