//! Operation layer: one entry point per component, plus a JSON dispatcher.
//!
//! Every operation takes a flat request record and returns a serializable
//! response or a typed [`RevscopeError`]. Arguments are validated before
//! any scanning happens. Each call, successful or not, appends one entry
//! to the injected [`History`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::advisor::Advice;
use crate::builder::{FileAnalysis, FunctionAnalysis, Revscope};
use crate::callgraph::{build_from_chunks, DependencyGraph};
use crate::chunk::{chunk_source, Chunk};
use crate::config::RevscopeConfig;
use crate::diagram::{render, ChartKind, DiagramSpec, GraphInput};
use crate::error::{RevscopeError, RevscopeResult};
use crate::func::FunctionRecord;
use crate::history::{History, HistoryEntry};
use crate::lexer::scan;
use crate::logging::{log_operation, log_operation_failure, log_rejected_request};
use crate::recommend::{recommend, NextStep, Recommendation};
use crate::report::{summarize_risks, synthesize, Report, RiskSummary};
use crate::score::RiskFinding;
use crate::search::{search, MatchKind, SearchMatch, SearchQuery, SearchType};
use crate::source::{SourceInfo, SourceInput};

/// History entries returned alongside recommendations.
const RECENT_HISTORY: usize = 5;

/// Operations understood by [`Engine::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Chunk,
    AnalyzeFunction,
    AnalyzeDependencies,
    Search,
    RenderDiagram,
    Refactor,
    Audit,
    Report,
    Recommend,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Self::Chunk,
        Self::AnalyzeFunction,
        Self::AnalyzeDependencies,
        Self::Search,
        Self::RenderDiagram,
        Self::Refactor,
        Self::Audit,
        Self::Report,
        Self::Recommend,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chunk => "chunk",
            Self::AnalyzeFunction => "analyze_function",
            Self::AnalyzeDependencies => "analyze_dependencies",
            Self::Search => "search",
            Self::RenderDiagram => "render_diagram",
            Self::Refactor => "refactor",
            Self::Audit => "audit",
            Self::Report => "report",
            Self::Recommend => "recommend",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = RevscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "chunk" | "chunk_code" | "split" => Ok(Self::Chunk),
            "analyze_function" | "function" | "analyze" => Ok(Self::AnalyzeFunction),
            "analyze_dependencies" | "dependencies" | "deps" | "call_graph" => Ok(Self::AnalyzeDependencies),
            "search" | "search_code" => Ok(Self::Search),
            "render_diagram" | "diagram" | "generate_diagram" | "visualize" => Ok(Self::RenderDiagram),
            "refactor" | "refactor_suggestions" | "suggest_refactor" => Ok(Self::Refactor),
            "audit" | "security_audit" => Ok(Self::Audit),
            "report" | "generate_report" => Ok(Self::Report),
            "recommend" | "smart_assistant" => Ok(Self::Recommend),
            other => Err(RevscopeError::invalid_argument(format!("unknown operation `{}`", other))),
        }
    }
}

// ============================================================================
// Request / response records
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkRequest {
    #[serde(flatten)]
    pub source: SourceInput,
    #[serde(default)]
    pub max_chunk_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResponse {
    pub source: SourceInfo,
    pub max_chunk_size: usize,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionRequest {
    pub function_text: String,
    #[serde(default)]
    pub function_name: Option<String>,
}

/// Graph source for dependency analysis: explicit records, chunks from a
/// previous `chunk` call, or a file to run the pipeline on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyRequest {
    #[serde(default)]
    pub functions: Option<Vec<FunctionRecord>>,
    #[serde(default)]
    pub chunks: Option<Vec<Chunk>>,
    #[serde(flatten)]
    pub source: SourceInput,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(flatten)]
    pub source: SourceInput,
    pub pattern: String,
    /// `function`, `variable`, `string`, `comment` or `any` (default)
    #[serde(default)]
    pub search_type: Option<String>,
    #[serde(default)]
    pub literal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub matches: Vec<SearchMatch>,
    /// Match count before capping
    pub total: usize,
    pub truncated: bool,
}

/// Any graph-like input the renderer accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiagramSource {
    Graph(DependencyGraph),
    Mapping(GraphInput),
    Adjacency(BTreeMap<String, Vec<String>>),
}

impl DiagramSource {
    fn to_input(&self) -> GraphInput {
        match self {
            Self::Graph(g) => GraphInput::from(g),
            Self::Mapping(m) => m.clone(),
            Self::Adjacency(a) => GraphInput::from_adjacency(a),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramRequest {
    pub graph: DiagramSource,
    #[serde(default)]
    pub chart_kind: Option<String>,
    #[serde(default)]
    pub max_nodes: Option<usize>,
    /// Also emit Mermaid text
    #[serde(default)]
    pub mermaid: bool,
    /// Also emit Graphviz DOT text
    #[serde(default)]
    pub dot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramResponse {
    pub spec: DiagramSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mermaid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dot: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceRequest {
    #[serde(flatten)]
    pub source: SourceInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResponse {
    pub source: SourceInfo,
    pub findings: Vec<RiskFinding>,
    pub summary: RiskSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportRequest {
    #[serde(flatten)]
    pub source: SourceInput,
    /// Prior analysis to report on instead of re-analyzing the source
    #[serde(default)]
    pub analysis: Option<FileAnalysis>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportResponse {
    pub report: Report,
    pub markdown: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub recommendations: Vec<Recommendation>,
    /// Most recent operations, oldest first
    pub recent: Vec<HistoryEntry>,
}

// ============================================================================
// Follow-up steps
// ============================================================================

/// Next steps derived from an operation's result, attached by
/// [`Engine::dispatch`] as `next_steps`.
pub trait FollowUp {
    fn next_steps(&self) -> Vec<NextStep>;
}

impl FollowUp for ChunkResponse {
    fn next_steps(&self) -> Vec<NextStep> {
        let names: Vec<&str> = self
            .chunks
            .iter()
            .flat_map(|c| c.functions.iter().map(|f| f.name.as_str()))
            .collect();
        if names.is_empty() {
            return vec![NextStep::new("search", "No functions found; search the text directly")];
        }
        vec![
            NextStep::new(
                "analyze_dependencies",
                format!("Build the call graph of {} functions from these chunks", names.len()),
            ),
            NextStep::new("search", "Locate functions or strings of interest"),
            NextStep::new("audit", "Scan the whole file for risky calls"),
            NextStep::new("analyze_function", "Start with the first function").with_targets(names.into_iter().take(1)),
        ]
    }
}

impl FollowUp for FunctionAnalysis {
    fn next_steps(&self) -> Vec<NextStep> {
        let Some(record) = &self.record else {
            return Vec::new();
        };
        let mut steps = Vec::new();
        if !self.findings.is_empty() {
            steps.push(
                NextStep::new("audit", "Risky calls found; check the rest of the file for the same patterns")
                    .with_targets(self.findings.iter().map(|f| f.matched.as_str())),
            );
        }
        if !self.advice.is_empty() {
            steps.push(
                NextStep::new("refactor", format!("{} refactoring suggestion(s)", self.advice.suggestions.len()))
                    .with_targets([record.name.as_str()]),
            );
        }
        steps.push(NextStep::new("search", "Find the callers of this function").with_targets([record.name.as_str()]));
        steps
    }
}

impl FollowUp for DependencyGraph {
    fn next_steps(&self) -> Vec<NextStep> {
        let mut steps = Vec::new();
        if !self.critical_functions.is_empty() {
            steps.push(
                NextStep::new("analyze_function", "Most connected functions")
                    .with_targets(self.critical_functions.iter().map(String::as_str)),
            );
        }
        if !self.cycles.is_empty() {
            steps.push(
                NextStep::new("refactor", format!("{} recursion cycle(s)", self.cycles.len()))
                    .with_targets(self.cycles.iter().flat_map(|c| c.members.iter().map(String::as_str))),
            );
        }
        steps.push(NextStep::new("render_diagram", "Visualize the call graph"));
        steps.push(NextStep::new("audit", "Check the graph's functions for risky calls"));
        steps
    }
}

impl FollowUp for SearchResponse {
    fn next_steps(&self) -> Vec<NextStep> {
        if self.matches.is_empty() {
            return Vec::new();
        }
        let functions = |definition: bool| {
            self.matches
                .iter()
                .filter(move |m| m.kind == MatchKind::Function && m.is_definition == definition)
                .map(|m| m.matched_text.as_str())
        };
        let mut steps = Vec::new();
        let targets = NextStep::new("analyze_function", "Functions matched by the search")
            .with_targets(functions(true).chain(functions(false)));
        if !targets.targets.is_empty() {
            steps.push(targets);
        }
        if self.truncated {
            steps.push(NextStep::new(
                "search",
                format!("{} of {} matches shown; narrow the pattern", self.matches.len(), self.total),
            ));
        }
        steps.push(NextStep::new("audit", "Check the matched code for risky calls"));
        steps
    }
}

impl FollowUp for DiagramResponse {
    fn next_steps(&self) -> Vec<NextStep> {
        let mut steps = Vec::new();
        if self.spec.truncated {
            steps.push(NextStep::new(
                "render_diagram",
                format!(
                    "{} of {} nodes shown; raise max_nodes",
                    self.spec.nodes.len(),
                    self.spec.total_nodes
                ),
            ));
        }
        if !self.spec.nodes.is_empty() {
            steps.push(
                NextStep::new("analyze_function", "Most connected nodes in the diagram")
                    .with_targets(self.spec.nodes.iter().map(|n| n.label.as_str())),
            );
        }
        steps
    }
}

impl FollowUp for Advice {
    fn next_steps(&self) -> Vec<NextStep> {
        if self.is_empty() {
            return Vec::new();
        }
        vec![NextStep::new("analyze_function", "Re-check metrics after applying the suggestions")
            .with_targets([self.function.as_str()])]
    }
}

impl FollowUp for AuditResponse {
    fn next_steps(&self) -> Vec<NextStep> {
        if self.findings.is_empty() {
            return vec![NextStep::new("report", "No findings; summarize the file")];
        }
        vec![
            NextStep::new(
                "refactor",
                format!("{} finding(s), security score {}", self.summary.total, self.summary.security_score),
            )
            .with_targets(self.findings.iter().filter_map(|f| f.function.as_deref())),
            NextStep::new("search", "Find other uses of the flagged calls")
                .with_targets(self.findings.iter().map(|f| f.matched.as_str())),
            NextStep::new("report", "Summarize the findings"),
        ]
    }
}

impl FollowUp for ReportResponse {
    fn next_steps(&self) -> Vec<NextStep> {
        let summary = &self.report.summary;
        let mut steps = Vec::new();
        if summary.severe_findings > 0 {
            steps.push(NextStep::new(
                "audit",
                format!("{} high or critical finding(s)", summary.severe_findings),
            ));
        }
        if !summary.critical_functions.is_empty() {
            steps.push(
                NextStep::new("analyze_function", "Most connected functions")
                    .with_targets(summary.critical_functions.iter().map(String::as_str)),
            );
        }
        steps
    }
}

impl FollowUp for RecommendResponse {
    fn next_steps(&self) -> Vec<NextStep> {
        Vec::new()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Stateless analysis engine with an injected history.
#[derive(Debug, Clone)]
pub struct Engine {
    config: RevscopeConfig,
    revscope: Revscope,
    chart_kind: ChartKind,
    history: Arc<History>,
}

impl Engine {
    /// Engine with its own history sized from the config.
    pub fn new(config: RevscopeConfig) -> RevscopeResult<Self> {
        let history = Arc::new(History::new(config.analysis.history_capacity));
        Self::with_history(config, history)
    }

    /// Engine sharing an existing history.
    pub fn with_history(config: RevscopeConfig, history: Arc<History>) -> RevscopeResult<Self> {
        config.validate()?;
        Ok(Self {
            revscope: Revscope::from_config(&config)?,
            chart_kind: config.chart_kind()?,
            config,
            history,
        })
    }

    pub fn config(&self) -> &RevscopeConfig {
        &self.config
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn chunk(&self, req: &ChunkRequest) -> RevscopeResult<ChunkResponse> {
        self.track(Operation::Chunk, self.run_chunk(req), |r| {
            format!(
                "{}: {} chunks, {} functions",
                r.source.name,
                r.chunks.len(),
                r.chunks.iter().map(|c| c.functions.len()).sum::<usize>()
            )
        })
    }

    pub fn analyze_function(&self, req: &FunctionRequest) -> RevscopeResult<FunctionAnalysis> {
        let result = Ok(self.revscope.analyze_function(&req.function_text, req.function_name.as_deref()));
        self.track(Operation::AnalyzeFunction, result, |r| {
            let name = r.record.as_ref().map_or("<empty>", |f| f.name.as_str());
            format!("{}: {} complexity, {} findings", name, r.complexity_level, r.findings.len())
        })
    }

    pub fn analyze_dependencies(&self, req: &DependencyRequest) -> RevscopeResult<DependencyGraph> {
        self.track(Operation::AnalyzeDependencies, self.run_dependencies(req), |g| {
            format!(
                "{} functions, {} edges, {} cycles",
                g.stats.total_functions,
                g.stats.total_edges,
                g.cycles.len()
            )
        })
    }

    pub fn search(&self, req: &SearchRequest) -> RevscopeResult<SearchResponse> {
        self.track(Operation::Search, self.run_search(req), |r| {
            format!("`{}`: {} matches", req.pattern, r.total)
        })
    }

    pub fn render_diagram(&self, req: &DiagramRequest) -> RevscopeResult<DiagramResponse> {
        self.track(Operation::RenderDiagram, self.run_diagram(req), |r| {
            let cut = if r.spec.truncated { ", truncated" } else { "" };
            format!("{}: {} of {} nodes{}", r.spec.kind, r.spec.nodes.len(), r.spec.total_nodes, cut)
        })
    }

    pub fn refactor(&self, req: &FunctionRequest) -> RevscopeResult<Advice> {
        let result = Ok(self
            .revscope
            .analyze_function(&req.function_text, req.function_name.as_deref())
            .advice);
        self.track(Operation::Refactor, result, |a| {
            format!("{}: {} suggestions", a.function, a.suggestions.len())
        })
    }

    pub fn audit(&self, req: &SourceRequest) -> RevscopeResult<AuditResponse> {
        self.track(Operation::Audit, self.run_audit(req), |r| {
            format!(
                "{}: {} findings, security score {}",
                r.source.name, r.summary.total, r.summary.security_score
            )
        })
    }

    pub fn report(&self, req: &ReportRequest) -> RevscopeResult<ReportResponse> {
        self.track(Operation::Report, self.run_report(req), |r| {
            format!("{}: {} sections", r.report.summary.file, r.report.sections.len())
        })
    }

    pub fn recommend(&self, req: &RecommendRequest) -> RevscopeResult<RecommendResponse> {
        let result = Ok(RecommendResponse {
            recommendations: recommend(&req.context),
            recent: self.history.recent(RECENT_HISTORY),
        });
        self.track(Operation::Recommend, result, |r| {
            let top = r.recommendations.first().map_or("none", |x| x.operation.as_str());
            format!("top: {}", top)
        })
    }

    /// JSON entry point: `name` is an operation or one of its aliases,
    /// `params` the request record.
    pub fn dispatch(&self, name: &str, params: Value) -> RevscopeResult<Value> {
        let op = match name.parse::<Operation>() {
            Ok(op) => op,
            Err(e) => {
                log_rejected_request(name, &e);
                self.history.record(name, format!("failed: {}", e));
                return Err(e);
            }
        };
        match op {
            Operation::Chunk => self.call(op, params, |r: ChunkRequest| self.chunk(&r)),
            Operation::AnalyzeFunction => self.call(op, params, |r: FunctionRequest| self.analyze_function(&r)),
            Operation::AnalyzeDependencies => self.call(op, params, |r: DependencyRequest| self.analyze_dependencies(&r)),
            Operation::Search => self.call(op, params, |r: SearchRequest| self.search(&r)),
            Operation::RenderDiagram => self.call(op, params, |r: DiagramRequest| self.render_diagram(&r)),
            Operation::Refactor => self.call(op, params, |r: FunctionRequest| self.refactor(&r)),
            Operation::Audit => self.call(op, params, |r: SourceRequest| self.audit(&r)),
            Operation::Report => self.call(op, params, |r: ReportRequest| self.report(&r)),
            Operation::Recommend => self.call(op, params, |r: RecommendRequest| self.recommend(&r)),
        }
    }

    /// Decode `params`, run `f`, encode the response with its
    /// `next_steps`. Decode failures are recorded here; everything else is
    /// recorded by the operation itself.
    fn call<Req, Resp>(
        &self,
        op: Operation,
        params: Value,
        f: impl FnOnce(Req) -> RevscopeResult<Resp>,
    ) -> RevscopeResult<Value>
    where
        Req: for<'de> Deserialize<'de>,
        Resp: Serialize + FollowUp,
    {
        let params = if params.is_null() {
            Value::Object(Default::default())
        } else {
            params
        };
        let req: Req = match serde_json::from_value(params) {
            Ok(req) => req,
            Err(e) => {
                let err = RevscopeError::invalid_argument(format!("invalid parameters for {}: {}", op, e));
                log_rejected_request(op.as_str(), &err);
                self.history.record(op.as_str(), format!("failed: {}", err));
                return Err(err);
            }
        };
        let resp = f(req)?;
        let steps = resp.next_steps();
        let mut out = serde_json::to_value(resp)?;
        if let Value::Object(map) = &mut out {
            map.insert("next_steps".to_string(), serde_json::to_value(steps)?);
        }
        Ok(out)
    }

    fn track<T>(&self, op: Operation, result: RevscopeResult<T>, summary: impl FnOnce(&T) -> String) -> RevscopeResult<T> {
        match &result {
            Ok(value) => {
                let line = summary(value);
                log_operation(op.as_str(), &line);
                self.history.record(op.as_str(), line);
            }
            Err(e) => {
                log_operation_failure(op.as_str(), e);
                self.history.record(op.as_str(), format!("failed: {}", e));
            }
        }
        result
    }

    fn chunk_limit(&self, requested: Option<usize>) -> RevscopeResult<usize> {
        match requested {
            Some(0) => Err(RevscopeError::invalid_argument("max_chunk_size must be at least 1")),
            Some(n) => Ok(n),
            None => Ok(self.revscope.chunk_limit()),
        }
    }

    fn run_chunk(&self, req: &ChunkRequest) -> RevscopeResult<ChunkResponse> {
        let max = self.chunk_limit(req.max_chunk_size)?;
        let file = req.source.load()?;
        let tokens = scan(file.text());
        let chunks = chunk_source(&file, &tokens, max)?;
        Ok(ChunkResponse {
            source: file.info(),
            max_chunk_size: max,
            chunks,
        })
    }

    fn run_dependencies(&self, req: &DependencyRequest) -> RevscopeResult<DependencyGraph> {
        if let Some(functions) = &req.functions {
            return Ok(DependencyGraph::build(functions.iter()));
        }
        if let Some(chunks) = &req.chunks {
            return Ok(build_from_chunks(chunks));
        }
        let file = req.source.load()?;
        let tokens = scan(file.text());
        let chunks = chunk_source(&file, &tokens, self.revscope.chunk_limit())?;
        Ok(build_from_chunks(&chunks))
    }

    fn run_search(&self, req: &SearchRequest) -> RevscopeResult<SearchResponse> {
        let search_type = match &req.search_type {
            Some(s) => s.parse()?,
            None => SearchType::Any,
        };
        let query = SearchQuery::new(req.pattern.clone(), search_type).with_literal(req.literal);
        query.compile()?;
        let file = req.source.load()?;
        let tokens = scan(file.text());
        let mut matches = search(&file, &tokens, &query)?;
        let total = matches.len();
        let cap = self.config.analysis.max_search_results;
        matches.truncate(cap);
        Ok(SearchResponse {
            matches,
            total,
            truncated: total > cap,
        })
    }

    fn run_diagram(&self, req: &DiagramRequest) -> RevscopeResult<DiagramResponse> {
        let kind = match &req.chart_kind {
            Some(k) => k.parse()?,
            None => self.chart_kind,
        };
        let max_nodes = req.max_nodes.unwrap_or(self.config.analysis.max_nodes);
        let spec = render(&req.graph.to_input(), kind, max_nodes)?;
        let (mermaid, dot) = emit_text(&spec, req.mermaid, req.dot);
        Ok(DiagramResponse { spec, mermaid, dot })
    }

    fn run_audit(&self, req: &SourceRequest) -> RevscopeResult<AuditResponse> {
        let analysis = self.revscope.analyze(&req.source)?;
        let summary = summarize_risks(&analysis.findings);
        Ok(AuditResponse {
            source: analysis.source,
            findings: analysis.findings,
            summary,
        })
    }

    fn run_report(&self, req: &ReportRequest) -> RevscopeResult<ReportResponse> {
        let report = match &req.analysis {
            Some(analysis) => synthesize(analysis),
            None => synthesize(&self.revscope.analyze(&req.source)?),
        };
        let markdown = report.to_markdown();
        Ok(ReportResponse { report, markdown })
    }
}

#[cfg(feature = "render")]
fn emit_text(spec: &DiagramSpec, mermaid: bool, dot: bool) -> (Option<String>, Option<String>) {
    (
        mermaid.then(|| crate::visualize::to_mermaid(spec)),
        dot.then(|| crate::visualize::to_dot(spec)),
    )
}

#[cfg(not(feature = "render"))]
fn emit_text(_spec: &DiagramSpec, mermaid: bool, dot: bool) -> (Option<String>, Option<String>) {
    if mermaid || dot {
        tracing::warn!("text emitters disabled, build with the `render` feature");
    }
    (None, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SRC: &str = "int a(void) { return b(); }\nint b(void) { return a(); }\n\
void copy(char *d, char *s) { strcpy(d, s); }\n";

    fn engine() -> Engine {
        Engine::new(RevscopeConfig::default()).unwrap()
    }

    #[test]
    fn test_dispatch_chunk_alias() {
        let e = engine();
        let out = e
            .dispatch("chunk_code", json!({ "text": SRC, "max_chunk_size": 1 }))
            .unwrap();
        assert_eq!(out["chunks"].as_array().unwrap().len(), 3);
        assert_eq!(out["max_chunk_size"], 1);
        assert_eq!(e.history().len(), 1);
        assert_eq!(e.history().snapshot()[0].operation, "chunk");
    }

    #[test]
    fn test_unknown_operation() {
        let e = engine();
        let err = e.dispatch("explode", json!({})).unwrap_err();
        assert!(matches!(err, RevscopeError::InvalidArgument { .. }));
        assert_eq!(e.history().len(), 1);
        assert!(e.history().snapshot()[0].summary.starts_with("failed"));
    }

    #[test]
    fn test_missing_source() {
        let e = engine();
        let err = e.dispatch("audit", json!({})).unwrap_err();
        assert!(matches!(err, RevscopeError::InvalidArgument { .. }));
    }

    #[test]
    fn test_zero_max_chunk_size() {
        let e = engine();
        let req = ChunkRequest {
            source: SourceInput::from_text(SRC),
            max_chunk_size: Some(0),
        };
        assert!(matches!(e.chunk(&req), Err(RevscopeError::InvalidArgument { .. })));
    }

    #[test]
    fn test_dependencies_two_cycle() {
        let e = engine();
        let g = e
            .analyze_dependencies(&DependencyRequest {
                source: SourceInput::from_text(SRC),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(g.cycles.len(), 1);
        assert_eq!(g.cycles[0].members, vec!["a", "b"]);
        let a = g.node("a").unwrap();
        assert_eq!((a.fan_in, a.fan_out), (1, 1));
    }

    #[test]
    fn test_dependencies_from_prior_chunks() {
        let e = engine();
        let chunked = e
            .chunk(&ChunkRequest {
                source: SourceInput::from_text(SRC),
                max_chunk_size: None,
            })
            .unwrap();
        let g = e
            .analyze_dependencies(&DependencyRequest {
                chunks: Some(chunked.chunks),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(g.stats.total_functions, 3);
    }

    #[test]
    fn test_search_cap_and_total() {
        let mut cfg = RevscopeConfig::default();
        cfg.analysis.max_search_results = 2;
        let e = Engine::new(cfg).unwrap();
        let resp = e
            .search(&SearchRequest {
                source: SourceInput::from_text(SRC),
                pattern: "return".to_string(),
                search_type: None,
                literal: true,
            })
            .unwrap();
        assert_eq!(resp.total, 2);
        assert!(!resp.truncated);

        let resp = e
            .search(&SearchRequest {
                source: SourceInput::from_text(SRC),
                pattern: "[ds]".to_string(),
                search_type: Some("variable".to_string()),
                literal: false,
            })
            .unwrap();
        assert_eq!(resp.matches.len(), 2);
        assert!(resp.total > 2);
        assert!(resp.truncated);
    }

    #[test]
    fn test_search_bad_type() {
        let e = engine();
        let err = e
            .dispatch("search_code", json!({ "text": SRC, "pattern": "a", "search_type": "bogus" }))
            .unwrap_err();
        assert!(matches!(err, RevscopeError::InvalidArgument { .. }));
    }

    #[test]
    fn test_render_from_adjacency() {
        let e = engine();
        let out = e
            .dispatch(
                "diagram",
                json!({
                    "graph": { "main": ["init", "loop"], "loop": ["poll"] },
                    "chart_kind": "graph",
                    "max_nodes": 2,
                    "mermaid": true
                }),
            )
            .unwrap();
        assert_eq!(out["spec"]["kind"], "hierarchy");
        assert_eq!(out["spec"]["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(out["spec"]["truncated"], true);
        assert!(out.get("dot").is_none());
        #[cfg(feature = "render")]
        assert!(out["mermaid"].as_str().unwrap().starts_with("graph LR"));
    }

    #[test]
    fn test_render_from_mapping_and_graph() {
        let e = engine();
        let spec = e
            .render_diagram(&DiagramRequest {
                graph: DiagramSource::Mapping(GraphInput {
                    nodes: vec!["x".into()],
                    edges: vec![],
                }),
                chart_kind: None,
                max_nodes: None,
                mermaid: false,
                dot: false,
            })
            .unwrap()
            .spec;
        assert_eq!(spec.kind, ChartKind::Flow);
        assert_eq!(spec.nodes.len(), 1);

        let graph = e
            .analyze_dependencies(&DependencyRequest {
                source: SourceInput::from_text(SRC),
                ..Default::default()
            })
            .unwrap();
        let params = json!({ "graph": serde_json::to_value(&graph).unwrap(), "max_nodes": 0 });
        let err = e.dispatch("render_diagram", params).unwrap_err();
        assert!(matches!(err, RevscopeError::InvalidArgument { .. }));
    }

    #[test]
    fn test_audit_and_report() {
        let e = engine();
        let audit = e
            .audit(&SourceRequest {
                source: SourceInput::from_text(SRC),
            })
            .unwrap();
        assert_eq!(audit.findings.len(), 1);
        assert_eq!(audit.summary.security_score, 94);

        let out = e.dispatch("generate_report", json!({ "text": SRC })).unwrap();
        assert!(out["markdown"].as_str().unwrap().contains("## Call Graph"));
    }

    #[test]
    fn test_function_and_refactor() {
        let e = engine();
        let out = e
            .dispatch("analyze_function", json!({ "function_text": "int add(int a,int b){return a+b;}" }))
            .unwrap();
        assert_eq!(out["record"]["name"], "add");
        assert_eq!(out["record"]["metrics"]["branch_count"], 0);

        let advice = e
            .refactor(&FunctionRequest {
                function_text: "void run(char *c) { system(c); }".to_string(),
                function_name: Some("run".to_string()),
            })
            .unwrap();
        assert_eq!(advice.function, "run");
        assert!(!advice.suggestions.is_empty());
    }

    #[test]
    fn test_recommend_includes_history() {
        let e = engine();
        e.dispatch("audit", json!({ "text": SRC })).unwrap();
        let out = e
            .recommend(&RecommendRequest {
                context: "find a security overflow".to_string(),
            })
            .unwrap();
        assert_eq!(out.recommendations[0].operation, "audit");
        assert_eq!(out.recent.len(), 1);
        assert_eq!(out.recent[0].operation, "audit");
        assert_eq!(e.history().len(), 2);
    }

    #[test]
    fn test_shared_history() {
        let history = Arc::new(History::new(2));
        let e1 = Engine::with_history(RevscopeConfig::default(), Arc::clone(&history)).unwrap();
        let e2 = Engine::with_history(RevscopeConfig::default(), Arc::clone(&history)).unwrap();
        e1.dispatch("recommend", json!({ "context": "chunk" })).unwrap();
        e2.dispatch("recommend", Value::Null).unwrap();
        e2.dispatch("recommend", json!({})).unwrap();
        assert_eq!(history.len(), 2);
    }

    fn targets<'a>(steps: &'a [NextStep], operation: &str) -> Vec<&'a str> {
        steps
            .iter()
            .find(|s| s.operation == operation)
            .map(|s| s.targets.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_dependency_next_steps() {
        let g = engine()
            .analyze_dependencies(&DependencyRequest {
                source: SourceInput::from_text(SRC),
                ..Default::default()
            })
            .unwrap();
        let steps = g.next_steps();
        let critical: Vec<&str> = g.critical_functions.iter().map(String::as_str).collect();
        assert!(!critical.is_empty());
        assert_eq!(steps[0].operation, "analyze_function");
        assert_eq!(steps[0].targets, critical);
        assert_eq!(targets(&steps, "refactor"), vec!["a", "b"]);
        let ops: Vec<&str> = steps.iter().map(|s| s.operation.as_str()).collect();
        assert_eq!(ops[ops.len() - 2..], ["render_diagram", "audit"]);
    }

    #[test]
    fn test_search_next_steps() {
        let e = engine();
        let resp = e
            .search(&SearchRequest {
                source: SourceInput::from_text(SRC),
                pattern: "^[ab]$".to_string(),
                search_type: Some("function".to_string()),
                literal: false,
            })
            .unwrap();
        let steps = resp.next_steps();
        assert_eq!(targets(&steps, "analyze_function"), vec!["a", "b"]);
        assert_eq!(steps.last().unwrap().operation, "audit");

        let empty = e
            .search(&SearchRequest {
                source: SourceInput::from_text(SRC),
                pattern: "nowhere".to_string(),
                search_type: None,
                literal: true,
            })
            .unwrap();
        assert!(empty.next_steps().is_empty());
    }

    #[test]
    fn test_audit_next_steps() {
        let e = engine();
        let audit = e
            .audit(&SourceRequest {
                source: SourceInput::from_text(SRC),
            })
            .unwrap();
        let steps = audit.next_steps();
        assert_eq!(targets(&steps, "refactor"), vec!["copy"]);
        assert_eq!(targets(&steps, "search"), vec!["strcpy"]);

        let clean = e
            .audit(&SourceRequest {
                source: SourceInput::from_text("int add(int a, int b) { return a + b; }\n"),
            })
            .unwrap();
        let ops: Vec<_> = clean.next_steps().into_iter().map(|s| s.operation).collect();
        assert_eq!(ops, vec!["report"]);
    }

    #[test]
    fn test_dispatch_attaches_next_steps() {
        let e = engine();
        let out = e.dispatch("security_audit", json!({ "text": SRC })).unwrap();
        let steps: Vec<NextStep> = serde_json::from_value(out["next_steps"].clone()).unwrap();
        assert_eq!(steps[0].operation, "refactor");
        assert_eq!(steps[0].targets, vec!["copy"]);

        let out = e.dispatch("recommend", json!({ "context": "audit" })).unwrap();
        assert_eq!(out["next_steps"], json!([]));
    }

    #[test]
    fn test_operation_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
    }
}
