//! Builder pattern API for whole-file analysis.
//!
//! Provides a fluent interface for configuring and running the full
//! pipeline (scan, chunk, extract, graph, score, advise) over one file:
//!
//! ```rust,ignore
//! use revscope_core::prelude::*;
//!
//! let analysis = Revscope::new()
//!     .max_chunk_size(400)
//!     .with_thresholds(AdvisorThresholds::default())
//!     .analyze(&SourceInput::from_path("firmware.c"))?;
//!
//! println!("{} functions in {} chunks", analysis.function_count(), analysis.chunks.len());
//! ```

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::advisor::{advise, Advice, AdvisorInput, AdvisorThresholds};
use crate::callgraph::{build_from_chunks, DependencyGraph};
use crate::chunk::{chunk_source, Chunk};
use crate::config::RevscopeConfig;
use crate::error::{RevscopeError, RevscopeResult};
use crate::func::{assign_ordinals, extract_functions, fragment_record, FunctionRecord};
use crate::hints::purpose_hints;
use crate::lexer::{scan, significant, Token};
use crate::score::{
    collect_signals, complexity_level, worst_severity, LexicalSignals, RiskFinding, RiskTable, Severity,
};
use crate::source::{SourceFile, SourceInfo, SourceInput, Span};

/// Default chunk size in lines.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 600;

/// Builder for configuring file analysis.
///
/// # Example
///
/// ```rust,ignore
/// let analysis = Revscope::from_config(&cfg)?.analyze_path(Path::new("dump.c"))?;
/// ```
#[derive(Debug, Clone)]
pub struct Revscope {
    /// Chunk size in lines
    max_chunk_size: usize,

    /// Risk catalog (built-in or overridden)
    risk: RiskTable,

    /// Advisor metric limits
    thresholds: AdvisorThresholds,
}

impl Default for Revscope {
    fn default() -> Self {
        Self::new()
    }
}

impl Revscope {
    /// Builder with default limits and the built-in risk catalog.
    pub fn new() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            risk: RiskTable::builtin(),
            thresholds: AdvisorThresholds::default(),
        }
    }

    /// Builder seeded from a validated configuration.
    pub fn from_config(cfg: &RevscopeConfig) -> RevscopeResult<Self> {
        Ok(Self {
            max_chunk_size: cfg.analysis.max_chunk_size,
            risk: cfg.risk_table()?,
            thresholds: cfg.thresholds,
        })
    }

    /// Set the chunk size in lines.
    pub fn max_chunk_size(mut self, lines: usize) -> Self {
        self.max_chunk_size = lines;
        self
    }

    /// Replace the risk catalog.
    pub fn with_risk_table(mut self, table: RiskTable) -> Self {
        self.risk = table;
        self
    }

    /// Replace the advisor thresholds.
    pub fn with_thresholds(mut self, thresholds: AdvisorThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn chunk_limit(&self) -> usize {
        self.max_chunk_size
    }

    pub fn risk_table(&self) -> &RiskTable {
        &self.risk
    }

    pub fn thresholds(&self) -> &AdvisorThresholds {
        &self.thresholds
    }

    /// Load `input` and analyze it.
    pub fn analyze(&self, input: &SourceInput) -> RevscopeResult<FileAnalysis> {
        self.check()?;
        let file = input.load()?;
        self.analyze_file(&file)
    }

    /// Load the file at `path` and analyze it.
    pub fn analyze_path(&self, path: &Path) -> RevscopeResult<FileAnalysis> {
        self.check()?;
        let file = SourceFile::load(path)?;
        self.analyze_file(&file)
    }

    /// Run the whole pipeline over an already loaded file.
    pub fn analyze_file(&self, file: &SourceFile) -> RevscopeResult<FileAnalysis> {
        self.check()?;
        let text = file.text();
        let tokens = scan(text);
        let chunks = chunk_source(file, &tokens, self.max_chunk_size)?;
        let graph = build_from_chunks(&chunks);

        let sig = significant(&tokens);
        let records: Vec<&FunctionRecord> = chunks.iter().flat_map(|c| c.functions.iter()).collect();

        let scored: Vec<Scored> = records
            .par_iter()
            .map(|r| score_record(text, &sig, r, &self.risk, &self.thresholds))
            .collect();

        let mut findings = Vec::new();
        let mut advice = Vec::new();
        for s in scored {
            findings.extend(s.findings);
            if !s.advice.is_empty() {
                advice.push(s.advice);
            }
        }
        let spans: Vec<Span> = records.iter().map(|r| r.span).collect();
        let residual = outside_spans(&sig, &spans);
        findings.extend(self.risk.evaluate(text, &residual, None));

        for r in records.iter().filter(|r| r.incomplete) {
            tracing::warn!(function = %r.key(), line = r.header_line(), "function body truncated at end of input");
        }
        tracing::info!(
            file = %file.name(),
            chunks = chunks.len(),
            functions = records.len(),
            findings = findings.len(),
            "analysis complete"
        );

        Ok(FileAnalysis {
            source: file.info(),
            max_chunk_size: self.max_chunk_size,
            chunks,
            graph,
            findings,
            advice,
        })
    }

    /// Analyze a standalone function snippet.
    pub fn analyze_function(&self, text: &str, name: Option<&str>) -> FunctionAnalysis {
        analyze_function_text(text, name, &self.risk, &self.thresholds)
    }

    fn check(&self) -> RevscopeResult<()> {
        if self.max_chunk_size == 0 {
            return Err(RevscopeError::invalid_argument("max_chunk_size must be at least 1"));
        }
        Ok(())
    }
}

/// Result of analyzing one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub source: SourceInfo,
    pub max_chunk_size: usize,
    pub chunks: Vec<Chunk>,
    pub graph: DependencyGraph,
    /// Per function in file order (table order within a function), then
    /// findings outside any function.
    pub findings: Vec<RiskFinding>,
    /// Functions with at least one suggestion, in file order.
    pub advice: Vec<Advice>,
}

impl FileAnalysis {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionRecord> {
        self.chunks.iter().flat_map(|c| c.functions.iter())
    }

    pub fn function_count(&self) -> usize {
        self.chunks.iter().map(|c| c.functions.len()).sum()
    }

    /// High and critical findings.
    pub fn severe_findings(&self) -> usize {
        self.findings.iter().filter(|f| f.severity >= Severity::High).count()
    }

    /// Findings attributed to the function with `key`.
    pub fn findings_in<'s>(&'s self, key: &'s str) -> impl Iterator<Item = &'s RiskFinding> + 's {
        self.findings.iter().filter(move |f| f.function.as_deref() == Some(key))
    }
}

/// Result of analyzing one function snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionAnalysis {
    /// `None` for empty input
    pub record: Option<FunctionRecord>,
    pub findings: Vec<RiskFinding>,
    pub signals: LexicalSignals,
    pub purpose_hints: Vec<String>,
    pub error_handling: Vec<String>,
    pub complexity_level: String,
    pub risk_level: Option<Severity>,
    pub advice: Advice,
}

/// Analyze `text` as a single function.
///
/// When `name` is given the matching definition is picked, otherwise (or
/// when no definition has that name) the first one. Text without any
/// recognizable definition is measured as a bare body.
pub fn analyze_function_text(
    text: &str,
    name: Option<&str>,
    risk: &RiskTable,
    thresholds: &AdvisorThresholds,
) -> FunctionAnalysis {
    let label = name.unwrap_or("<fragment>");
    if text.trim().is_empty() {
        let signals = LexicalSignals::default();
        let advice = advise(
            AdvisorInput {
                function: label,
                metrics: &Default::default(),
                findings: &[],
                signals: &signals,
            },
            thresholds,
        );
        return FunctionAnalysis {
            record: None,
            findings: Vec::new(),
            signals,
            purpose_hints: Vec::new(),
            error_handling: Vec::new(),
            complexity_level: "low".to_string(),
            risk_level: None,
            advice,
        };
    }

    let tokens = scan(text);
    let mut records = extract_functions(text, &tokens, 0);
    assign_ordinals(records.iter_mut());
    let picked = name
        .and_then(|n| records.iter().position(|r| r.name == n))
        .unwrap_or(0);
    let record = if records.is_empty() {
        fragment_record(label, text, &tokens)
    } else {
        records.swap_remove(picked)
    };

    let sig = significant(&tokens);
    let scored = score_record(text, &sig, &record, risk, thresholds);
    FunctionAnalysis {
        purpose_hints: purpose_hints(&record.name).into_iter().map(String::from).collect(),
        error_handling: scored.signals.error_handling(),
        complexity_level: complexity_level(&record.metrics).to_string(),
        risk_level: worst_severity(&scored.findings),
        findings: scored.findings,
        signals: scored.signals,
        advice: scored.advice,
        record: Some(record),
    }
}

struct Scored {
    findings: Vec<RiskFinding>,
    signals: LexicalSignals,
    advice: Advice,
}

fn score_record(
    text: &str,
    sig: &[&Token<'_>],
    record: &FunctionRecord,
    risk: &RiskTable,
    thresholds: &AdvisorThresholds,
) -> Scored {
    let key = record.key();
    // Header tokens (the function's own name, parameter names) never match.
    let body = within(sig, record.body);
    let findings = risk.evaluate(text, body, Some(&key));
    let signals = collect_signals(body);
    let advice = advise(
        AdvisorInput {
            function: &key,
            metrics: &record.metrics,
            findings: &findings,
            signals: &signals,
        },
        thresholds,
    );
    Scored {
        findings,
        signals,
        advice,
    }
}

/// Tokens starting inside `span`. `sig` is in file order.
fn within<'t, 'a>(sig: &'t [&'t Token<'a>], span: Span) -> &'t [&'t Token<'a>] {
    let lo = sig.partition_point(|t| t.span.start < span.start);
    let hi = sig.partition_point(|t| t.span.start < span.end);
    &sig[lo..hi.max(lo)]
}

/// Tokens outside every span. `spans` are sorted and disjoint.
fn outside_spans<'t, 'a>(sig: &[&'t Token<'a>], spans: &[Span]) -> Vec<&'t Token<'a>> {
    let mut out = Vec::new();
    let mut k = 0;
    for &tok in sig {
        while k < spans.len() && spans[k].end <= tok.span.start {
            k += 1;
        }
        if k < spans.len() && tok.span.start >= spans[k].start {
            continue;
        }
        out.push(tok);
    }
    out
}
