//! Report synthesis and output formatting.
//!
//! A [`Report`] only rearranges what the other components already produced;
//! it never runs analysis of its own. Sections come in a fixed order, each
//! tagged with the component its content comes from.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::builder::FileAnalysis;
use crate::score::{worst_severity, RiskFinding, Severity};

/// Component a report section is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionSource {
    Summary,
    Chunker,
    FunctionExtractor,
    CallGraph,
    RiskScorer,
    Advisor,
}

/// One report section with its markdown body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub source: SectionSource,
    pub title: String,
    pub body: String,
}

/// Headline numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub file: String,
    pub total_lines: usize,
    pub chunk_count: usize,
    pub function_count: usize,
    /// High and critical findings
    pub severe_findings: usize,
    pub cycle_count: usize,
    pub critical_functions: Vec<String>,
}

/// Finding distribution and the derived score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_category: BTreeMap<String, usize>,
    /// 100 minus twice the summed severity weights, floored at 0
    pub security_score: u32,
    /// Worst severity present, `none` without findings
    pub risk_level: String,
}

/// Complete report for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub summary: ReportSummary,
    pub risk: RiskSummary,
    pub sections: Vec<Section>,
}

/// `max(0, 100 − 2·Σweight)`.
pub fn security_score(findings: &[RiskFinding]) -> u32 {
    let weight: u32 = findings.iter().map(|f| f.severity.weight()).sum();
    100u32.saturating_sub(weight.saturating_mul(2))
}

/// Distribution of `findings` by severity and category.
pub fn summarize_risks(findings: &[RiskFinding]) -> RiskSummary {
    let mut summary = RiskSummary {
        total: findings.len(),
        security_score: security_score(findings),
        risk_level: worst_severity(findings).map_or("none", Severity::as_str).to_string(),
        ..Default::default()
    };
    for f in findings {
        *summary.by_severity.entry(f.severity).or_insert(0) += 1;
        *summary.by_category.entry(f.category.clone()).or_insert(0) += 1;
    }
    summary
}

/// Assemble the report for `analysis`.
pub fn synthesize(analysis: &FileAnalysis) -> Report {
    let summary = ReportSummary {
        file: analysis.source.name.clone(),
        total_lines: analysis.source.total_lines,
        chunk_count: analysis.chunks.len(),
        function_count: analysis.function_count(),
        severe_findings: analysis.severe_findings(),
        cycle_count: analysis.graph.cycles.len(),
        critical_functions: analysis.graph.critical_functions.clone(),
    };
    let risk = summarize_risks(&analysis.findings);

    let sections = vec![
        section(SectionSource::Summary, "Summary", |out| write_summary(out, &summary, &risk)),
        section(SectionSource::Chunker, "Chunks", |out| write_chunks(out, analysis)),
        section(SectionSource::FunctionExtractor, "Functions", |out| write_functions(out, analysis)),
        section(SectionSource::CallGraph, "Call Graph", |out| write_graph(out, analysis)),
        section(SectionSource::RiskScorer, "Security Risks", |out| write_risks(out, analysis, &risk)),
        section(SectionSource::Advisor, "Refactoring Suggestions", |out| write_advice(out, analysis)),
    ];

    Report {
        summary,
        risk,
        sections,
    }
}

impl Report {
    /// Markdown rendering, one `##` heading per section.
    pub fn to_markdown(&self) -> String {
        let mut md = format!("# Analysis report: {}\n\n", self.summary.file);
        for s in &self.sections {
            md.push_str("## ");
            md.push_str(&s.title);
            md.push_str("\n\n");
            md.push_str(&s.body);
            if !s.body.ends_with('\n') {
                md.push('\n');
            }
            md.push('\n');
        }
        md
    }

    pub fn section(&self, source: SectionSource) -> Option<&Section> {
        self.sections.iter().find(|s| s.source == source)
    }
}

fn section(source: SectionSource, title: &str, fill: impl FnOnce(&mut String) -> std::fmt::Result) -> Section {
    let mut body = String::new();
    if let Err(e) = fill(&mut body) {
        tracing::error!(error = %e, section = title, "failed to format report section");
    }
    Section {
        source,
        title: title.to_string(),
        body,
    }
}

fn write_summary(out: &mut String, s: &ReportSummary, risk: &RiskSummary) -> std::fmt::Result {
    writeln!(out, "- File: `{}` ({} lines)", s.file, s.total_lines)?;
    writeln!(out, "- Chunks: {}", s.chunk_count)?;
    writeln!(out, "- Functions: {}", s.function_count)?;
    writeln!(out, "- High/critical findings: {}", s.severe_findings)?;
    writeln!(out, "- Call cycles: {}", s.cycle_count)?;
    writeln!(out, "- Security score: {}/100 (risk level: {})", risk.security_score, risk.risk_level)?;
    if s.critical_functions.is_empty() {
        writeln!(out, "- Critical functions: none")?;
    } else {
        writeln!(out, "- Critical functions: {}", code_list(&s.critical_functions))?;
    }
    Ok(())
}

fn write_chunks(out: &mut String, a: &FileAnalysis) -> std::fmt::Result {
    if a.chunks.is_empty() {
        return writeln!(out, "Empty input, no chunks.");
    }
    writeln!(out, "Chunk size limit: {} lines.\n", a.max_chunk_size)?;
    writeln!(out, "| chunk | lines | functions | notes |")?;
    writeln!(out, "|---|---|---|---|")?;
    for c in &a.chunks {
        let mut notes = Vec::new();
        if c.oversized {
            notes.push("oversized");
        }
        if c.incomplete {
            notes.push("incomplete");
        }
        writeln!(
            out,
            "| {} | {}-{} | {} | {} |",
            c.label(),
            c.start_line,
            c.end_line,
            c.functions.len(),
            notes.join(", ")
        )?;
    }
    Ok(())
}

fn write_functions(out: &mut String, a: &FileAnalysis) -> std::fmt::Result {
    if a.function_count() == 0 {
        return writeln!(out, "No function definitions recognized.");
    }
    writeln!(out, "| function | line | params | lines | branches | loops | nesting | cyclomatic | calls |")?;
    writeln!(out, "|---|---|---|---|---|---|---|---|---|")?;
    for f in a.functions() {
        let m = &f.metrics;
        let name = if f.incomplete {
            format!("`{}` (incomplete)", f.key())
        } else {
            format!("`{}`", f.key())
        };
        writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} |",
            name,
            f.header_line(),
            m.parameter_count,
            m.line_count,
            m.branch_count,
            m.loop_count,
            m.max_nesting_depth,
            m.cyclomatic,
            m.call_count
        )?;
    }
    Ok(())
}

fn write_graph(out: &mut String, a: &FileAnalysis) -> std::fmt::Result {
    let g = &a.graph;
    let st = &g.stats;
    writeln!(out, "- Edges: {} ({} call sites)", st.total_edges, st.total_calls)?;
    writeln!(
        out,
        "- External calls: {} to {} distinct names",
        st.external_calls, st.distinct_external_names
    )?;
    writeln!(out, "- Max fan-in: {}, max fan-out: {}", st.max_fan_in, st.max_fan_out)?;
    writeln!(out, "- Max call depth: {}", st.max_call_depth)?;
    writeln!(out, "- Recursive functions (self or cycle): {}", st.recursive_functions)?;
    writeln!(out, "- Components: {}", g.components.len())?;

    if !g.cycles.is_empty() {
        writeln!(out, "\nCycles:\n")?;
        for cycle in &g.cycles {
            writeln!(out, "- {}", code_list(&cycle.members))?;
        }
    }

    let mut ranked: Vec<_> = g.functions().collect();
    ranked.sort_by(|x, y| y.importance.total_cmp(&x.importance).then_with(|| x.name.cmp(&y.name)));
    if !ranked.is_empty() {
        writeln!(out, "\n| function | fan-in | fan-out | importance | group |")?;
        writeln!(out, "|---|---|---|---|---|")?;
        for n in ranked.iter().take(10) {
            writeln!(
                out,
                "| `{}` | {} | {} | {:.1} | {} |",
                n.name, n.fan_in, n.fan_out, n.importance, n.module_group
            )?;
        }
    }
    Ok(())
}

fn write_risks(out: &mut String, a: &FileAnalysis, risk: &RiskSummary) -> std::fmt::Result {
    if a.findings.is_empty() {
        return writeln!(out, "No risk patterns matched. Security score: 100/100.");
    }
    writeln!(out, "Security score: {}/100, risk level: {}.\n", risk.security_score, risk.risk_level)?;
    let by_severity: Vec<String> = risk
        .by_severity
        .iter()
        .rev()
        .map(|(sev, n)| format!("{} {}", n, sev))
        .collect();
    writeln!(out, "By severity: {}", by_severity.join(", "))?;
    let by_category: Vec<String> = risk.by_category.iter().map(|(c, n)| format!("{} {}", n, c)).collect();
    writeln!(out, "By category: {}\n", by_category.join(", "))?;

    for f in &a.findings {
        let scope = f.function.as_deref().unwrap_or("top level");
        writeln!(
            out,
            "- **{}** `{}` in `{}` (line {}): `{}`. {}. Fix: {}.",
            f.severity,
            f.pattern_id,
            scope,
            f.span.line,
            f.matched,
            f.rationale,
            f.remedy
        )?;
    }
    Ok(())
}

fn write_advice(out: &mut String, a: &FileAnalysis) -> std::fmt::Result {
    if a.advice.is_empty() {
        return writeln!(out, "No suggestions.");
    }
    for advice in &a.advice {
        writeln!(
            out,
            "### `{}` (priority {:?}, improvement score {})\n",
            advice.function, advice.priority, advice.improvement_score
        )?;
        for s in &advice.suggestions {
            writeln!(out, "- **{}** {}: {} ({})", s.severity, s.title, s.detail, s.triggers.join("; "))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn code_list(names: &[String]) -> String {
    names.iter().map(|n| format!("`{}`", n)).collect::<Vec<_>>().join(", ")
}

/// Prints the report as markdown.
pub fn print_plain(report: &Report) {
    print!("{}", report.to_markdown());
}

/// Prints any result as pretty JSON.
///
/// Falls back to compact `Debug` output if serialization fails.
pub fn print_json<T: Serialize + std::fmt::Debug>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            tracing::warn!(error = %e, "JSON serialization failed");
            println!("{}", json!({ "error": e.to_string(), "debug": format!("{:?}", value) }));
        }
    }
}
