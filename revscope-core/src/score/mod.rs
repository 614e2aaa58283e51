//! Scoring: complexity metrics, security risk patterns and lexical
//! quality signals.
//!
//! All three work on scanner tokens of one scope (a function body, or the
//! file's top level) and are pure: same tokens in, same results out.

pub mod lexical;
pub mod metrics;
pub mod risk;

pub use lexical::{collect as collect_signals, LexicalSignals};
pub use metrics::{count_parameters, measure, ComplexityMetrics};
pub use risk::{RiskFinding, RiskOverrides, RiskRule, RiskTable, RulePattern, Severity};

/// Coarse complexity label from body size: `low` under 20 lines,
/// `medium` under 50, `high` under 100, `very high` beyond.
pub fn complexity_level(metrics: &ComplexityMetrics) -> &'static str {
    match metrics.line_count {
        0..=19 => "low",
        20..=49 => "medium",
        50..=99 => "high",
        _ => "very high",
    }
}

/// Highest severity among `findings`, if any.
pub fn worst_severity(findings: &[RiskFinding]) -> Option<Severity> {
    findings.iter().map(|f| f.severity).max()
}
