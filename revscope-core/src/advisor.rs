//! Refactoring advice from metrics, findings and lexical signals.
//!
//! The advisor is a fixed, ordered table of [`SuggestionRule`]s. A rule
//! fires on a risk finding id, on a metric above its threshold, or on a
//! lexical signal. When several triggers fire the same rule the suggestion
//! is emitted once, at the highest severity among them, with every trigger
//! listed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::score::{ComplexityMetrics, LexicalSignals, RiskFinding, Severity};

/// Metric limits above which the advisor speaks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorThresholds {
    pub max_lines: usize,
    pub max_branches: usize,
    pub max_loops: usize,
    pub max_nesting: usize,
    pub max_parameters: usize,
    pub max_cyclomatic: usize,
}

impl Default for AdvisorThresholds {
    fn default() -> Self {
        Self {
            max_lines: 50,
            max_branches: 10,
            max_loops: 5,
            max_nesting: 4,
            max_parameters: 6,
            max_cyclomatic: 15,
        }
    }
}

/// Metric a threshold rule watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Lines,
    Branches,
    Loops,
    Nesting,
    Parameters,
    Cyclomatic,
}

impl Metric {
    fn name(self) -> &'static str {
        match self {
            Self::Lines => "line_count",
            Self::Branches => "branch_count",
            Self::Loops => "loop_count",
            Self::Nesting => "max_nesting_depth",
            Self::Parameters => "parameter_count",
            Self::Cyclomatic => "cyclomatic",
        }
    }

    fn value(self, m: &ComplexityMetrics) -> usize {
        match self {
            Self::Lines => m.line_count,
            Self::Branches => m.branch_count,
            Self::Loops => m.loop_count,
            Self::Nesting => m.max_nesting_depth,
            Self::Parameters => m.parameter_count,
            Self::Cyclomatic => m.cyclomatic,
        }
    }

    fn limit(self, t: &AdvisorThresholds) -> usize {
        match self {
            Self::Lines => t.max_lines,
            Self::Branches => t.max_branches,
            Self::Loops => t.max_loops,
            Self::Nesting => t.max_nesting,
            Self::Parameters => t.max_parameters,
            Self::Cyclomatic => t.max_cyclomatic,
        }
    }
}

/// What makes a rule fire.
#[derive(Debug, Clone, Copy)]
pub enum Trigger {
    /// Any finding with one of these pattern ids; severity follows the finding
    Findings(&'static [&'static str]),
    MetricAbove(Metric),
    MagicNumbers,
    ShortIdentifiers,
    /// Non-trivial body with no visible error reporting
    NoErrorPath,
}

/// One advisor table entry.
#[derive(Debug, Clone, Copy)]
pub struct SuggestionRule {
    pub id: &'static str,
    pub trigger: Trigger,
    /// Fixed severity; finding-triggered rules inherit the finding's
    pub severity: Severity,
    pub title: &'static str,
    pub detail: &'static str,
}

const RULES: &[SuggestionRule] = &[
    SuggestionRule {
        id: "bound-buffer-operations",
        trigger: Trigger::Findings(&["unbounded-copy", "unbounded-format", "unbounded-read", "unbounded-scanf"]),
        severity: Severity::High,
        title: "Bound every buffer operation",
        detail: "Replace unbounded copy/format/read calls with size-taking variants and check their results.",
    },
    SuggestionRule {
        id: "constant-format-strings",
        trigger: Trigger::Findings(&["format-string"]),
        severity: Severity::High,
        title: "Use constant format strings",
        detail: "Pass data as arguments to a literal format instead of using it as the format.",
    },
    SuggestionRule {
        id: "remove-shell-execution",
        trigger: Trigger::Findings(&["command-injection"]),
        severity: Severity::Critical,
        title: "Remove shell execution",
        detail: "Call the needed functionality directly or exec a fixed program with a validated argv.",
    },
    SuggestionRule {
        id: "check-allocations",
        trigger: Trigger::Findings(&["unchecked-allocation", "allocation-without-free", "stack-allocation"]),
        severity: Severity::Medium,
        title: "Make allocation ownership explicit",
        detail: "Check each allocation for failure and release it on every exit path.",
    },
    SuggestionRule {
        id: "replace-pointer-arithmetic",
        trigger: Trigger::Findings(&["pointer-arithmetic", "indexed-write"]),
        severity: Severity::Medium,
        title: "Replace raw offsets with typed access",
        detail: "Recover the struct layout behind computed offsets and validate indices before writes.",
    },
    SuggestionRule {
        id: "externalize-secrets",
        trigger: Trigger::Findings(&["hardcoded-credential"]),
        severity: Severity::Medium,
        title: "Move secrets out of the code",
        detail: "Load credentials at runtime from protected storage.",
    },
    SuggestionRule {
        id: "split-function",
        trigger: Trigger::MetricAbove(Metric::Lines),
        severity: Severity::Medium,
        title: "Split the function",
        detail: "Extract cohesive blocks into named helper functions.",
    },
    SuggestionRule {
        id: "simplify-branching",
        trigger: Trigger::MetricAbove(Metric::Branches),
        severity: Severity::Medium,
        title: "Simplify branching",
        detail: "Use early returns, lookup tables or a dispatch switch instead of long if/else chains.",
    },
    SuggestionRule {
        id: "reduce-cyclomatic-complexity",
        trigger: Trigger::MetricAbove(Metric::Cyclomatic),
        severity: Severity::Medium,
        title: "Reduce decision points",
        detail: "Separate validation, computation and error handling into their own functions.",
    },
    SuggestionRule {
        id: "flatten-nesting",
        trigger: Trigger::MetricAbove(Metric::Nesting),
        severity: Severity::Medium,
        title: "Flatten nesting",
        detail: "Invert conditions with guard clauses so the main path stays at low depth.",
    },
    SuggestionRule {
        id: "extract-loops",
        trigger: Trigger::MetricAbove(Metric::Loops),
        severity: Severity::Low,
        title: "Extract loop bodies",
        detail: "Move each loop into a helper named after what it computes.",
    },
    SuggestionRule {
        id: "group-parameters",
        trigger: Trigger::MetricAbove(Metric::Parameters),
        severity: Severity::Low,
        title: "Group parameters",
        detail: "Pass related parameters together in a struct.",
    },
    SuggestionRule {
        id: "add-error-handling",
        trigger: Trigger::NoErrorPath,
        severity: Severity::Low,
        title: "Add error handling",
        detail: "Check inputs and callee results and report failure to the caller.",
    },
    SuggestionRule {
        id: "name-magic-numbers",
        trigger: Trigger::MagicNumbers,
        severity: Severity::Low,
        title: "Name magic numbers",
        detail: "Replace repeated numeric constants with named constants or enums.",
    },
    SuggestionRule {
        id: "rename-variables",
        trigger: Trigger::ShortIdentifiers,
        severity: Severity::Low,
        title: "Use descriptive names",
        detail: "Rename single-letter variables after the values they hold.",
    },
];

/// Bodies shorter than this are not asked for error handling.
const ERROR_PATH_MIN_LINES: usize = 5;

/// Emitted suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub title: String,
    pub detail: String,
    pub severity: Severity,
    /// What fired the rule (`finding unbounded-copy at line 12`, `line_count 73 > 50`)
    pub triggers: Vec<String>,
}

/// Overall urgency of the advice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Advice for one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advice {
    pub function: String,
    /// Most severe first, table order within a severity
    pub suggestions: Vec<Suggestion>,
    /// 100 minus 15 per suggestion, floored at 0
    pub improvement_score: u32,
    pub priority: Priority,
}

impl Advice {
    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty()
    }
}

/// Everything the advisor looks at for one function.
#[derive(Debug, Clone, Copy)]
pub struct AdvisorInput<'a> {
    pub function: &'a str,
    pub metrics: &'a ComplexityMetrics,
    pub findings: &'a [RiskFinding],
    pub signals: &'a LexicalSignals,
}

/// Run the advisor table.
pub fn advise(input: AdvisorInput<'_>, thresholds: &AdvisorThresholds) -> Advice {
    // rule index → (severity, triggers)
    let mut fired: HashMap<usize, (Severity, Vec<String>)> = HashMap::new();
    let mut fire = |idx: usize, severity: Severity, trigger: String| {
        let slot = fired.entry(idx).or_insert((severity, Vec::new()));
        slot.0 = slot.0.max(severity);
        slot.1.push(trigger);
    };

    for (idx, rule) in RULES.iter().enumerate() {
        match rule.trigger {
            Trigger::Findings(ids) => {
                for f in input.findings.iter().filter(|f| ids.contains(&f.pattern_id.as_str())) {
                    fire(idx, f.severity, format!("finding {} at line {}", f.pattern_id, f.span.line));
                }
            }
            Trigger::MetricAbove(metric) => {
                let value = metric.value(input.metrics);
                let limit = metric.limit(thresholds);
                if value > limit {
                    fire(idx, rule.severity, format!("{} {} > {}", metric.name(), value, limit));
                }
            }
            Trigger::MagicNumbers => {
                if !input.signals.magic_numbers.is_empty() {
                    fire(
                        idx,
                        rule.severity,
                        format!("magic numbers: {}", input.signals.magic_numbers.join(", ")),
                    );
                }
            }
            Trigger::ShortIdentifiers => {
                if !input.signals.short_identifiers.is_empty() {
                    fire(
                        idx,
                        rule.severity,
                        format!("short names: {}", input.signals.short_identifiers.join(", ")),
                    );
                }
            }
            Trigger::NoErrorPath => {
                if input.metrics.line_count >= ERROR_PATH_MIN_LINES && input.signals.lacks_error_path() {
                    fire(idx, rule.severity, "no error return, errno use or NULL check".to_string());
                }
            }
        }
    }

    let mut ordered: Vec<(usize, (Severity, Vec<String>))> = fired.into_iter().collect();
    ordered.sort_by(|(ia, (sa, _)), (ib, (sb, _))| sb.cmp(sa).then(ia.cmp(ib)));

    let suggestions: Vec<Suggestion> = ordered
        .into_iter()
        .map(|(idx, (severity, triggers))| {
            let rule = &RULES[idx];
            Suggestion {
                id: rule.id.to_string(),
                title: rule.title.to_string(),
                detail: rule.detail.to_string(),
                severity,
                triggers,
            }
        })
        .collect();

    let n = suggestions.len() as u32;
    Advice {
        function: input.function.to_string(),
        improvement_score: 100u32.saturating_sub(15 * n),
        priority: match n {
            0 | 1 => Priority::Low,
            2 | 3 => Priority::Medium,
            _ => Priority::High,
        },
        suggestions,
    }
}

/// The advisor table, for listings.
pub fn rules() -> &'static [SuggestionRule] {
    RULES
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Span;

    fn finding(id: &str, severity: Severity, line: usize) -> RiskFinding {
        RiskFinding {
            pattern_id: id.to_string(),
            category: "test".to_string(),
            severity,
            span: Span::new(0, 1, line, line),
            matched: String::new(),
            rationale: String::new(),
            remedy: String::new(),
            function: None,
        }
    }

    fn run(metrics: ComplexityMetrics, findings: &[RiskFinding], signals: LexicalSignals) -> Advice {
        advise(
            AdvisorInput {
                function: "f",
                metrics: &metrics,
                findings,
                signals: &signals,
            },
            &AdvisorThresholds::default(),
        )
    }

    fn clean_signals() -> LexicalSignals {
        LexicalSignals {
            null_checks: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_function_gets_no_advice() {
        let advice = run(ComplexityMetrics::default(), &[], clean_signals());
        assert!(advice.is_empty());
        assert_eq!(advice.improvement_score, 100);
        assert_eq!(advice.priority, Priority::Low);
    }

    #[test]
    fn test_metric_thresholds_are_strict() {
        let at_limit = ComplexityMetrics {
            line_count: 50,
            ..Default::default()
        };
        assert!(run(at_limit, &[], clean_signals()).is_empty());

        let over = ComplexityMetrics {
            line_count: 51,
            ..Default::default()
        };
        let advice = run(over, &[], clean_signals());
        assert_eq!(advice.suggestions[0].id, "split-function");
        assert_eq!(advice.suggestions[0].triggers, vec!["line_count 51 > 50"]);
    }

    #[test]
    fn test_duplicate_triggers_merge_at_max_severity() {
        let findings = vec![
            finding("unbounded-copy", Severity::High, 3),
            finding("unbounded-read", Severity::Critical, 7),
        ];
        let advice = run(ComplexityMetrics::default(), &findings, clean_signals());
        assert_eq!(advice.suggestions.len(), 1);
        let s = &advice.suggestions[0];
        assert_eq!(s.id, "bound-buffer-operations");
        assert_eq!(s.severity, Severity::Critical);
        assert_eq!(s.triggers.len(), 2);
    }

    #[test]
    fn test_ordering_severity_then_table() {
        let metrics = ComplexityMetrics {
            parameter_count: 9,
            line_count: 80,
            ..Default::default()
        };
        let findings = vec![finding("command-injection", Severity::Critical, 2)];
        let signals = LexicalSignals {
            magic_numbers: vec!["0x40".to_string()],
            null_checks: 1,
            ..Default::default()
        };
        let advice = run(metrics, &findings, signals);
        let ids: Vec<_> = advice.suggestions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["remove-shell-execution", "split-function", "group-parameters", "name-magic-numbers"]
        );
        assert_eq!(advice.improvement_score, 40);
        assert_eq!(advice.priority, Priority::High);
    }

    #[test]
    fn test_score_floors_at_zero() {
        let metrics = ComplexityMetrics {
            line_count: 500,
            branch_count: 50,
            loop_count: 20,
            max_nesting_depth: 9,
            parameter_count: 12,
            cyclomatic: 80,
            call_count: 0,
        };
        let signals = LexicalSignals {
            magic_numbers: vec!["100".into()],
            short_identifiers: vec!["x".into()],
            ..Default::default()
        };
        let advice = run(metrics, &[], signals);
        assert_eq!(advice.suggestions.len(), 9);
        assert_eq!(advice.improvement_score, 0);
    }

    #[test]
    fn test_short_bodies_not_asked_for_error_handling() {
        let small = ComplexityMetrics {
            line_count: 3,
            ..Default::default()
        };
        assert!(run(small, &[], LexicalSignals::default()).is_empty());
        let larger = ComplexityMetrics {
            line_count: 8,
            ..Default::default()
        };
        let advice = run(larger, &[], LexicalSignals::default());
        assert_eq!(advice.suggestions[0].id, "add-error-handling");
    }
}
