//! Capability recommendation from a free-text context.
//!
//! Keyword matching over a static table; English and Chinese keywords are
//! both recognized. No language model, no network. [`NextStep`] carries
//! the follow-ups the engine derives from an operation's own result.

use serde::{Deserialize, Serialize};

/// One recommended operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Operation name as accepted by the engine dispatcher
    pub operation: String,
    pub description: String,
    /// Keyword occurrences in the context; 0 for the default workflow
    pub score: usize,
    /// Keywords that matched
    pub matched: Vec<String>,
}

/// Targets listed per follow-up step.
pub const MAX_TARGETS: usize = 3;

/// A follow-up operation suggested by a previous result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextStep {
    pub operation: String,
    pub reason: String,
    /// Functions or identifiers to run the step on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
}

impl NextStep {
    pub fn new(operation: &str, reason: impl Into<String>) -> Self {
        Self {
            operation: operation.to_string(),
            reason: reason.into(),
            targets: Vec::new(),
        }
    }

    /// Keep the first [`MAX_TARGETS`] distinct targets, in order.
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for t in targets {
            if self.targets.len() == MAX_TARGETS {
                break;
            }
            let t = t.into();
            if !t.is_empty() && !self.targets.contains(&t) {
                self.targets.push(t);
            }
        }
        self
    }
}

struct Capability {
    operation: &'static str,
    description: &'static str,
    keywords: &'static [&'static str],
}

const CAPABILITIES: &[Capability] = &[
    Capability {
        operation: "chunk",
        description: "Split a large source file into contiguous, boundary-safe chunks",
        keywords: &["chunk", "split", "large", "huge", "big file", "分块", "分割", "大文件"],
    },
    Capability {
        operation: "analyze_function",
        description: "Metrics, risks and purpose hints for a single function",
        keywords: &["function", "analyze", "complexity", "metric", "函数", "分析", "复杂度"],
    },
    Capability {
        operation: "analyze_dependencies",
        description: "Call graph with cycles, components and critical functions",
        keywords: &["dependency", "dependencies", "call graph", "calls", "caller", "callee", "依赖", "调用"],
    },
    Capability {
        operation: "search",
        description: "Find functions, variables, strings or comments by pattern",
        keywords: &["search", "find", "grep", "locate", "where", "搜索", "查找"],
    },
    Capability {
        operation: "render_diagram",
        description: "Bounded call diagram as a spec, Mermaid or DOT",
        keywords: &["diagram", "chart", "visualize", "mermaid", "graphviz", "图", "可视化"],
    },
    Capability {
        operation: "refactor",
        description: "Prioritized refactoring suggestions for a function",
        keywords: &["refactor", "improve", "clean", "readability", "重构", "优化", "改进"],
    },
    Capability {
        operation: "audit",
        description: "Security risk findings with severities and remedies",
        keywords: &["security", "vulnerab", "audit", "overflow", "unsafe", "exploit", "安全", "漏洞"],
    },
    Capability {
        operation: "report",
        description: "Combined markdown report for a whole file",
        keywords: &["report", "summary", "overview", "document", "报告", "总结", "概述"],
    },
];

/// Workflow suggested when nothing in the context matches.
const DEFAULT_WORKFLOW: &[&str] = &["chunk", "analyze_dependencies", "analyze_function", "audit", "report"];

/// Rank capabilities for `context`.
///
/// Scores count keyword occurrences (case-insensitive, non-overlapping).
/// Ties keep table order; zero scores are omitted. With no match at all the
/// default workflow comes back, every entry scored 0.
pub fn recommend(context: &str) -> Vec<Recommendation> {
    let lower = context.to_lowercase();
    let mut scored: Vec<(usize, Recommendation)> = CAPABILITIES
        .iter()
        .enumerate()
        .filter_map(|(idx, cap)| {
            let mut score = 0;
            let mut matched = Vec::new();
            for kw in cap.keywords {
                let n = lower.matches(kw).count();
                if n > 0 {
                    score += n;
                    matched.push(kw.to_string());
                }
            }
            (score > 0).then(|| {
                (
                    idx,
                    Recommendation {
                        operation: cap.operation.to_string(),
                        description: cap.description.to_string(),
                        score,
                        matched,
                    },
                )
            })
        })
        .collect();

    if scored.is_empty() {
        return DEFAULT_WORKFLOW
            .iter()
            .filter_map(|op| CAPABILITIES.iter().find(|c| c.operation == *op))
            .map(|cap| Recommendation {
                operation: cap.operation.to_string(),
                description: cap.description.to_string(),
                score: 0,
                matched: Vec::new(),
            })
            .collect();
    }

    scored.sort_by(|(ia, a), (ib, b)| b.score.cmp(&a.score).then(ia.cmp(ib)));
    scored.into_iter().map(|(_, r)| r).collect()
}
