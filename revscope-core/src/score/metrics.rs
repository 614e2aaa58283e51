//! Structural complexity metrics.
//!
//! Every value is a pure function of the body's code tokens, so re-running
//! on identical text always yields identical metrics.

use serde::{Deserialize, Serialize};

use crate::lexer::Token;

/// Complexity metrics for one function body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComplexityMetrics {
    /// `if`, `else`, `switch`, `case`, `goto` and `?`
    pub branch_count: usize,
    /// `for`, `while`, `do` (the trailing `while` of a do-loop is not counted)
    pub loop_count: usize,
    /// Deepest brace nesting inside the body, the body's own braces excluded
    pub max_nesting_depth: usize,
    /// Non-blank lines in the body text
    pub line_count: usize,
    pub parameter_count: usize,
    /// Call sites found in the body
    #[serde(default)]
    pub call_count: usize,
    /// 1 + decision points (`if`, `case`, `?`, `&&`, `||`, loops)
    #[serde(default)]
    pub cyclomatic: usize,
}

/// Measure a body.
///
/// `inner` are the significant tokens strictly inside the body braces and
/// `inner_depth` the brace depth those tokens sit at. For a bare fragment
/// without surrounding braces pass depth 0.
pub fn measure(
    inner: &[&Token<'_>],
    inner_depth: u32,
    params: &[&Token<'_>],
    body_text: &str,
) -> ComplexityMetrics {
    let mut m = ComplexityMetrics {
        line_count: body_text.lines().filter(|l| !l.trim().is_empty()).count(),
        parameter_count: count_parameters(params),
        cyclomatic: 1,
        ..Default::default()
    };

    // One entry per open brace: was it opened right after `do`?
    let mut opened_by_do: Vec<bool> = Vec::new();
    let mut last_closed_do = false;

    for (idx, tok) in inner.iter().enumerate() {
        if !tok.is_code() {
            continue;
        }
        let prev = idx.checked_sub(1).map(|p| inner[p]);
        match tok.text {
            "if" | "case" | "?" => {
                m.branch_count += 1;
                m.cyclomatic += 1;
            }
            "else" | "switch" | "goto" => m.branch_count += 1,
            "&&" | "||" => m.cyclomatic += 1,
            "for" | "do" => {
                m.loop_count += 1;
                m.cyclomatic += 1;
            }
            "while" => {
                let closes_do = last_closed_do && prev.is_some_and(|p| p.is_punct("}"));
                if !closes_do {
                    m.loop_count += 1;
                    m.cyclomatic += 1;
                }
            }
            "{" => {
                let level = (tok.depth + 1).saturating_sub(inner_depth) as usize;
                m.max_nesting_depth = m.max_nesting_depth.max(level);
                opened_by_do.push(prev.is_some_and(|p| p.is_punct("do")));
            }
            "}" => last_closed_do = opened_by_do.pop().unwrap_or(false),
            _ => {}
        }
        if tok.text != "}" && tok.text != "while" {
            last_closed_do = false;
        }
    }

    m
}

/// Top-level comma-separated parameters. `()` and `(void)` count zero.
pub fn count_parameters(params: &[&Token<'_>]) -> usize {
    let code: Vec<&&Token<'_>> = params.iter().filter(|t| t.is_code()).collect();
    if code.is_empty() || (code.len() == 1 && code[0].text == "void") {
        return 0;
    }
    let mut nested = 0usize;
    let mut commas = 0usize;
    for tok in code {
        match tok.text {
            "(" | "[" => nested += 1,
            ")" | "]" => nested = nested.saturating_sub(1),
            "," if nested == 0 => commas += 1,
            _ => {}
        }
    }
    commas + 1
}
