//! Lexical code-quality signals used by the refactoring advisor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::lexer::{is_reserved, Token};

/// Signals gathered from one body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexicalSignals {
    /// Numeric literals of value 10 or more, as written, deduplicated
    pub magic_numbers: Vec<String>,
    /// One-letter variable names, deduplicated
    pub short_identifiers: Vec<String>,
    /// `return -N` or `return NULL` somewhere in the body
    pub returns_error_code: bool,
    pub uses_errno: bool,
    /// Comparisons against NULL
    pub null_checks: usize,
}

impl LexicalSignals {
    /// True when the body shows no sign of reporting failure.
    pub fn lacks_error_path(&self) -> bool {
        !self.returns_error_code && !self.uses_errno && self.null_checks == 0
    }

    /// Human-readable error handling indicators.
    pub fn error_handling(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.returns_error_code {
            out.push("returns error codes".to_string());
        }
        if self.uses_errno {
            out.push("consults errno".to_string());
        }
        if self.null_checks > 0 {
            out.push(format!("{} NULL check(s)", self.null_checks));
        }
        out
    }
}

/// Collect signals from significant body tokens.
pub fn collect(body: &[&Token<'_>]) -> LexicalSignals {
    let mut magic = BTreeSet::new();
    let mut short = BTreeSet::new();
    let mut signals = LexicalSignals::default();

    for (i, tok) in body.iter().enumerate() {
        let next = body.get(i + 1);
        let prev = i.checked_sub(1).map(|p| body[p]);

        if tok.is_number() && numeric_value(tok.text).is_some_and(|v| v >= 10) {
            magic.insert(tok.text.to_string());
        }
        if tok.is_ident()
            && tok.text.len() == 1
            && !is_reserved(tok.text)
            && !next.is_some_and(|n| n.is_punct("("))
        {
            short.insert(tok.text.to_string());
        }
        if tok.is_punct("return") {
            let first = next.map(|n| n.text);
            let second = body.get(i + 2).map(|n| n.text);
            let negative = first == Some("-") && second.is_some_and(|s| s.starts_with(|c: char| c.is_ascii_digit()));
            let failure_value = matches!(first, Some("NULL") | Some("0xffffffff") | Some("EOF"));
            if negative || failure_value {
                signals.returns_error_code = true;
            }
        }
        if tok.is_punct("errno") {
            signals.uses_errno = true;
        }
        if tok.is_punct("NULL") {
            let cmp = |t: &Token<'_>| t.is_punct("==") || t.is_punct("!=");
            if prev.is_some_and(cmp) || next.is_some_and(|n| cmp(*n)) {
                signals.null_checks += 1;
            }
        }
    }

    signals.magic_numbers = magic.into_iter().collect();
    signals.short_identifiers = short.into_iter().collect();
    signals
}

/// Integer value of a C literal (`0x40`, `100`, `10UL`); None for floats.
fn numeric_value(text: &str) -> Option<u64> {
    let trimmed = text.trim_end_matches(|c: char| matches!(c, 'u' | 'U' | 'l' | 'L'));
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    if trimmed.len() > 1 && trimmed.starts_with('0') {
        return u64::from_str_radix(&trimmed[1..], 8).ok();
    }
    trimmed.parse().ok()
}
