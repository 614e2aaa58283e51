//! Call-site detection over scanner tokens.
//!
//! Detects:
//! - Direct calls: `foo(...)`
//! - Calls through decompiler thunks: `thunk_FUN_00401000(...)`
//!
//! Skipped:
//! - Keywords that take parens (`if (`, `sizeof (`, `while (`)
//! - Member calls through a struct field: `obj.cb(...)`, `p->cb(...)`
//!
//! Anything inside string literals or comments never reaches this module,
//! the scanner has already classified those tokens.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::lexer::{is_reserved, Token};
use crate::source::Span;

/// Information about one call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSite {
    /// Name of the callee
    pub name: String,
    /// Span of the callee identifier
    pub span: Span,
}

/// Index of every call-site identifier in `tokens`.
///
/// `tokens` must be significant tokens (no comments, no directives).
pub fn call_site_indices(tokens: &[&Token<'_>]) -> Vec<usize> {
    let mut out = Vec::new();
    for i in 0..tokens.len().saturating_sub(1) {
        let tok = tokens[i];
        if !tok.is_ident() || is_reserved(tok.text) || !tokens[i + 1].is_punct("(") {
            continue;
        }
        let member = i
            .checked_sub(1)
            .is_some_and(|p| tokens[p].is_punct(".") || tokens[p].is_punct("->"));
        if !member {
            out.push(i);
        }
    }
    out
}

/// Every call site in order of appearance.
pub fn extract_call_sites(tokens: &[&Token<'_>]) -> Vec<CallSite> {
    call_site_indices(tokens)
        .into_iter()
        .map(|i| CallSite {
            name: tokens[i].text.to_string(),
            span: tokens[i].span,
        })
        .collect()
}

/// Callee name → number of call sites.
pub fn extract_calls(tokens: &[&Token<'_>]) -> BTreeMap<String, usize> {
    let mut calls = BTreeMap::new();
    for i in call_site_indices(tokens) {
        *calls.entry(tokens[i].text.to_string()).or_insert(0) += 1;
    }
    calls
}
