//! Function definition extraction.
//!
//! Recognizes `<return type> name ( params ) {` at brace depth 0 over the
//! scanner's significant tokens and takes the body up to the first `}` that
//! returns to the same depth.
//!
//! Resilience rules:
//! - a body whose closing brace never arrives is truncated at EOF and the
//!   record is flagged `incomplete`
//! - duplicate names are all kept; the ordinal tells them apart
//! - control keywords and compiler pseudo-keywords never become names

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::callgraph::calls::extract_calls;
use crate::lexer::{is_reserved, significant, Token};
use crate::score::metrics::{measure, ComplexityMetrics};
use crate::source::Span;

/// One extracted function definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRecord {
    /// Function name as written
    pub name: String,
    /// 1 for the first definition of `name` in the file, 2 for the next, ...
    #[serde(default = "first_ordinal")]
    pub ordinal: usize,
    /// Header with whitespace collapsed (`int add(int a, int b)`)
    pub signature: String,
    pub return_type: String,
    /// Parameter list text without the parentheses
    pub params: String,
    /// Chunk the definition starts in
    #[serde(default)]
    pub chunk_id: usize,
    /// Header start through the closing brace (or EOF)
    pub span: Span,
    /// Opening brace through the closing brace (or EOF)
    pub body: Span,
    /// Definition text, header included
    #[serde(default)]
    pub text: String,
    /// Closing brace never found
    #[serde(default)]
    pub incomplete: bool,
    /// Callee name → call-site count
    #[serde(default)]
    pub calls: BTreeMap<String, usize>,
    #[serde(default)]
    pub metrics: ComplexityMetrics,
}

fn first_ordinal() -> usize {
    1
}

impl FunctionRecord {
    /// Unique key within a file: the name, with `#n` for repeated definitions.
    pub fn key(&self) -> String {
        if self.ordinal <= 1 {
            self.name.clone()
        } else {
            format!("{}#{}", self.name, self.ordinal)
        }
    }

    /// Line of the return type / name.
    pub fn header_line(&self) -> usize {
        self.span.line
    }

    pub fn end_line(&self) -> usize {
        self.span.end_line
    }

    /// Total call sites in the body.
    pub fn call_sites(&self) -> usize {
        self.calls.values().sum()
    }
}

/// Extract every function definition from `tokens`.
///
/// `text` is the full source the token spans point into; `chunk_id` is
/// stamped on every record. Ordinals are all 1 here; run
/// [`assign_ordinals`] over the whole file afterwards.
pub fn extract_functions(text: &str, tokens: &[Token<'_>], chunk_id: usize) -> Vec<FunctionRecord> {
    let sig = significant(tokens);
    let mut records = Vec::new();
    let mut decl_start = 0usize;
    let mut i = 0usize;

    while i < sig.len() {
        let tok = sig[i];
        if tok.depth == 0 && tok.is_ident() && !is_reserved(tok.text) {
            if let Some(found) = match_definition(&sig, i) {
                let record = build_record(text, &sig, decl_start, i, found, chunk_id);
                tracing::trace!(name = %record.name, line = record.span.line, "function extracted");
                records.push(record);
                i = found.close_brace.map_or(sig.len(), |k| k + 1);
                decl_start = i;
                continue;
            }
        }
        if tok.depth == 0 && (tok.is_punct(";") || tok.is_punct("}")) {
            decl_start = i + 1;
        }
        i += 1;
    }

    records
}

/// Whether the identifier at `idx` names a top-level definition
/// (`name ( ... ) {`). `sig` must be significant tokens.
pub fn is_definition_at(sig: &[&Token<'_>], idx: usize) -> bool {
    sig.get(idx).is_some_and(|tok| tok.depth == 0 && tok.is_ident() && !is_reserved(tok.text))
        && match_definition(sig, idx).is_some()
}

/// Number repeated definitions of the same name in file order.
pub fn assign_ordinals<'r>(records: impl IntoIterator<Item = &'r mut FunctionRecord>) {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    for record in records {
        let n = seen.entry(record.name.clone()).or_insert(0);
        *n += 1;
        record.ordinal = *n;
    }
}

/// Treat a whole snippet as one body. Used when a caller hands over a
/// fragment that contains no recognizable definition.
pub fn fragment_record(name: &str, text: &str, tokens: &[Token<'_>]) -> FunctionRecord {
    let sig = significant(tokens);
    let span = match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => first.span.join(&last.span),
        _ => Span::default(),
    };
    let calls = extract_calls(&sig);
    let mut metrics = measure(&sig, 0, &[], text);
    metrics.call_count = calls.values().sum();

    FunctionRecord {
        name: name.to_string(),
        ordinal: 1,
        signature: String::new(),
        return_type: String::new(),
        params: String::new(),
        chunk_id: 0,
        span,
        body: span,
        text: text.to_string(),
        incomplete: false,
        calls,
        metrics,
    }
}

#[derive(Debug, Clone, Copy)]
struct Definition {
    close_paren: usize,
    open_brace: usize,
    close_brace: Option<usize>,
}

/// `name ( ... ) {` starting at `name_idx`.
fn match_definition(sig: &[&Token<'_>], name_idx: usize) -> Option<Definition> {
    let open_paren = name_idx + 1;
    if !sig.get(open_paren)?.is_punct("(") {
        return None;
    }
    let close_paren = matching_paren(sig, open_paren)?;
    let open_brace = close_paren + 1;
    if !sig.get(open_brace)?.is_punct("{") {
        return None;
    }
    let depth = sig[open_brace].depth;
    let close_brace = (open_brace + 1..sig.len()).find(|&k| sig[k].is_punct("}") && sig[k].depth == depth);
    Some(Definition {
        close_paren,
        open_brace,
        close_brace,
    })
}

/// Matching `)` for the `(` at `open`. Gives up at `;` or any brace, which
/// a parameter list never contains.
fn matching_paren(sig: &[&Token<'_>], open: usize) -> Option<usize> {
    let mut level = 0usize;
    for (k, tok) in sig.iter().enumerate().skip(open) {
        if !tok.is_code() {
            continue;
        }
        match tok.text {
            "(" => level += 1,
            ")" => {
                level -= 1;
                if level == 0 {
                    return Some(k);
                }
            }
            ";" | "{" | "}" => return None,
            _ => {}
        }
    }
    None
}

fn build_record(
    text: &str,
    sig: &[&Token<'_>],
    decl_start: usize,
    name_idx: usize,
    def: Definition,
    chunk_id: usize,
) -> FunctionRecord {
    let name_tok = sig[name_idx];

    // Return type: the run of type words and `*` right before the name.
    let mut ret_start = name_idx;
    while ret_start > decl_start {
        let prev = sig[ret_start - 1];
        if prev.is_ident() || prev.is_punct("*") {
            ret_start -= 1;
        } else {
            break;
        }
    }

    let header_start = sig[ret_start].span;
    let open = sig[def.open_brace];
    let (end_span, incomplete) = match def.close_brace {
        Some(k) => (sig[k].span, false),
        None => {
            let last = sig.last().map_or(open.span, |t| t.span);
            (Span::new(text.len(), text.len(), last.end_line, last.end_line), true)
        }
    };

    let span = Span::new(header_start.start, end_span.end, header_start.line, end_span.end_line);
    let body = Span::new(open.span.start, end_span.end, open.span.line, end_span.end_line);

    let inner_end = def.close_brace.unwrap_or(sig.len());
    let inner = &sig[def.open_brace + 1..inner_end];
    let params = &sig[name_idx + 2..def.close_paren];

    let calls = extract_calls(inner);
    let mut metrics = measure(inner, open.depth + 1, params, &text[body.start..body.end]);
    metrics.call_count = calls.values().sum();

    let close_paren = sig[def.close_paren].span;
    FunctionRecord {
        name: name_tok.text.to_string(),
        ordinal: 1,
        signature: collapse(&text[header_start.start..close_paren.end]),
        return_type: collapse(&text[header_start.start..name_tok.span.start]),
        params: collapse(&text[sig[name_idx + 1].span.end..close_paren.start]),
        chunk_id,
        span,
        body,
        text: text[span.start..span.end].to_string(),
        incomplete,
        calls,
        metrics,
    }
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::scan;

    fn extract(src: &str) -> Vec<FunctionRecord> {
        let toks = scan(src);
        let mut records = extract_functions(src, &toks, 0);
        assign_ordinals(records.iter_mut());
        records
    }

    #[test]
    fn test_simple_definition() {
        let src = "int add(int a, int b) {\n  return a + b;\n}\n";
        let recs = extract(src);
        assert_eq!(recs.len(), 1);
        let r = &recs[0];
        assert_eq!(r.name, "add");
        assert_eq!(r.signature, "int add(int a, int b)");
        assert_eq!(r.return_type, "int");
        assert_eq!(r.params, "int a, int b");
        assert_eq!(r.metrics.parameter_count, 2);
        assert_eq!(r.span.line, 1);
        assert_eq!(r.span.end_line, 3);
        assert!(!r.incomplete);
        assert!(r.text.ends_with('}'));
    }

    #[test]
    fn test_decompiler_style_header() {
        let src = "undefined8 * FUN_00101a2c(long param_1)\n\n{\n  return (undefined8 *)0;\n}\n";
        let recs = extract(src);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].name, "FUN_00101a2c");
        assert_eq!(recs[0].return_type, "undefined8 *");
        assert_eq!(recs[0].body.line, 3);
    }

    #[test]
    fn test_prototypes_and_control_flow_ignored() {
        let src = "int proto(int);\nint real(void) { if (x) { y(); } while (z) {} return 0; }\n";
        let recs = extract(src);
        let names: Vec<_> = recs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["real"]);
        assert_eq!(recs[0].metrics.parameter_count, 0);
    }

    #[test]
    fn test_nested_braces_in_body() {
        let src = "void f(void) {\n  if (a) {\n    if (b) { c(); }\n  }\n}\nvoid g(void) { f(); }\n";
        let recs = extract(src);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].span.end_line, 5);
        assert_eq!(recs[0].metrics.max_nesting_depth, 2);
        assert_eq!(recs[1].calls.get("f"), Some(&1));
    }

    #[test]
    fn test_braces_in_strings_do_not_close_body() {
        let src = "void f(void) { puts(\"}\"); /* } */ x = '}'; }\nvoid g(void) {}\n";
        let recs = extract(src);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].name, "f");
        assert_eq!(recs[1].name, "g");
    }

    #[test]
    fn test_missing_close_brace_is_incomplete() {
        let src = "int ok(void) { return 1; }\nint broken(void) {\n  if (x) {\n    y();\n";
        let recs = extract(src);
        assert_eq!(recs.len(), 2);
        assert!(!recs[0].incomplete);
        assert!(recs[1].incomplete);
        assert_eq!(recs[1].body.end, src.len());
    }

    #[test]
    fn test_duplicate_names_get_ordinals() {
        let src = "void dup(void) { a(); }\nvoid dup(void) { b(); }\n";
        let recs = extract(src);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].key(), "dup");
        assert_eq!(recs[1].key(), "dup#2");
    }

    #[test]
    fn test_struct_initializers_are_not_functions() {
        let src = "struct cfg c = { 1, 2 };\nstatic int table[] = { f(1) };\nint main(void) { return 0; }\n";
        let recs = extract(src);
        let names: Vec<_> = recs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["main"]);
    }

    #[test]
    fn test_attribute_prefix() {
        let src = "__attribute__((noreturn)) void die(int code) { exit(code); }\n";
        let recs = extract(src);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].name, "die");
        assert_eq!(recs[0].signature, "void die(int code)");
    }

    #[test]
    fn test_fragment_record() {
        let src = "if (x) { strcpy(a, b); }";
        let toks = scan(src);
        let r = fragment_record("snippet", src, &toks);
        assert_eq!(r.name, "snippet");
        assert_eq!(r.metrics.branch_count, 1);
        assert_eq!(r.metrics.max_nesting_depth, 1);
        assert_eq!(r.calls.get("strcpy"), Some(&1));
    }
}
