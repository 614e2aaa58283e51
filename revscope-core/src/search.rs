//! Pattern search over the classified token stream.
//!
//! Searches are typed: a `function` search only ever looks at identifiers
//! followed by `(`, a `string` search only inside literals, and so on. The
//! scanner has already decided what is code, literal or comment, so a
//! pattern can never match a function name inside a comment by accident.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RevscopeError, RevscopeResult};
use crate::func::is_definition_at;
use crate::lexer::{is_reserved, significant, Token, TokenKind};
use crate::source::{SourceFile, Span};

/// Longest line context kept on a match.
const MAX_CONTEXT_CHARS: usize = 200;

/// What a search looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    /// Identifiers followed by `(`
    Function,
    /// Identifiers not followed by `(`
    Variable,
    /// String and char literal contents
    String,
    /// Line and block comments
    Comment,
    /// The raw text
    #[default]
    #[serde(alias = "regex", alias = "all")]
    Any,
}

impl SearchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Variable => "variable",
            Self::String => "string",
            Self::Comment => "comment",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchType {
    type Err = RevscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "function" | "func" => Ok(Self::Function),
            "variable" | "var" => Ok(Self::Variable),
            "string" | "str" => Ok(Self::String),
            "comment" => Ok(Self::Comment),
            "any" | "all" | "regex" => Ok(Self::Any),
            other => Err(RevscopeError::invalid_argument(format!(
                "unknown search type `{}` (expected function, variable, string, comment or any)",
                other
            ))),
        }
    }
}

/// Classification of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Function,
    Variable,
    String,
    Comment,
    Code,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub span: Span,
    pub matched_text: String,
    pub kind: MatchKind,
    /// Function match at a top-level definition rather than a call
    pub is_definition: bool,
    /// Trimmed source line of the match
    pub context: String,
}

/// A validated search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub pattern: String,
    #[serde(default)]
    pub search_type: SearchType,
    /// Match `pattern` verbatim instead of as a regex
    #[serde(default)]
    pub literal: bool,
}

impl SearchQuery {
    pub fn new(pattern: impl Into<String>, search_type: SearchType) -> Self {
        Self {
            pattern: pattern.into(),
            search_type,
            literal: false,
        }
    }

    pub fn with_literal(mut self, literal: bool) -> Self {
        self.literal = literal;
        self
    }

    /// Compiled matcher, `None` for an empty pattern.
    ///
    /// A literal identifier search matches whole names only.
    pub fn compile(&self) -> RevscopeResult<Option<Regex>> {
        if self.pattern.is_empty() {
            return Ok(None);
        }
        let source = if self.literal {
            let escaped = regex::escape(&self.pattern);
            match self.search_type {
                SearchType::Function | SearchType::Variable => format!("^{}$", escaped),
                _ => escaped,
            }
        } else {
            self.pattern.clone()
        };
        Regex::new(&source).map(Some).map_err(|e| {
            RevscopeError::invalid_argument(format!("invalid search pattern `{}`: {}", self.pattern, e))
        })
    }
}

/// Run `query` over `file`. `tokens` must come from scanning `file.text()`.
///
/// Matches are in file order. An empty pattern gives no matches.
pub fn search(file: &SourceFile, tokens: &[Token<'_>], query: &SearchQuery) -> RevscopeResult<Vec<SearchMatch>> {
    let Some(re) = query.compile()? else {
        return Ok(Vec::new());
    };
    let sig = significant(tokens);

    let mut matches = match query.search_type {
        SearchType::Function => identifiers(file, &sig, &re, true),
        SearchType::Variable => identifiers(file, &sig, &re, false),
        SearchType::String => inside_tokens(file, tokens, &re, TokenKind::is_literal, MatchKind::String),
        SearchType::Comment => inside_tokens(file, tokens, &re, TokenKind::is_comment, MatchKind::Comment),
        SearchType::Any => anywhere(file, tokens, &sig, &re),
    };
    matches.sort_by_key(|m| m.span.start);

    tracing::debug!(
        pattern = %query.pattern,
        search_type = %query.search_type,
        matches = matches.len(),
        "search finished"
    );
    Ok(matches)
}

fn identifiers(file: &SourceFile, sig: &[&Token<'_>], re: &Regex, calls: bool) -> Vec<SearchMatch> {
    let mut out = Vec::new();
    for (i, tok) in sig.iter().enumerate() {
        if !tok.is_ident() || is_reserved(tok.text) {
            continue;
        }
        let followed_by_paren = sig.get(i + 1).is_some_and(|n| n.is_punct("("));
        if followed_by_paren != calls || !re.is_match(tok.text) {
            continue;
        }
        out.push(SearchMatch {
            span: tok.span,
            matched_text: tok.text.to_string(),
            kind: if calls { MatchKind::Function } else { MatchKind::Variable },
            is_definition: calls && is_definition_at(sig, i),
            context: context_line(file, tok.span.line),
        });
    }
    out
}

fn inside_tokens(
    file: &SourceFile,
    tokens: &[Token<'_>],
    re: &Regex,
    keep: fn(TokenKind) -> bool,
    kind: MatchKind,
) -> Vec<SearchMatch> {
    let mut out = Vec::new();
    for tok in tokens.iter().filter(|t| keep(t.kind)) {
        let (body, base) = if tok.kind.is_literal() {
            (tok.literal_body(), tok.span.start + 1)
        } else {
            (tok.text, tok.span.start)
        };
        for m in re.find_iter(body) {
            if m.as_str().is_empty() {
                continue;
            }
            out.push(sub_match(file, base + m.start(), m.as_str(), kind, false));
        }
    }
    out
}

fn anywhere(file: &SourceFile, tokens: &[Token<'_>], sig: &[&Token<'_>], re: &Regex) -> Vec<SearchMatch> {
    re.find_iter(file.text())
        .filter(|m| !m.as_str().is_empty())
        .map(|m| {
            let (kind, is_definition) = classify(tokens, sig, m.start());
            sub_match(file, m.start(), m.as_str(), kind, is_definition)
        })
        .collect()
}

/// Kind of the token containing `offset`; whitespace counts as code.
fn classify(tokens: &[Token<'_>], sig: &[&Token<'_>], offset: usize) -> (MatchKind, bool) {
    let idx = tokens.partition_point(|t| t.span.end <= offset);
    let Some(tok) = tokens.get(idx).filter(|t| t.span.start <= offset) else {
        return (MatchKind::Code, false);
    };
    match tok.kind {
        TokenKind::String | TokenKind::Char => (MatchKind::String, false),
        TokenKind::LineComment | TokenKind::BlockComment => (MatchKind::Comment, false),
        TokenKind::Code if tok.is_ident() && !is_reserved(tok.text) && !tok.directive => {
            let j = sig.partition_point(|s| s.span.start < tok.span.start);
            if sig.get(j + 1).is_some_and(|n| n.is_punct("(")) {
                (MatchKind::Function, is_definition_at(sig, j))
            } else {
                (MatchKind::Variable, false)
            }
        }
        TokenKind::Code => (MatchKind::Code, false),
    }
}

fn sub_match(file: &SourceFile, start: usize, matched: &str, kind: MatchKind, is_definition: bool) -> SearchMatch {
    let end = start + matched.len();
    let lines = file.lines();
    let line = lines.line_of(start);
    SearchMatch {
        span: Span::new(start, end, line, lines.line_of(end - 1)),
        matched_text: matched.to_string(),
        kind,
        is_definition,
        context: context_line(file, line),
    }
}

fn context_line(file: &SourceFile, line: usize) -> String {
    let range = file.lines().line_range(line);
    let trimmed = file.text().get(range).unwrap_or_default().trim();
    if trimmed.chars().count() > MAX_CONTEXT_CHARS {
        trimmed.chars().take(MAX_CONTEXT_CHARS).collect()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::scan;

    const SRC: &str = "/* init the modbus stack */\n\
int modbus_init(int fd) {\n\
    char *msg = \"modbus ready\";\n\
    log_msg(msg);\n\
    return fd;\n\
}\n\
void main_loop(void) {\n\
    modbus_init(3);\n\
}\n";

    fn run(pattern: &str, search_type: SearchType, literal: bool) -> RevscopeResult<Vec<SearchMatch>> {
        let file = SourceFile::from_text("t.c", SRC);
        let tokens = scan(file.text());
        search(&file, &tokens, &SearchQuery::new(pattern, search_type).with_literal(literal))
    }

    #[test]
    fn test_function_search_flags_definition() {
        let matches = run("modbus_init", SearchType::Function, false).unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches[0].is_definition);
        assert_eq!(matches[0].span.line, 2);
        assert!(!matches[1].is_definition);
        assert_eq!(matches[1].context, "modbus_init(3);");
    }

    #[test]
    fn test_variable_search_skips_calls() {
        let matches = run("msg", SearchType::Variable, false).unwrap();
        let lines: Vec<_> = matches.iter().map(|m| m.span.line).collect();
        assert_eq!(lines, vec![3, 4]);
        assert!(matches.iter().all(|m| m.matched_text == "msg"));
    }

    #[test]
    fn test_literal_identifier_is_whole_name() {
        assert!(run("ms", SearchType::Variable, true).unwrap().is_empty());
        assert_eq!(run("msg", SearchType::Variable, true).unwrap().len(), 2);
    }

    #[test]
    fn test_string_search_offsets() {
        let matches = run("ready", SearchType::String, false).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].span.start, SRC.find("ready").unwrap());
        assert_eq!(matches[0].kind, MatchKind::String);
    }

    #[test]
    fn test_comment_search() {
        let matches = run("modbus", SearchType::Comment, false).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].span.line, 1);
    }

    #[test]
    fn test_any_classifies_each_hit() {
        let matches = run("modbus", SearchType::Any, false).unwrap();
        let kinds: Vec<_> = matches.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![MatchKind::Comment, MatchKind::Function, MatchKind::String, MatchKind::Function]
        );
        assert!(matches[1].is_definition);
        assert!(!matches[3].is_definition);
    }

    #[test]
    fn test_empty_and_missing() {
        assert!(run("", SearchType::Any, false).unwrap().is_empty());
        assert!(run("nothing_here", SearchType::Function, false).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_regex() {
        let err = run("(", SearchType::Any, false).unwrap_err();
        assert!(matches!(err, RevscopeError::InvalidArgument { .. }));
        assert_eq!(run("(", SearchType::Any, true).unwrap().len(), 4);
    }

    #[test]
    fn test_search_type_parse() {
        assert_eq!("regex".parse::<SearchType>().unwrap(), SearchType::Any);
        assert_eq!("FUNCTION".parse::<SearchType>().unwrap(), SearchType::Function);
        assert!("bogus".parse::<SearchType>().is_err());
    }
}
