//! Lexical scanner for (possibly malformed) C source.
//!
//! Classifies raw text into code / string / char / line-comment /
//! block-comment tokens and records brace and paren depth on every token,
//! so nothing downstream ever mistakes a brace inside a literal or comment
//! for structure.
//!
//! This is a lexer, not a parser. It never fails:
//! - unterminated block comments run to EOF
//! - unterminated string/char literals stop at EOF or at the first
//!   unescaped newline, whichever comes first
//! - an unmatched `}` never drives depth below zero
//!
//! Each of these marks the token `terminated = false`.

use serde::Serialize;

use crate::source::Span;

/// Classification of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Code,
    String,
    Char,
    LineComment,
    BlockComment,
}

impl TokenKind {
    pub fn is_comment(self) -> bool {
        matches!(self, Self::LineComment | Self::BlockComment)
    }

    pub fn is_literal(self) -> bool {
        matches!(self, Self::String | Self::Char)
    }
}

/// One lexeme borrowed from the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub span: Span,
    /// Brace depth the token sits at. A `{` and its matching `}` share the
    /// depth of the enclosing level.
    pub depth: u32,
    /// Paren depth, same convention as `depth`.
    pub paren_depth: u32,
    /// Token belongs to a `#` preprocessor line.
    pub directive: bool,
    /// False for a literal or comment closed implicitly.
    pub terminated: bool,
}

impl<'a> Token<'a> {
    pub fn is_code(&self) -> bool {
        self.kind == TokenKind::Code
    }

    pub fn is_comment(&self) -> bool {
        self.kind.is_comment()
    }

    /// Not a comment and not part of a preprocessor directive.
    pub fn is_significant(&self) -> bool {
        !self.is_comment() && !self.directive
    }

    /// Code token with standard C identifier syntax.
    pub fn is_ident(&self) -> bool {
        self.is_code() && is_identifier(self.text)
    }

    /// Code token starting with a digit.
    pub fn is_number(&self) -> bool {
        self.is_code() && self.text.as_bytes().first().is_some_and(|b| b.is_ascii_digit())
    }

    /// Code token equal to `p`.
    pub fn is_punct(&self, p: &str) -> bool {
        self.is_code() && self.text == p
    }

    /// Literal contents without the surrounding quotes.
    pub fn literal_body(&self) -> &'a str {
        if !self.kind.is_literal() {
            return self.text;
        }
        let inner = &self.text[1..];
        if self.terminated && !inner.is_empty() {
            &inner[..inner.len() - 1]
        } else {
            inner
        }
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(s: &str) -> bool {
    let mut bytes = s.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// C keywords and compiler pseudo-keywords that look like `name(` but are
/// never functions.
const RESERVED: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while", "_Alignas", "_Alignof", "_Atomic", "_Bool",
    "_Complex", "_Generic", "_Noreturn", "_Static_assert", "_Thread_local", "alignof", "asm",
    "__asm", "__asm__", "__attribute__", "__declspec", "__typeof__", "typeof", "defined",
    "__cdecl", "__stdcall", "__fastcall", "__thiscall",
];

/// Whether `word` can never be a function name or call target.
pub fn is_reserved(word: &str) -> bool {
    RESERVED.contains(&word)
}

const TWO_CHAR_OPS: &[&str] = &[
    "->", "++", "--", "&&", "||", "==", "!=", "<=", ">=", "<<", ">>", "::", "+=", "-=", "*=",
    "/=", "%=", "&=", "|=", "^=",
];

/// Tokenize `text`. Never fails.
pub fn scan(text: &str) -> Vec<Token<'_>> {
    Scanner::new(text).run()
}

/// Comment-free, directive-free view of a token slice.
pub fn significant<'t, 'a>(tokens: &'t [Token<'a>]) -> Vec<&'t Token<'a>> {
    tokens.iter().filter(|t| t.is_significant()).collect()
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    depth: u32,
    paren: u32,
    line_has_code: bool,
    in_directive: bool,
    tokens: Vec<Token<'a>>,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            depth: 0,
            paren: 0,
            line_has_code: false,
            in_directive: false,
            tokens: Vec::with_capacity(src.len() / 4),
        }
    }

    fn run(mut self) -> Vec<Token<'a>> {
        let len = self.bytes.len();
        while self.pos < len {
            let b = self.bytes[self.pos];
            let next = self.bytes.get(self.pos + 1).copied();
            match b {
                b'\n' => {
                    if self.in_directive && !self.line_continues() {
                        self.in_directive = false;
                    }
                    self.line += 1;
                    self.line_has_code = false;
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' | 0x0b | 0x0c => self.pos += 1,
                b'/' if next == Some(b'/') => {
                    let end = self.src[self.pos..]
                        .find('\n')
                        .map_or(len, |i| self.pos + i);
                    self.emit(TokenKind::LineComment, end, true);
                }
                b'/' if next == Some(b'*') => {
                    let (end, terminated) = match self.src[self.pos + 2..].find("*/") {
                        Some(i) => (self.pos + 2 + i + 2, true),
                        None => (len, false),
                    };
                    self.emit(TokenKind::BlockComment, end, terminated);
                }
                b'"' => self.literal(b'"', TokenKind::String),
                b'\'' => self.literal(b'\'', TokenKind::Char),
                b'#' if !self.line_has_code => {
                    self.in_directive = true;
                    self.emit(TokenKind::Code, self.pos + 1, true);
                }
                _ if is_word_byte(b) => {
                    let numeric = b.is_ascii_digit();
                    let mut end = self.pos + 1;
                    while end < len
                        && (is_word_byte(self.bytes[end]) || (numeric && self.bytes[end] == b'.'))
                    {
                        end += 1;
                    }
                    self.emit(TokenKind::Code, end, true);
                }
                _ => {
                    let rest = &self.src[self.pos..];
                    let width = if rest.starts_with("...") {
                        3
                    } else if TWO_CHAR_OPS.iter().any(|op| rest.starts_with(op)) {
                        2
                    } else {
                        1
                    };
                    self.emit(TokenKind::Code, self.pos + width, true);
                }
            }
        }
        self.tokens
    }

    /// Directive lines continue when the newline is escaped.
    fn line_continues(&self) -> bool {
        let mut i = self.pos;
        while i > 0 {
            i -= 1;
            match self.bytes[i] {
                b'\r' => continue,
                b'\\' => return true,
                _ => return false,
            }
        }
        false
    }

    fn literal(&mut self, quote: u8, kind: TokenKind) {
        let len = self.bytes.len();
        let mut i = self.pos + 1;
        let mut terminated = false;
        while i < len {
            match self.bytes[i] {
                b'\\' => i += 2,
                c if c == quote => {
                    i += 1;
                    terminated = true;
                    break;
                }
                b'\n' => break,
                _ => i += 1,
            }
        }
        self.emit(kind, i.min(len), terminated);
    }

    fn emit(&mut self, kind: TokenKind, end: usize, terminated: bool) {
        let text = &self.src[self.pos..end];
        let newlines = text.bytes().filter(|&b| b == b'\n').count();
        let directive = self.in_directive;

        let mut depth = self.depth;
        let mut paren_depth = self.paren;
        if kind == TokenKind::Code && !directive {
            match text {
                "{" => self.depth += 1,
                "}" => {
                    self.depth = self.depth.saturating_sub(1);
                    depth = self.depth;
                }
                "(" => self.paren += 1,
                ")" => {
                    self.paren = self.paren.saturating_sub(1);
                    paren_depth = self.paren;
                }
                _ => {}
            }
        }

        self.tokens.push(Token {
            kind,
            text,
            span: Span::new(self.pos, end, self.line, self.line + newlines),
            depth,
            paren_depth,
            directive,
            terminated,
        });

        if !kind.is_comment() {
            self.line_has_code = true;
        }
        self.line += newlines;
        self.pos = end;
    }
}

#[inline]
fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}
