//! Security risk patterns over scanner tokens.
//!
//! The catalog is an ordered table of [`RiskRule`]s. Each rule matches on
//! token structure, never on raw text, so a dangerous name inside a comment
//! or string literal is never reported (except by rules that look at
//! literals on purpose, such as the credential rule).
//!
//! Findings come out grouped by rule in table order, then by position.
//! Overlapping matches from different rules are all kept.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::callgraph::calls::call_site_indices;
use crate::error::{RevscopeError, RevscopeResult};
use crate::lexer::{Token, TokenKind};
use crate::source::Span;

/// Finding severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight used by the security score: low 1 … critical 4.
    pub fn weight(self) -> u32 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = RevscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(RevscopeError::invalid_argument(format!(
                "unknown severity `{}` (expected low, medium, high or critical)",
                other
            ))),
        }
    }
}

/// How a rule recognizes its pattern.
#[derive(Debug, Clone)]
pub enum RulePattern {
    /// Any call to one of these functions
    Call(&'static [&'static str]),
    /// Call whose format argument (at the given index) is not a string literal
    FormatArgument(&'static [(&'static str, usize)]),
    /// Scanf-family call whose literal format has `%s` / `%[` without a width
    UnboundedScanf(&'static [(&'static str, usize)]),
    /// Allocation whose result is never compared against NULL
    UncheckedAllocation(&'static [&'static str]),
    /// Allocation in a body that never calls a release function
    AllocationWithoutRelease {
        alloc: &'static [&'static str],
        release: &'static [&'static str],
    },
    /// Unary `*` over a parenthesized `+` / `-` expression
    PointerArithmetic,
    /// Assignment through a non-constant index
    IndexedWrite,
    /// Identifier or string literal containing one of these fragments
    SensitiveName(&'static [&'static str]),
    /// Bare keyword anywhere in code
    Keyword(&'static [&'static str]),
}

/// One catalog entry.
#[derive(Debug, Clone)]
pub struct RiskRule {
    pub id: &'static str,
    pub category: &'static str,
    pub severity: Severity,
    pub pattern: RulePattern,
    pub rationale: &'static str,
    pub remedy: &'static str,
}

/// One matched rule instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFinding {
    pub pattern_id: String,
    pub category: String,
    pub severity: Severity,
    pub span: Span,
    /// Source text of the match
    pub matched: String,
    pub rationale: String,
    pub remedy: String,
    /// Enclosing function, when known
    #[serde(default)]
    pub function: Option<String>,
}

/// `[risk]` section of the config: disable rules or change their severity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskOverrides {
    pub disabled: Vec<String>,
    pub severity: BTreeMap<String, Severity>,
}

impl RiskOverrides {
    pub fn is_empty(&self) -> bool {
        self.disabled.is_empty() && self.severity.is_empty()
    }
}

const FORMAT_FUNCTIONS: &[(&str, usize)] = &[
    ("printf", 0),
    ("vprintf", 0),
    ("wprintf", 0),
    ("fprintf", 1),
    ("vfprintf", 1),
    ("dprintf", 1),
    ("sprintf", 1),
    ("vsprintf", 1),
    ("syslog", 1),
    ("snprintf", 2),
    ("vsnprintf", 2),
    ("swprintf", 2),
];

const SCANF_FUNCTIONS: &[(&str, usize)] = &[
    ("scanf", 0),
    ("vscanf", 0),
    ("fscanf", 1),
    ("sscanf", 1),
    ("vfscanf", 1),
    ("vsscanf", 1),
];

const ALLOCATORS: &[&str] = &["malloc", "calloc", "realloc", "strdup", "strndup"];

fn builtin_rules() -> Vec<RiskRule> {
    vec![
        RiskRule {
            id: "unbounded-copy",
            category: "buffer overflow",
            severity: Severity::High,
            pattern: RulePattern::Call(&["strcpy", "strcat", "wcscpy", "wcscat", "stpcpy"]),
            rationale: "copies until the source terminator with no bound on the destination",
            remedy: "use a length-bounded copy (strlcpy/strncpy with explicit termination) and check sizes",
        },
        RiskRule {
            id: "unbounded-format",
            category: "buffer overflow",
            severity: Severity::High,
            pattern: RulePattern::Call(&["sprintf", "vsprintf"]),
            rationale: "formatted output length is not bounded by the destination size",
            remedy: "use snprintf/vsnprintf with the destination size and check the return value",
        },
        RiskRule {
            id: "unbounded-read",
            category: "buffer overflow",
            severity: Severity::Critical,
            pattern: RulePattern::Call(&["gets"]),
            rationale: "reads an unbounded line into a fixed buffer",
            remedy: "replace with fgets and an explicit buffer size",
        },
        RiskRule {
            id: "unbounded-scanf",
            category: "buffer overflow",
            severity: Severity::High,
            pattern: RulePattern::UnboundedScanf(SCANF_FUNCTIONS),
            rationale: "string conversion without a field width can overrun the target buffer",
            remedy: "give every %s / %[ conversion a maximum field width",
        },
        RiskRule {
            id: "format-string",
            category: "format string",
            severity: Severity::High,
            pattern: RulePattern::FormatArgument(FORMAT_FUNCTIONS),
            rationale: "format argument is not a literal and may be attacker controlled",
            remedy: "pass a constant format such as \"%s\" and the data as an argument",
        },
        RiskRule {
            id: "command-injection",
            category: "command injection",
            severity: Severity::Critical,
            pattern: RulePattern::Call(&[
                "system", "popen", "execl", "execlp", "execle", "execv", "execvp", "execve", "WinExec",
                "ShellExecuteA", "ShellExecuteW",
            ]),
            rationale: "runs an external command; any tainted argument becomes code execution",
            remedy: "avoid the shell, use a fixed argv with validated arguments",
        },
        RiskRule {
            id: "unchecked-allocation",
            category: "memory management",
            severity: Severity::Medium,
            pattern: RulePattern::UncheckedAllocation(ALLOCATORS),
            rationale: "allocation result is used without a NULL check",
            remedy: "check the returned pointer before use",
        },
        RiskRule {
            id: "allocation-without-free",
            category: "memory leak",
            severity: Severity::Medium,
            pattern: RulePattern::AllocationWithoutRelease {
                alloc: ALLOCATORS,
                release: &["free", "realloc"],
            },
            rationale: "memory is allocated but never released in this scope",
            remedy: "release the allocation on every path or document the ownership transfer",
        },
        RiskRule {
            id: "pointer-arithmetic",
            category: "memory safety",
            severity: Severity::Low,
            pattern: RulePattern::PointerArithmetic,
            rationale: "dereference of a computed address; offsets are not bounds checked",
            remedy: "replace raw offsets with typed struct fields or checked indexing",
        },
        RiskRule {
            id: "indexed-write",
            category: "buffer overflow",
            severity: Severity::Medium,
            pattern: RulePattern::IndexedWrite,
            rationale: "write through a variable index with no visible bounds check",
            remedy: "validate the index against the buffer length before writing",
        },
        RiskRule {
            id: "hardcoded-credential",
            category: "sensitive data",
            severity: Severity::Medium,
            pattern: RulePattern::SensitiveName(&["password", "passwd", "pwd", "secret", "apikey", "api_key"]),
            rationale: "credential-like name or literal; secrets may be embedded in the binary",
            remedy: "load credentials from protected storage at runtime",
        },
        RiskRule {
            id: "insecure-temp-file",
            category: "race condition",
            severity: Severity::Medium,
            pattern: RulePattern::Call(&["tmpnam", "tempnam", "mktemp"]),
            rationale: "predictable temporary file name allows a symlink race",
            remedy: "use mkstemp and operate on the returned descriptor",
        },
        RiskRule {
            id: "stack-allocation",
            category: "stack exhaustion",
            severity: Severity::Medium,
            pattern: RulePattern::Call(&["alloca", "_alloca"]),
            rationale: "variable-size stack allocation can exhaust or jump the stack guard",
            remedy: "use a bounded heap allocation",
        },
        RiskRule {
            id: "weak-random",
            category: "weak randomness",
            severity: Severity::Low,
            pattern: RulePattern::Call(&["rand", "srand", "random"]),
            rationale: "predictable generator, unsuitable for keys, nonces or tokens",
            remedy: "use the platform CSPRNG (getrandom, /dev/urandom, BCryptGenRandom)",
        },
        RiskRule {
            id: "inline-assembly",
            category: "unanalyzable code",
            severity: Severity::Low,
            pattern: RulePattern::Keyword(&["asm", "__asm", "__asm__"]),
            rationale: "inline assembly hides behavior from source-level review",
            remedy: "review the assembly by hand or lift it into C",
        },
    ]
}

/// Ordered risk catalog.
#[derive(Debug, Clone)]
pub struct RiskTable {
    rules: Vec<RiskRule>,
}

impl Default for RiskTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RiskTable {
    /// The built-in catalog.
    pub fn builtin() -> Self {
        Self {
            rules: builtin_rules(),
        }
    }

    /// Built-in catalog with rules disabled or re-rated.
    ///
    /// Unknown rule ids are rejected so a typo in the config cannot silently
    /// leave a rule active.
    pub fn with_overrides(overrides: &RiskOverrides) -> RevscopeResult<Self> {
        let mut table = Self::builtin();
        let known = |id: &str| table.rules.iter().any(|r| r.id == id);
        for id in overrides.disabled.iter().chain(overrides.severity.keys()) {
            if !known(id) {
                return Err(RevscopeError::invalid_argument(format!(
                    "unknown risk rule `{}`",
                    id
                )));
            }
        }
        table.rules.retain(|r| !overrides.disabled.iter().any(|d| d == r.id));
        for rule in &mut table.rules {
            if let Some(&sev) = overrides.severity.get(rule.id) {
                rule.severity = sev;
            }
        }
        Ok(table)
    }

    pub fn rules(&self) -> &[RiskRule] {
        &self.rules
    }

    pub fn rule(&self, id: &str) -> Option<&RiskRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Match every rule against `tokens` (significant tokens of one scope).
    ///
    /// `text` is the source the token spans point into.
    pub fn evaluate(&self, text: &str, tokens: &[&Token<'_>], function: Option<&str>) -> Vec<RiskFinding> {
        let calls = call_site_indices(tokens);
        let mut findings = Vec::new();
        for rule in &self.rules {
            for span in match_rule(rule, tokens, &calls) {
                findings.push(RiskFinding {
                    pattern_id: rule.id.to_string(),
                    category: rule.category.to_string(),
                    severity: rule.severity,
                    span,
                    matched: text.get(span.start..span.end).unwrap_or_default().to_string(),
                    rationale: rule.rationale.to_string(),
                    remedy: rule.remedy.to_string(),
                    function: function.map(String::from),
                });
            }
        }
        findings
    }
}

fn match_rule(rule: &RiskRule, toks: &[&Token<'_>], calls: &[usize]) -> Vec<Span> {
    let named = |names: &[&str]| -> Vec<usize> {
        calls
            .iter()
            .copied()
            .filter(|&i| names.contains(&toks[i].text))
            .collect()
    };

    match &rule.pattern {
        RulePattern::Call(names) => named(names).into_iter().map(|i| toks[i].span).collect(),

        RulePattern::FormatArgument(table) => calls
            .iter()
            .copied()
            .filter_map(|i| {
                let &(_, fmt_idx) = table.iter().find(|(n, _)| *n == toks[i].text)?;
                let (args, close) = call_arguments(toks, i);
                let arg = args.get(fmt_idx)?;
                let is_literal = !arg.is_empty()
                    && toks[arg.clone()].iter().all(|t| t.kind == TokenKind::String);
                (!is_literal && !arg.is_empty()).then(|| toks[i].span.join(&toks[close].span))
            })
            .collect(),

        RulePattern::UnboundedScanf(table) => calls
            .iter()
            .copied()
            .filter_map(|i| {
                let &(_, fmt_idx) = table.iter().find(|(n, _)| *n == toks[i].text)?;
                let (args, close) = call_arguments(toks, i);
                let arg = args.get(fmt_idx)?;
                let unbounded = toks[arg.clone()]
                    .iter()
                    .any(|t| t.kind == TokenKind::String && has_unbounded_conversion(t.literal_body()));
                unbounded.then(|| toks[i].span.join(&toks[close].span))
            })
            .collect(),

        RulePattern::UncheckedAllocation(names) => named(names)
            .into_iter()
            .filter(|&i| {
                let (_, close) = call_arguments(toks, i);
                !allocation_checked(toks, i, close)
            })
            .map(|i| toks[i].span)
            .collect(),

        RulePattern::AllocationWithoutRelease { alloc, release } => {
            let allocs = named(alloc);
            if allocs.is_empty() || !named(release).is_empty() {
                Vec::new()
            } else {
                vec![toks[allocs[0]].span]
            }
        }

        RulePattern::PointerArithmetic => pointer_arithmetic(toks),

        RulePattern::IndexedWrite => indexed_writes(toks),

        RulePattern::SensitiveName(words) => toks
            .iter()
            .filter(|t| t.is_ident() || t.kind == TokenKind::String)
            .filter(|t| {
                let lower = t.text.to_ascii_lowercase();
                words.iter().any(|w| lower.contains(w))
            })
            .map(|t| t.span)
            .collect(),

        RulePattern::Keyword(words) => toks
            .iter()
            .filter(|t| t.is_code() && words.contains(&t.text))
            .map(|t| t.span)
            .collect(),
    }
}

/// Argument token ranges of the call whose name is at `name_idx`, plus the
/// index of the closing paren (or the last token if it never closes).
fn call_arguments(toks: &[&Token<'_>], name_idx: usize) -> (Vec<std::ops::Range<usize>>, usize) {
    let open = name_idx + 1;
    let mut args = Vec::new();
    let mut level = 0usize;
    let mut arg_start = open + 1;
    for k in open..toks.len() {
        let t = toks[k];
        if !t.is_code() {
            continue;
        }
        match t.text {
            "(" | "[" => level += 1,
            ")" | "]" => {
                level = level.saturating_sub(1);
                if level == 0 {
                    if k > arg_start || !args.is_empty() {
                        args.push(arg_start..k);
                    }
                    return (args, k);
                }
            }
            "," if level == 1 => {
                args.push(arg_start..k);
                arg_start = k + 1;
            }
            _ => {}
        }
    }
    let last = toks.len().saturating_sub(1);
    if arg_start < toks.len() {
        args.push(arg_start..toks.len());
    }
    (args, last)
}

/// `%s` or `%[` with no field width (`%%` is a literal percent).
pub fn has_unbounded_conversion(fmt: &str) -> bool {
    let bytes = fmt.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        i += 1;
        if bytes.get(i) == Some(&b'%') {
            i += 1;
            continue;
        }
        // Assignment suppression writes nothing.
        let suppressed = bytes.get(i) == Some(&b'*');
        if suppressed {
            i += 1;
        }
        let digits_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let has_width = i > digits_start;
        // Length modifiers (l, ll, h, ...)
        while i < bytes.len() && matches!(bytes[i], b'l' | b'h' | b'L' | b'z' | b'j' | b't' | b'm') {
            i += 1;
        }
        if !has_width && !suppressed && matches!(bytes.get(i), Some(b's') | Some(b'[')) {
            return true;
        }
    }
    false
}

fn allocation_checked(toks: &[&Token<'_>], call: usize, close: usize) -> bool {
    // Skip a cast directly in front: `(char *)malloc(n)`.
    let mut j = call;
    if j > 0 && toks[j - 1].is_punct(")") {
        let mut level = 0usize;
        let mut k = j - 1;
        loop {
            match toks[k].text {
                ")" => level += 1,
                "(" => {
                    level -= 1;
                    if level == 0 {
                        break;
                    }
                }
                _ => {}
            }
            if k == 0 {
                return false;
            }
            k -= 1;
        }
        j = k;
    }
    if j == 0 {
        return false;
    }
    let prev = toks[j - 1];
    if prev.is_punct("return") {
        return true;
    }
    if !prev.is_punct("=") {
        return false;
    }
    // `if ((p = malloc(n)) == NULL)` / `if (!(p = malloc(n)))`
    let compared_inline = toks.get(close + 1).is_some_and(|t| t.is_punct(")"))
        && toks
            .get(close + 2)
            .is_some_and(|t| t.is_punct("==") || t.is_punct("!="));
    let negated_inline = j >= 4 && toks[j - 3].is_punct("(") && toks[j - 4].is_punct("!");
    if compared_inline || negated_inline {
        return true;
    }
    let Some(var) = j.checked_sub(2).map(|v| toks[v]).filter(|t| t.is_ident()) else {
        // Assigned into something complex (`a[i] = ...`); don't guess.
        return true;
    };

    (close + 1..toks.len()).any(|k| {
        let t = toks[k];
        if t.text != var.text || !t.is_code() {
            return false;
        }
        let before = toks[k - 1];
        let after = toks.get(k + 1);
        let cmp = |x: &Token<'_>| x.is_punct("==") || x.is_punct("!=");
        before.is_punct("!")
            || cmp(before)
            || after.is_some_and(|a| cmp(*a))
            || (before.is_punct("(")
                && k >= 2
                && matches!(toks[k - 2].text, "if" | "while" | "assert")
                && after.is_some_and(|a| a.is_punct(")")))
    })
}

/// Whether a `*` at `idx` is a dereference rather than multiplication.
fn is_unary_star(toks: &[&Token<'_>], idx: usize) -> bool {
    let Some(prev) = idx.checked_sub(1).map(|p| toks[p]) else {
        return true;
    };
    if prev.kind.is_literal() || prev.is_number() {
        return false;
    }
    if prev.is_ident() {
        return matches!(prev.text, "return" | "case" | "sizeof" | "else" | "do");
    }
    !(prev.is_punct(")") || prev.is_punct("]"))
}

fn pointer_arithmetic(toks: &[&Token<'_>]) -> Vec<Span> {
    let mut out = Vec::new();
    for i in 0..toks.len() {
        if !toks[i].is_punct("*") || !is_unary_star(toks, i) {
            continue;
        }
        // `*(p + n)` or `*(type *)(p + n)`
        let mut j = i + 1;
        for _ in 0..2 {
            if !toks.get(j).is_some_and(|t| t.is_punct("(")) {
                break;
            }
            let Some(close) = matching_close(toks, j, "(", ")") else {
                break;
            };
            if toks[j + 1..close].iter().any(|t| t.is_punct("+") || t.is_punct("-")) {
                out.push(toks[i].span.join(&toks[close].span));
                break;
            }
            j = close + 1;
        }
    }
    out
}

fn indexed_writes(toks: &[&Token<'_>]) -> Vec<Span> {
    const ASSIGN: &[&str] = &["=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>="];
    let mut out = Vec::new();
    for i in 1..toks.len() {
        if !toks[i].is_punct("[") {
            continue;
        }
        let prev = toks[i - 1];
        if !(prev.is_ident() || prev.is_punct("]") || prev.is_punct(")")) {
            continue;
        }
        let Some(close) = matching_close(toks, i, "[", "]") else {
            continue;
        };
        let variable_index = toks[i + 1..close].iter().any(|t| t.is_ident());
        let assigned = toks
            .get(close + 1)
            .is_some_and(|t| t.is_code() && ASSIGN.contains(&t.text));
        if variable_index && assigned {
            out.push(prev.span.join(&toks[close].span));
        }
    }
    out
}

fn matching_close(toks: &[&Token<'_>], open: usize, o: &str, c: &str) -> Option<usize> {
    let mut level = 0usize;
    for (k, t) in toks.iter().enumerate().skip(open) {
        if t.is_punct(o) {
            level += 1;
        } else if t.is_punct(c) {
            level -= 1;
            if level == 0 {
                return Some(k);
            }
        }
    }
    None
}
