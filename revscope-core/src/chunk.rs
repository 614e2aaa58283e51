//! Splits a source file into contiguous, line-aligned chunks.
//!
//! A chunk may only end on a line where:
//! - brace depth is back to 0
//! - no comment or literal continues onto the next line
//! - the last code on or before the line is a `}`, a `;` or a complete
//!   preprocessor directive
//!
//! Cutting is greedy: once a chunk reaches `max_chunk_size` lines it ends at
//! the last clean line seen so far. With no clean line available the chunk
//! grows until one appears, so a single huge function stays in one piece.
//! Concatenating every chunk's `raw_text` reproduces the source exactly.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{RevscopeError, RevscopeResult};
use crate::func::{assign_ordinals, extract_functions, FunctionRecord};
use crate::lexer::Token;
use crate::source::SourceFile;

/// One contiguous slice of the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// 1-based, in file order
    pub id: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub line_count: usize,
    pub byte_len: usize,
    /// Exact source text of lines `start_line..=end_line`
    pub raw_text: String,
    /// Unbalanced braces or an unterminated comment/literal at EOF, or an
    /// incomplete function inside
    pub incomplete: bool,
    /// Larger than the requested size because no clean boundary existed
    pub oversized: bool,
    /// Functions whose header starts in this chunk
    pub functions: Vec<FunctionRecord>,
}

impl Chunk {
    pub fn label(&self) -> String {
        format!("chunk_{}", self.id)
    }

    pub fn function_names(&self) -> Vec<&str> {
        self.functions.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Line range of a planned chunk, before extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBounds {
    pub start_line: usize,
    pub end_line: usize,
    pub incomplete: bool,
}

#[derive(Debug, Clone, Copy)]
struct LineState {
    depth: u32,
    clean: bool,
}

/// Plan chunk boundaries without extracting anything.
pub fn plan_chunks(
    tokens: &[Token<'_>],
    line_count: usize,
    max_chunk_size: usize,
) -> RevscopeResult<Vec<ChunkBounds>> {
    if max_chunk_size == 0 {
        return Err(RevscopeError::invalid_argument(
            "max_chunk_size must be at least 1",
        ));
    }
    if line_count == 0 {
        return Ok(Vec::new());
    }

    // State after the last token ending on each line, forward-filled.
    let mut at_line: Vec<Option<LineState>> = vec![None; line_count + 1];
    // Lines a multi-line token continues past.
    let mut spanned = vec![false; line_count + 1];
    let mut clean = true;

    for tok in tokens {
        for line in tok.span.line..tok.span.end_line.min(line_count + 1) {
            spanned[line] = true;
        }
        if tok.directive {
            clean = true;
        } else if tok.is_code() {
            clean = tok.text == "}" || tok.text == ";";
        } else if tok.kind.is_literal() {
            clean = false;
        }
        let depth = if tok.is_code() && !tok.directive && tok.text == "{" {
            tok.depth + 1
        } else {
            tok.depth
        };
        if tok.span.end_line <= line_count {
            at_line[tok.span.end_line] = Some(LineState { depth, clean });
        }
    }

    let mut state = LineState {
        depth: 0,
        clean: true,
    };
    let mut candidate = vec![false; line_count + 1];
    for line in 1..=line_count {
        if let Some(s) = at_line[line] {
            state = s;
        }
        candidate[line] = state.depth == 0 && state.clean && !spanned[line];
    }

    let open_at_eof = state.depth > 0 || tokens.last().is_some_and(|t| !t.terminated);

    let mut bounds = Vec::new();
    let mut start = 1usize;
    let mut last_clean: Option<usize> = None;
    let mut line = 1usize;
    while line <= line_count {
        if candidate[line] {
            last_clean = Some(line);
        }
        let size = line - start + 1;
        if size >= max_chunk_size {
            if let Some(cut) = last_clean {
                bounds.push(ChunkBounds {
                    start_line: start,
                    end_line: cut,
                    incomplete: false,
                });
                start = cut + 1;
                last_clean = None;
                line = start;
                continue;
            }
        }
        line += 1;
    }
    if start <= line_count {
        bounds.push(ChunkBounds {
            start_line: start,
            end_line: line_count,
            incomplete: open_at_eof,
        });
    } else if let Some(last) = bounds.last_mut() {
        last.incomplete = open_at_eof;
    }

    Ok(bounds)
}

/// Split `file` into chunks and extract the functions of each chunk.
///
/// Extraction runs per chunk in parallel; ordinals for repeated names are
/// assigned afterwards in file order.
pub fn chunk_source(
    file: &SourceFile,
    tokens: &[Token<'_>],
    max_chunk_size: usize,
) -> RevscopeResult<Vec<Chunk>> {
    let bounds = plan_chunks(tokens, file.line_count(), max_chunk_size)?;
    let text = file.text();
    let lines = file.lines();

    let mut chunks: Vec<Chunk> = bounds
        .par_iter()
        .enumerate()
        .map(|(idx, b)| {
            let id = idx + 1;
            let lo = tokens.partition_point(|t| t.span.line < b.start_line);
            let hi = tokens.partition_point(|t| t.span.line <= b.end_line);
            let functions = extract_functions(text, &tokens[lo..hi], id);
            let range = lines.lines_range(b.start_line, b.end_line);
            let line_count = b.end_line - b.start_line + 1;
            Chunk {
                id,
                start_line: b.start_line,
                end_line: b.end_line,
                line_count,
                byte_len: range.len(),
                raw_text: text[range].to_string(),
                incomplete: b.incomplete || functions.iter().any(|f| f.incomplete),
                oversized: line_count > max_chunk_size,
                functions,
            }
        })
        .collect();

    assign_ordinals(chunks.iter_mut().flat_map(|c| c.functions.iter_mut()));

    for chunk in chunks.iter().filter(|c| c.oversized) {
        tracing::warn!(
            chunk = chunk.id,
            lines = chunk.line_count,
            max = max_chunk_size,
            "no clean boundary within limit, chunk exceeds max size"
        );
    }
    tracing::debug!(file = %file.name(), chunks = chunks.len(), "chunking complete");

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::scan;

    fn chunk(src: &str, max: usize) -> Vec<Chunk> {
        let file = SourceFile::from_text("t.c", src);
        let toks = scan(file.text());
        chunk_source(&file, &toks, max).unwrap()
    }

    fn joined(chunks: &[Chunk]) -> String {
        chunks.iter().map(|c| c.raw_text.as_str()).collect()
    }

    #[test]
    fn test_zero_size_rejected() {
        let file = SourceFile::from_text("t.c", "int x;\n");
        let toks = scan(file.text());
        let err = chunk_source(&file, &toks, 0).unwrap_err();
        assert!(matches!(err, RevscopeError::InvalidArgument { .. }));
    }

    #[test]
    fn test_empty_source_has_no_chunks() {
        assert!(chunk("", 10).is_empty());
    }

    #[test]
    fn test_small_file_is_one_chunk() {
        let src = "int a(void) { return 1; }\nint b(void) { return 2; }\n";
        let chunks = chunk(src, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].functions.len(), 2);
        assert_eq!(chunks[0].label(), "chunk_1");
        assert!(!chunks[0].incomplete);
    }

    #[test]
    fn test_split_between_functions() {
        let src = "void a(void) {\n  x();\n}\nvoid b(void) {\n  y();\n}\nvoid c(void) {\n  z();\n}\n";
        let chunks = chunk(src, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 3));
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (4, 6));
        assert_eq!(chunks[2].function_names(), vec!["c"]);
        assert_eq!(joined(&chunks), src);
    }

    #[test]
    fn test_never_splits_inside_a_function() {
        let src = "void big(void) {\n  a();\n  b();\n  c();\n  d();\n}\nint x;\n";
        let chunks = chunk(src, 2);
        assert_eq!(chunks[0].end_line, 6);
        assert!(chunks[0].oversized);
        assert_eq!(chunks[0].functions.len(), 1);
        assert_eq!(joined(&chunks), src);
    }

    #[test]
    fn test_never_splits_inside_block_comment() {
        let src = "int a;\n/* one\ntwo\nthree */\nint b;\n";
        let chunks = chunk(src, 2);
        for c in &chunks {
            let opens = c.raw_text.matches("/*").count();
            let closes = c.raw_text.matches("*/").count();
            assert_eq!(opens, closes, "comment split across chunks: {:?}", c.raw_text);
        }
        assert_eq!(joined(&chunks), src);
    }

    #[test]
    fn test_unbalanced_braces_mark_last_chunk_incomplete() {
        let src = "int ok(void) { return 0; }\nint broken(void) {\n  if (x) {\n";
        let chunks = chunk(src, 100);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].incomplete);
        assert!(chunks[0].functions[1].incomplete);
    }

    #[test]
    fn test_no_trailing_newline() {
        let src = "int a;\nint b;";
        let chunks = chunk(src, 1);
        assert_eq!(chunks.len(), 2);
        assert_eq!(joined(&chunks), src);
    }

    #[test]
    fn test_ordinals_span_chunks() {
        let src = "void d(void) {\n}\nvoid d(void) {\n}\n";
        let chunks = chunk(src, 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].functions[0].ordinal, 1);
        assert_eq!(chunks[1].functions[0].ordinal, 2);
    }

    #[test]
    fn test_directives_are_clean_boundaries() {
        let src = "#include <stdio.h>\n#define N 4\nint x;\n";
        let chunks = chunk(src, 1);
        assert_eq!(chunks.len(), 3);
    }
}
