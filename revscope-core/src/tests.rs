//! End-to-end test suite for revscope-core.

use crate::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn write_file(file: &Path, content: &str) {
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(file, content).unwrap();
}

fn setup_temp_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir()
        .join("revscope_tests")
        .join(format!("{}_{}", timestamp, id));

    if dir.exists() {
        fs::remove_dir_all(&dir).ok();
    }
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Decompiler-flavored source: `n` functions of varying length, each
/// calling the previous one, with braces hidden in literals and comments.
fn generated_source(n: usize) -> String {
    let mut s = String::from("#include <stdio.h>\n/* header { not a brace */\n\n");
    for i in 0..n {
        s.push_str(&format!("static int g_{} = {};\n", i, i));
        s.push_str(&format!("int func_{}(int a, char *s)\n{{\n", i));
        for j in 0..(i % 7 + 1) {
            if i > 0 {
                s.push_str(&format!(
                    "    if (a > {}) {{\n        a = func_{}(a, \"}} {{\");\n    }}\n",
                    j,
                    i - 1
                ));
            } else {
                s.push_str(&format!("    a = a + {}; // {{\n", j));
            }
        }
        s.push_str("    /* } */\n    return a;\n}\n\n");
    }
    s
}

fn chunk_text(src: &str, max: usize) -> Vec<Chunk> {
    let file = SourceFile::from_text("gen.c", src);
    let tokens = scan_tokens(file.text());
    chunk_source(&file, &tokens, max).unwrap()
}

// ============================================================================
// Chunking properties
// ============================================================================

#[test]
fn test_chunks_reproduce_input() {
    let src = generated_source(40);
    for max in [1, 5, 17, 600] {
        let chunks = chunk_text(&src, max);
        let joined: String = chunks.iter().map(|c| c.raw_text.as_str()).collect();
        assert_eq!(joined, src, "max_chunk_size {}", max);

        // Contiguous, non-overlapping, numbered in order
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_line + 1, pair[1].start_line);
            assert_eq!(pair[0].id + 1, pair[1].id);
        }
    }
}

#[test]
fn test_no_function_straddles_chunks() {
    let src = generated_source(40);
    for max in [1, 5, 17] {
        let chunks = chunk_text(&src, max);
        let total: usize = chunks.iter().map(|c| c.functions.len()).sum();
        assert_eq!(total, 40);
        for c in &chunks {
            assert!(!c.incomplete);
            if !c.oversized {
                assert!(c.line_count <= max);
            }
            for f in &c.functions {
                assert!(!f.incomplete, "{} cut at max {}", f.name, max);
                assert!(f.header_line() >= c.start_line && f.end_line() <= c.end_line);
            }
        }
    }
}

#[test]
fn test_literal_braces_are_not_structure() {
    let src = generated_source(3);
    let chunks = chunk_text(&src, 600);
    let names: Vec<&str> = chunks[0].function_names();
    assert_eq!(names, vec!["func_0", "func_1", "func_2"]);
    let f2 = &chunks[0].functions[2];
    assert_eq!(f2.metrics.branch_count, 3);
    assert_eq!(f2.calls.get("func_1"), Some(&3));
}

#[test]
fn test_truncated_input_is_flagged() {
    let chunks = chunk_text("int f(void) {\n  if (x) {\n    return;\n", 600);
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].incomplete);
    assert!(chunks[0].functions[0].incomplete);

    let chunks = chunk_text("int x;\n/* never closed\nint y;\n", 1);
    assert!(chunks.last().unwrap().incomplete);
    assert!(!chunks[0].incomplete);
}

#[test]
fn test_empty_input() {
    assert!(chunk_text("", 10).is_empty());
    let analysis = Revscope::new().analyze(&SourceInput::from_text("")).unwrap();
    assert!(analysis.graph.is_empty());
    assert!(analysis.findings.is_empty());
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_add_scenario() {
    let analysis = Revscope::new()
        .analyze(&SourceInput::from_text("int add(int a,int b){return a+b;}"))
        .unwrap();
    assert_eq!(analysis.chunks.len(), 1);
    let records: Vec<_> = analysis.functions().collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "add");
    assert_eq!(records[0].metrics.branch_count, 0);
    assert_eq!(records[0].metrics.loop_count, 0);
    assert!(analysis.findings.is_empty());
}

#[test]
fn test_strcpy_scenario() {
    let analysis = Revscope::new()
        .analyze(&SourceInput::from_text("strcpy(dst, src);"))
        .unwrap();
    assert_eq!(analysis.findings.len(), 1);
    let f = &analysis.findings[0];
    assert!(f.severity >= Severity::High);
    assert_eq!(f.matched, "strcpy");
}

#[test]
fn test_import_thunks_are_not_findings() {
    let src = "char * strcpy(char *__dest, char *__src)\n{\n    return __dest;\n}\n\n\
               int printf(char *__format, ...)\n{\n    return 0;\n}\n\n\
               int login(char *password)\n{\n    return check(0);\n}\n";
    let analysis = Revscope::new().analyze(&SourceInput::from_text(src)).unwrap();
    let names: Vec<&str> = analysis.functions().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["strcpy", "printf", "login"]);
    assert!(analysis.findings.is_empty(), "{:?}", analysis.findings);

    // A thunk calling the real API from its body is still flagged
    let analysis = Revscope::new()
        .analyze(&SourceInput::from_text("void strcpy(char *d, char *s) { __imp_strcpy(d, s); gets(d); }\n"))
        .unwrap();
    let ids: Vec<&str> = analysis.findings.iter().map(|f| f.pattern_id.as_str()).collect();
    assert_eq!(ids, vec!["unbounded-read"]);
    assert_eq!(analysis.findings[0].function.as_deref(), Some("strcpy"));
}

#[test]
fn test_mutual_recursion_scenario() {
    let analysis = Revscope::new()
        .analyze(&SourceInput::from_text(
            "void a(void) { b(); }\nvoid b(void) { a(); }\n",
        ))
        .unwrap();
    let g = &analysis.graph;
    assert_eq!(g.cycles.len(), 1);
    for name in ["a", "b"] {
        let n = g.node(name).unwrap();
        assert_eq!(n.fan_in, 1);
        assert_eq!(n.fan_out, 1);
        assert!(n.in_cycle);
        assert!(!n.self_recursive);
    }
}

#[test]
fn test_diagram_truncation_scenario() {
    let mut input = GraphInput::default();
    let mut add = |from: usize, to: usize| {
        input.edges.push(InputEdge {
            from: format!("n{}", from),
            to: format!("n{}", to),
            count: 1,
        })
    };
    for to in 1..10 {
        add(0, to);
    }
    for from in 1..5 {
        add(from, from + 1);
    }
    add(7, 7);
    add(9, 1);

    let mut neighbours: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for e in &input.edges {
        if e.from != e.to {
            neighbours.entry(e.from.clone()).or_default().insert(e.to.clone());
            neighbours.entry(e.to.clone()).or_default().insert(e.from.clone());
        }
    }
    let degree = |n: &str| neighbours.get(n).map_or(0, |s| s.len());

    let spec = render(&input, ChartKind::Flow, 5).unwrap();
    assert_eq!(spec.nodes.len(), 5);
    assert!(spec.truncated);
    assert_eq!(spec.total_nodes, 10);
    assert_eq!(spec.edge_total(), input.edges.len());

    let kept_min = spec.nodes.iter().map(|n| degree(&n.label)).min().unwrap();
    let dropped_max = spec.external.dropped.iter().map(|n| degree(n)).max().unwrap();
    assert!(kept_min >= dropped_max);
    assert_eq!(spec.nodes[0].label, "n0");
}

#[test]
fn test_search_without_matches() {
    let file = SourceFile::from_text("t.c", generated_source(2));
    let tokens = scan_tokens(file.text());
    for search_type in [SearchType::Function, SearchType::Variable, SearchType::String, SearchType::Comment, SearchType::Any] {
        let query = SearchQuery::new("zzz_not_present", search_type);
        assert!(search(&file, &tokens, &query).unwrap().is_empty());
    }
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_graph_is_order_independent() {
    let chunks = chunk_text(&generated_source(12), 9);
    let records: Vec<&FunctionRecord> = chunks.iter().flat_map(|c| c.functions.iter()).collect();
    let forward = DependencyGraph::build(records.iter().copied());
    let backward = DependencyGraph::build(records.iter().rev().copied());
    assert_eq!(forward, backward);
    assert_eq!(forward.stats.max_call_depth, 11);
}

#[test]
fn test_analysis_is_deterministic() {
    let src = generated_source(15) + "void run(char *cmd) { system(cmd); sprintf(out, cmd); }\n";
    let revscope = Revscope::new().max_chunk_size(20);
    let first = revscope.analyze(&SourceInput::from_text(src.clone())).unwrap();
    let second = revscope.analyze(&SourceInput::from_text(src)).unwrap();
    assert_eq!(first, second);
    assert!(!first.findings.is_empty());
}

// ============================================================================
// Files, config and the engine
// ============================================================================

#[test]
fn test_engine_from_config_file() {
    let root = setup_temp_dir();
    write_file(
        &root.join(CONFIG_FILE),
        "[analysis]\nmax_chunk_size = 10\nmax_search_results = 3\n\n[risk]\ndisabled = [\"unbounded-copy\"]\n",
    );
    let source = root.join("src/dump.c");
    write_file(&source, &(generated_source(6) + "void cp(char *d, char *s) { strcpy(d, s); }\n"));

    let cfg = load_config(&root).unwrap().unwrap();
    let engine = Engine::new(cfg).unwrap();

    let out = engine
        .dispatch("chunk", serde_json::json!({ "path": source }))
        .unwrap();
    assert_eq!(out["max_chunk_size"], 10);
    assert!(out["chunks"].as_array().unwrap().len() > 1);

    let audit = engine
        .dispatch("security_audit", serde_json::json!({ "path": source }))
        .unwrap();
    assert_eq!(audit["findings"].as_array().unwrap().len(), 0);

    let found = engine
        .dispatch("search", serde_json::json!({ "path": source, "pattern": "func_", "search_type": "function" }))
        .unwrap();
    assert_eq!(found["matches"].as_array().unwrap().len(), 3);
    assert_eq!(found["truncated"], true);

    assert_eq!(engine.history().len(), 3);
    fs::remove_dir_all(&root).ok();
}

#[test]
fn test_missing_file_is_io_error() {
    let root = setup_temp_dir();
    let err = Revscope::new().analyze_path(&root.join("nope.c")).unwrap_err();
    assert!(matches!(err, RevscopeError::Io { .. }));
    assert_eq!(err.path(), Some(&root.join("nope.c")));
    fs::remove_dir_all(&root).ok();
}

#[test]
fn test_directory_batch() {
    let root = setup_temp_dir();
    write_file(&root.join("a.c"), "int a(void) { return b(); }\n");
    write_file(&root.join("sub/b.c"), "int b(void) { char t[4]; gets(t); return 0; }\n");
    write_file(&root.join("build/skip.c"), "int skip(void) { return 0; }\n");

    let files = gather_c_files(&root).unwrap();
    assert_eq!(files.len(), 2);
    let results = analyze_files_parallel(&files, &Revscope::new());
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    let severe: usize = results
        .iter()
        .filter_map(|(_, r)| r.as_ref().ok())
        .map(|a| a.severe_findings())
        .sum();
    assert_eq!(severe, 1);
    fs::remove_dir_all(&root).ok();
}

#[test]
fn test_report_from_prior_analysis() {
    let engine = Engine::new(RevscopeConfig::default()).unwrap();
    let analysis = Revscope::new()
        .analyze(&SourceInput::from_text(generated_source(4)))
        .unwrap();
    let resp = engine
        .report(&ops::ReportRequest {
            analysis: Some(analysis),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(resp.report.summary.function_count, 4);
    assert!(resp.markdown.contains("func_3"));
}
