//! revscope CLI - structural analysis for large decompiled C files.
//!
//! Features:
//! - Boundary-safe chunking of multi-megabyte decompiler output
//! - Function extraction, call graph, cycles and critical functions
//! - Security audit with an ordered, configurable risk table
//! - Typed search, Mermaid / DOT diagrams, refactor advice, reports
//! - Rayon-powered batch audits over whole directories

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use revscope_core::ops::{
    ChunkRequest, DependencyRequest, DiagramRequest, DiagramSource, FunctionRequest,
    RecommendRequest, ReportRequest, SearchRequest, SourceRequest,
};
use revscope_core::scan::summarize;
use revscope_core::{
    analyze_files_parallel, gather_c_files_with_excludes, init_structured_logging, load_config,
    load_config_file, print_json, print_plain, Engine, Revscope, RevscopeConfig, Severity,
    SourceInput,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Structural analysis for decompiled C sources")]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to ./revscope.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct FileArg {
    /// Decompiled C source file
    file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a file into boundary-safe chunks
    Chunk {
        #[command(flatten)]
        input: FileArg,
        /// Maximum lines per chunk
        #[arg(long, value_name = "LINES")]
        max_lines: Option<usize>,
    },
    /// Analyze one function (the file holds the function text)
    Function {
        #[command(flatten)]
        input: FileArg,
        /// Pick this definition when the text holds several
        #[arg(long)]
        name: Option<String>,
    },
    /// Build the function dependency graph
    Deps {
        #[command(flatten)]
        input: FileArg,
    },
    /// Search identifiers, literals or comments
    Search {
        #[command(flatten)]
        input: FileArg,
        /// Regular expression (or literal text with --literal)
        pattern: String,
        /// function, variable, string, comment or any
        #[arg(long = "type", default_value = "any")]
        search_type: String,
        /// Treat the pattern as literal text
        #[arg(long)]
        literal: bool,
    },
    /// Render the call graph as a diagram
    Diagram {
        #[command(flatten)]
        input: FileArg,
        /// flow, hierarchy or mind_map
        #[arg(long)]
        kind: Option<String>,
        /// Keep at most this many nodes
        #[arg(long)]
        max_nodes: Option<usize>,
        /// Emit Graphviz DOT instead of Mermaid
        #[arg(long)]
        dot: bool,
        /// Write the diagram to a file instead of stdout
        #[arg(long, value_name = "FILE")]
        output: Option<String>,
    },
    /// Refactoring suggestions for one function
    Refactor {
        #[command(flatten)]
        input: FileArg,
        #[arg(long)]
        name: Option<String>,
    },
    /// Security audit of a file
    Audit {
        #[command(flatten)]
        input: FileArg,
    },
    /// Full markdown report
    Report {
        #[command(flatten)]
        input: FileArg,
        /// Write the report to a file instead of stdout
        #[arg(long, value_name = "FILE")]
        output: Option<String>,
    },
    /// Suggest which analysis to run next
    Recommend {
        /// Free-form description of the task
        #[arg(num_args = 0..)]
        context: Vec<String>,
    },
    /// Audit every .c/.h file below a directory
    Scan {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Additional directory names to skip
        #[arg(long, num_args = 1..)]
        exclude: Vec<String>,
    },
}

/// Security: Validates output file paths to prevent path traversal attacks.
///
/// Rejects:
/// - Absolute paths (must be relative to current directory)
/// - Paths containing `..` (parent directory traversal)
/// - Paths with null bytes (injection attacks)
fn validate_output_path(path: &str) -> Result<PathBuf> {
    if path.contains('\0') {
        return Err(anyhow!("Output path contains null bytes"));
    }

    let p = PathBuf::from(path);
    if p.is_absolute() {
        return Err(anyhow!("Output path must be relative, not absolute: {}", path));
    }
    if p.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(anyhow!("Path traversal (..) not allowed in output paths: {}", path));
    }

    Ok(p)
}

/// Explicit `--config` must load; the implicit `./revscope.toml` only warns.
fn resolve_config(explicit: Option<&Path>, cwd: &Path) -> Result<RevscopeConfig> {
    if let Some(path) = explicit {
        return load_config_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()));
    }
    match load_config(cwd) {
        Ok(Some(cfg)) => Ok(cfg),
        Ok(None) => Ok(RevscopeConfig::default()),
        Err(e) => {
            eprintln!("[WARN] config load failed: {}", e);
            Ok(RevscopeConfig::default())
        }
    }
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn write_or_print(output: Option<&str>, text: &str) -> Result<()> {
    match output {
        Some(out) => {
            let safe_path = validate_output_path(out)?;
            fs::write(&safe_path, text)
                .with_context(|| format!("Failed to write {}", safe_path.display()))?;
            eprintln!("[revscope] written → {}", safe_path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn main() -> Result<()> {
    // Global panic guard
    std::panic::set_hook(Box::new(|info| {
        eprintln!("[PANIC] revscope internal error: {}", info);
        eprintln!("[PANIC] The process will exit with code 2.");
    }));

    // JSON to stderr, respects RUST_LOG
    init_structured_logging();

    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let config = resolve_config(cli.config.as_deref(), &cwd)?;
    let engine = Engine::new(config).context("Invalid configuration")?;

    let code = run(&cli, &engine)?;
    std::process::exit(code);
}

/// Runs one subcommand; returns the process exit code.
fn run(cli: &Cli, engine: &Engine) -> Result<i32> {
    match &cli.command {
        Command::Chunk { input, max_lines } => {
            let resp = engine.chunk(&ChunkRequest {
                source: SourceInput::from_path(&input.file),
                max_chunk_size: *max_lines,
            })?;
            if cli.json {
                print_json(&resp);
            } else {
                println!("{}: {} lines, {} chunk(s)\n", resp.source.name, resp.source.total_lines, resp.chunks.len());
                for c in &resp.chunks {
                    let mut flags = Vec::new();
                    if c.oversized {
                        flags.push("oversized");
                    }
                    if c.incomplete {
                        flags.push("incomplete");
                    }
                    println!(
                        "{:>4}  lines {:>6}-{:<6} {:>3} function(s) {}",
                        c.label(),
                        c.start_line,
                        c.end_line,
                        c.functions.len(),
                        flags.join(" ")
                    );
                }
            }
            Ok(0)
        }

        Command::Function { input, name } | Command::Refactor { input, name } => {
            let req = FunctionRequest {
                function_text: read_text(&input.file)?,
                function_name: name.clone(),
            };
            if matches!(cli.command, Command::Refactor { .. }) {
                let advice = engine.refactor(&req)?;
                if cli.json {
                    print_json(&advice);
                } else {
                    println!("{} (priority {:?}, score {})", advice.function, advice.priority, advice.improvement_score);
                    for s in &advice.suggestions {
                        println!("  [{}] {}: {}", s.severity, s.title, s.detail);
                    }
                    if advice.is_empty() {
                        println!("  no suggestions");
                    }
                }
                return Ok(0);
            }

            let fa = engine.analyze_function(&req)?;
            if cli.json {
                print_json(&fa);
            } else if let Some(r) = &fa.record {
                println!("{} (lines {}-{})", r.key(), r.header_line(), r.end_line());
                println!("  complexity: {} (cyclomatic {})", fa.complexity_level, r.metrics.cyclomatic);
                println!("  calls: {}", r.calls.keys().cloned().collect::<Vec<_>>().join(", "));
                if let Some(level) = fa.risk_level {
                    println!("  risk: {} ({} finding(s))", level, fa.findings.len());
                }
                for hint in &fa.purpose_hints {
                    println!("  purpose: {}", hint);
                }
            } else {
                println!("No function found.");
            }
            Ok(0)
        }

        Command::Deps { input } => {
            let graph = engine.analyze_dependencies(&DependencyRequest {
                source: SourceInput::from_path(&input.file),
                ..Default::default()
            })?;
            if cli.json {
                print_json(&graph);
            } else {
                println!(
                    "{} function(s), {} edge(s), {} cycle(s)",
                    graph.stats.total_functions,
                    graph.stats.total_edges,
                    graph.cycles.len()
                );
                for n in graph.nodes.iter().filter(|n| !n.external) {
                    println!("  {:<32} in {:>3}  out {:>3}", n.name, n.fan_in, n.fan_out);
                }
                for c in &graph.cycles {
                    println!("  cycle: {}", c.members.join(" ↔ "));
                }
                if !graph.critical_functions.is_empty() {
                    println!("  critical: {}", graph.critical_functions.join(", "));
                }
            }
            Ok(0)
        }

        Command::Search {
            input,
            pattern,
            search_type,
            literal,
        } => {
            let resp = engine.search(&SearchRequest {
                source: SourceInput::from_path(&input.file),
                pattern: pattern.clone(),
                search_type: Some(search_type.clone()),
                literal: *literal,
            })?;
            if cli.json {
                print_json(&resp);
            } else {
                for m in &resp.matches {
                    let def = if m.is_definition { " (definition)" } else { "" };
                    println!("{}:{:?}{}  {}", m.span.line, m.kind, def, m.context);
                }
                if resp.truncated {
                    println!("... {} of {} matches shown", resp.matches.len(), resp.total);
                }
            }
            // grep-style: 1 when nothing matched
            Ok(if resp.total == 0 { 1 } else { 0 })
        }

        Command::Diagram {
            input,
            kind,
            max_nodes,
            dot,
            output,
        } => {
            let graph = engine.analyze_dependencies(&DependencyRequest {
                source: SourceInput::from_path(&input.file),
                ..Default::default()
            })?;
            let resp = engine.render_diagram(&DiagramRequest {
                graph: DiagramSource::Graph(graph),
                chart_kind: kind.clone(),
                max_nodes: *max_nodes,
                mermaid: !*dot,
                dot: *dot,
            })?;
            if cli.json {
                print_json(&resp);
                return Ok(0);
            }
            let text = resp.dot.as_deref().or(resp.mermaid.as_deref()).unwrap_or_default();
            write_or_print(output.as_deref(), text)?;
            if resp.spec.truncated {
                eprintln!(
                    "[revscope] showing {} of {} functions",
                    resp.spec.nodes.len(),
                    resp.spec.total_nodes
                );
            }
            Ok(0)
        }

        Command::Audit { input } => {
            let resp = engine.audit(&SourceRequest {
                source: SourceInput::from_path(&input.file),
            })?;
            if cli.json {
                print_json(&resp);
            } else {
                println!(
                    "{}: {} finding(s), security score {}",
                    resp.source.name, resp.summary.total, resp.summary.security_score
                );
                for f in &resp.findings {
                    println!(
                        "  {:>5}  {:<8} {:<24} {} in {}",
                        f.span.line,
                        f.severity,
                        f.pattern_id,
                        f.matched,
                        f.function.as_deref().unwrap_or("<top level>")
                    );
                }
            }
            let severe = resp.findings.iter().any(|f| f.severity >= Severity::High);
            Ok(if severe { 1 } else { 0 })
        }

        Command::Report { input, output } => {
            let resp = engine.report(&ReportRequest {
                source: SourceInput::from_path(&input.file),
                analysis: None,
            })?;
            if cli.json {
                print_json(&resp.report);
            } else if output.is_some() {
                write_or_print(output.as_deref(), &resp.markdown)?;
            } else {
                print_plain(&resp.report);
            }
            Ok(0)
        }

        Command::Recommend { context } => {
            let resp = engine.recommend(&RecommendRequest {
                context: context.join(" "),
            })?;
            if cli.json {
                print_json(&resp);
            } else {
                for r in &resp.recommendations {
                    println!("{:<22} {}", r.operation, r.description);
                }
            }
            Ok(0)
        }

        Command::Scan { path, exclude } => {
            let excludes: Vec<&str> = exclude.iter().map(String::as_str).collect();
            let files = gather_c_files_with_excludes(path, &excludes)
                .with_context(|| format!("Failed to gather C files from: {}", path.display()))?;
            if files.is_empty() {
                eprintln!("No C sources found under {}.", path.display());
                return Ok(0);
            }

            let revscope = Revscope::from_config(engine.config())?;
            let results = analyze_files_parallel(&files, &revscope);
            let summary = summarize(&results);

            if cli.json {
                print_json(&summary);
            } else {
                for s in &summary {
                    match &s.error {
                        Some(e) => println!("{}: [ERROR] {}", s.path.display(), e),
                        None => println!(
                            "{}: {} function(s), {} finding(s) ({} severe), {} cycle(s), score {}",
                            s.path.display(),
                            s.functions,
                            s.findings,
                            s.severe_findings,
                            s.cycles,
                            s.security_score
                        ),
                    }
                }
            }
            let severe = summary.iter().any(|s| s.severe_findings > 0);
            Ok(if severe { 1 } else { 0 })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_temp_dir(name: &str) -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let temp_dir = std::env::temp_dir()
            .join("revscope_cli_test")
            .join(format!("{}_{}_{}", name, std::process::id(), id));
        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir).ok();
        }
        fs::create_dir_all(&temp_dir).unwrap();
        temp_dir
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("revscope").chain(args.iter().copied())).unwrap()
    }

    // --- validate_output_path TESTS ---

    #[test]
    fn test_output_path_accepts_relative() {
        assert_eq!(validate_output_path("out/graph.dot").unwrap(), PathBuf::from("out/graph.dot"));
    }

    #[test]
    fn test_output_path_rejects_traversal_and_absolute() {
        assert!(validate_output_path("../graph.dot").is_err());
        assert!(validate_output_path("a/../../b").is_err());
        assert!(validate_output_path("/tmp/graph.dot").is_err());
        assert!(validate_output_path("a\0b").is_err());
    }

    // --- argument parsing TESTS ---

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let c = cli(&["audit", "dump.c", "--json"]);
        assert!(c.json);
        assert!(matches!(c.command, Command::Audit { .. }));
    }

    #[test]
    fn test_parse_search_defaults() {
        let c = cli(&["search", "dump.c", "sub_4010"]);
        match c.command {
            Command::Search { search_type, literal, pattern, .. } => {
                assert_eq!(search_type, "any");
                assert!(!literal);
                assert_eq!(pattern, "sub_4010");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_recommend_context_words() {
        let c = cli(&["recommend", "find", "buffer", "overflows"]);
        match c.command {
            Command::Recommend { context } => assert_eq!(context.join(" "), "find buffer overflows"),
            other => panic!("unexpected {:?}", other),
        }
    }

    // --- resolve_config TESTS ---

    #[test]
    fn test_config_defaults_without_file() {
        let dir = create_temp_dir("no_config");
        let cfg = resolve_config(None, &dir).unwrap();
        assert_eq!(cfg, RevscopeConfig::default());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_implicit_bad_config_falls_back() {
        let dir = create_temp_dir("bad_implicit");
        fs::write(dir.join("revscope.toml"), "[analysis]\nmax_chunk_size = 0\n").unwrap();
        let cfg = resolve_config(None, &dir).unwrap();
        assert_eq!(cfg, RevscopeConfig::default());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_explicit_bad_config_fails() {
        let dir = create_temp_dir("bad_explicit");
        let path = dir.join("custom.toml");
        fs::write(&path, "[analysis]\nchart_kind = \"pie\"\n").unwrap();
        assert!(resolve_config(Some(&path), &dir).is_err());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_run_audit_exit_code() {
        let dir = create_temp_dir("audit");
        let file = dir.join("dump.c");
        fs::write(&file, "void f(char *s) { char b[8]; strcpy(b, s); }\n").unwrap();
        let engine = Engine::new(RevscopeConfig::default()).unwrap();

        let c = cli(&["--json", "audit", file.to_str().unwrap()]);
        assert_eq!(run(&c, &engine).unwrap(), 1);

        fs::write(&file, "int add(int a, int b) { return a + b; }\n").unwrap();
        assert_eq!(run(&c, &engine).unwrap(), 0);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_run_missing_file_errors() {
        let engine = Engine::new(RevscopeConfig::default()).unwrap();
        let c = cli(&["chunk", "/definitely/not/here.c"]);
        assert!(run(&c, &engine).is_err());
    }
}
