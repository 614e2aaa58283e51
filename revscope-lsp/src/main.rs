//! revscope LSP Server - live risk diagnostics for decompiled C.
//!
//! Provides IDE integration with:
//! - Security findings as diagnostics on open, change and save
//! - Warnings on functions cut off by truncated decompiler output
//! - Hints on functions that take part in recursion cycles
//!
//! Analysis runs on the in-memory buffer; nothing is read from disk except
//! the workspace `revscope.toml`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result as LspResult;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};

use revscope_core::{load_config, FileAnalysis, Revscope, Severity, SourceFile, Span};

const SOURCE: &str = "revscope";

/// revscope Language Server state.
struct RevscopeLsp {
    client: Client,
    /// Pipeline configured from the workspace `revscope.toml`.
    revscope: Arc<RwLock<Revscope>>,
    /// Latest full text per open document.
    documents: Arc<RwLock<HashMap<Url, String>>>,
}

fn is_c_document(uri: &Url) -> bool {
    let path = uri.path();
    path.ends_with(".c") || path.ends_with(".h")
}

fn lsp_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Critical | Severity::High => DiagnosticSeverity::ERROR,
        Severity::Medium => DiagnosticSeverity::WARNING,
        Severity::Low => DiagnosticSeverity::INFORMATION,
    }
}

/// LSP position (UTF-16 columns) of a byte offset.
fn position(file: &SourceFile, offset: usize) -> Position {
    let line = file.lines().line_of(offset);
    let start = file.lines().line_range(line).start;
    let character = file
        .text()
        .get(start..offset)
        .map_or(0, |prefix| prefix.encode_utf16().count());
    Position {
        line: line.saturating_sub(1) as u32,
        character: character as u32,
    }
}

fn range(file: &SourceFile, span: &Span) -> Range {
    Range {
        start: position(file, span.start),
        end: position(file, span.end),
    }
}

fn diagnostic(range: Range, severity: DiagnosticSeverity, code: &str, message: String) -> Diagnostic {
    Diagnostic {
        range,
        severity: Some(severity),
        code: Some(NumberOrString::String(code.to_string())),
        source: Some(SOURCE.to_string()),
        message,
        ..Default::default()
    }
}

/// Diagnostics for one analyzed buffer.
fn diagnostics_for(file: &SourceFile, analysis: &FileAnalysis) -> Vec<Diagnostic> {
    let mut out: Vec<Diagnostic> = analysis
        .findings
        .iter()
        .map(|f| {
            let mut d = diagnostic(
                range(file, &f.span),
                lsp_severity(f.severity),
                &f.pattern_id,
                format!("{} ({}): {} {}", f.matched, f.severity, f.rationale, f.remedy),
            );
            d.data = serde_json::to_value(f).ok();
            d
        })
        .collect();

    for r in analysis.functions() {
        let header = Span::new(r.span.start, r.span.start, r.header_line(), r.header_line());
        if r.incomplete {
            out.push(diagnostic(
                range(file, &header),
                DiagnosticSeverity::WARNING,
                "incomplete-function",
                format!("`{}` has no closing brace; the input looks truncated", r.name),
            ));
        }
        if let Some(cycle) = analysis.graph.cycles.iter().find(|c| c.members.contains(&r.name)) {
            out.push(diagnostic(
                range(file, &header),
                DiagnosticSeverity::HINT,
                "recursion-cycle",
                format!("`{}` is part of the cycle {}", r.name, cycle.members.join(" ↔ ")),
            ));
        }
    }

    out
}

fn compute_diagnostics(revscope: &Revscope, name: &str, text: String) -> Result<Vec<Diagnostic>> {
    let file = SourceFile::from_text(name, text);
    let analysis = revscope.analyze_file(&file)?;
    Ok(diagnostics_for(&file, &analysis))
}

impl RevscopeLsp {
    fn new(client: Client) -> Self {
        Self {
            client,
            revscope: Arc::new(RwLock::new(Revscope::new())),
            documents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn configure(&self, root: &Path) {
        match load_config(root).and_then(|cfg| match cfg {
            Some(cfg) => Revscope::from_config(&cfg).map(Some),
            None => Ok(None),
        }) {
            Ok(Some(revscope)) => {
                *self.revscope.write().await = revscope;
                self.log_info(&format!("Loaded config from {}", root.display())).await;
            }
            Ok(None) => {}
            Err(e) => self.log_error(&format!("Config ignored: {}", e)).await,
        }
    }

    /// Analyze the stored buffer for `uri` and publish diagnostics.
    async fn run_analysis(&self, uri: Url, version: Option<i32>) {
        let Some(text) = self.documents.read().await.get(&uri).cloned() else {
            return;
        };
        let revscope = self.revscope.read().await.clone();
        let name = uri.path().rsplit('/').next().unwrap_or_default().to_string();

        // Lexing a multi-megabyte dump is CPU-bound
        let result = tokio::task::spawn_blocking(move || compute_diagnostics(&revscope, &name, text)).await;

        match result {
            Ok(Ok(diagnostics)) => {
                self.log_info(&format!("{}: {} diagnostic(s)", uri.path(), diagnostics.len()))
                    .await;
                self.client.publish_diagnostics(uri, diagnostics, version).await;
            }
            Ok(Err(e)) => self.log_error(&format!("Analysis failed: {}", e)).await,
            Err(e) => self.log_error(&format!("Analysis task failed: {}", e)).await,
        }
    }

    async fn log_info(&self, message: &str) {
        self.client.log_message(MessageType::INFO, message).await;
    }

    async fn log_error(&self, message: &str) {
        self.client.log_message(MessageType::ERROR, message).await;
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for RevscopeLsp {
    async fn initialize(&self, params: InitializeParams) -> LspResult<InitializeResult> {
        if let Some(root) = params.root_uri.and_then(|u| u.to_file_path().ok()) {
            self.configure(&root).await;
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(true),
                        })),
                        ..Default::default()
                    },
                )),
                ..ServerCapabilities::default()
            },
            server_info: Some(ServerInfo {
                name: "revscope-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.log_info("revscope LSP server initialized").await;
    }

    async fn shutdown(&self) -> LspResult<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        if !is_c_document(&doc.uri) {
            return;
        }
        self.documents.write().await.insert(doc.uri.clone(), doc.text);
        self.run_analysis(doc.uri, Some(doc.version)).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        if !is_c_document(&uri) {
            return;
        }
        // FULL sync: the last change carries the whole document
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };
        self.documents.write().await.insert(uri.clone(), change.text);
        self.run_analysis(uri, Some(params.text_document.version)).await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        if !is_c_document(&uri) {
            return;
        }
        if let Some(text) = params.text {
            self.documents.write().await.insert(uri.clone(), text);
        }
        self.run_analysis(uri, None).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.write().await.remove(&uri);
        self.client.publish_diagnostics(uri, vec![], None).await;
    }
}

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("[PANIC] revscope-lsp internal error: {}", info);
    }));

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(RevscopeLsp::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
