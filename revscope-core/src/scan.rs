//! Parallel, deterministic discovery and batch analysis of C sources.
//!
//! Performance notes:
//! - Early directory pruning via `WalkDir::filter_entry` (whole subtree skip)
//! - Parallel extension checks via Rayon's `par_bridge`
//! - One file per Rayon task during analysis; a failing file never stops
//!   the batch

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::builder::{FileAnalysis, Revscope};
use crate::error::RevscopeResult;
use crate::report::security_score;

/// Directories excluded by default (VCS metadata and build output).
const EXCLUDED_DIRS: &[&str] = &[".git", ".svn", "target", "build", "node_modules"];

/// Extensions treated as C sources.
const C_EXTENSIONS: &[&str] = &["c", "h"];

#[inline]
fn is_excluded_dir(entry: &walkdir::DirEntry, excludes: &HashSet<&str>) -> bool {
    entry.file_type().is_dir()
        && entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| excludes.contains(name))
}

fn is_c_source(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| C_EXTENSIONS.iter().any(|c| ext.eq_ignore_ascii_case(c)))
}

/// Gathers all `.c` / `.h` files below `root`, sorted by path.
///
/// Automatically skips `.git/`, `.svn/`, `target/`, `build/` and
/// `node_modules/`.
pub fn gather_c_files(root: &Path) -> Result<Vec<PathBuf>> {
    gather_c_files_with_excludes(root, &[])
}

/// Gathers C files with additional excluded directory names.
pub fn gather_c_files_with_excludes(root: &Path, excludes: &[&str]) -> Result<Vec<PathBuf>> {
    let all_excludes: HashSet<&str> = EXCLUDED_DIRS
        .iter()
        .copied()
        .chain(excludes.iter().copied())
        .collect();

    let mut files = WalkDir::new(root)
        .into_iter()
        // filter_entry prunes entire subtrees before they are walked
        .filter_entry(|e| !is_excluded_dir(e, &all_excludes))
        .par_bridge()
        .filter_map(|entry| match entry {
            Ok(e) => {
                let path = e.path();
                if e.file_type().is_file() && is_c_source(path) {
                    Some(Ok(path.to_path_buf()))
                } else {
                    None
                }
            }
            Err(e) => Some(Err(e.into())),
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Failed to gather C files from {}", root.display()))?;

    // par_bridge yields in arbitrary order
    files.sort();
    Ok(files)
}

/// Analyze every file in parallel. Results keep the order of `files`.
pub fn analyze_files_parallel(
    files: &[PathBuf],
    revscope: &Revscope,
) -> Vec<(PathBuf, RevscopeResult<FileAnalysis>)> {
    files
        .par_iter()
        .map(|path| {
            let result = revscope.analyze_path(path);
            if let Err(e) = &result {
                tracing::warn!(path = %path.display(), error = %e, "file analysis failed");
            }
            (path.clone(), result)
        })
        .collect()
}

/// One line of a batch summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub path: PathBuf,
    pub functions: usize,
    pub findings: usize,
    pub severe_findings: usize,
    pub cycles: usize,
    pub security_score: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Condense batch results for display.
pub fn summarize(results: &[(PathBuf, RevscopeResult<FileAnalysis>)]) -> Vec<FileSummary> {
    results
        .iter()
        .map(|(path, result)| match result {
            Ok(a) => FileSummary {
                path: path.clone(),
                functions: a.function_count(),
                findings: a.findings.len(),
                severe_findings: a.severe_findings(),
                cycles: a.graph.cycles.len(),
                security_score: security_score(&a.findings),
                error: None,
            },
            Err(e) => FileSummary {
                path: path.clone(),
                functions: 0,
                findings: 0,
                severe_findings: 0,
                cycles: 0,
                security_score: 0,
                error: Some(e.to_string()),
            },
        })
        .collect()
}
