//! Configuration loading from revscope.toml.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::advisor::AdvisorThresholds;
use crate::diagram::ChartKind;
use crate::error::{IoResultExt, RevscopeError, RevscopeResult};
use crate::score::{RiskOverrides, RiskTable};

/// File name looked up in the analysis root.
pub const CONFIG_FILE: &str = "revscope.toml";

/// Main configuration structure for revscope.toml.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevscopeConfig {
    /// Engine limits and defaults.
    pub analysis: AnalysisConfig,
    /// Advisor metric limits.
    pub thresholds: AdvisorThresholds,
    /// Risk rule overrides.
    pub risk: RiskOverrides,
}

/// `[analysis]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Chunk size in lines.
    pub max_chunk_size: usize,
    /// Diagram node cap.
    pub max_nodes: usize,
    /// Default chart kind: "flow", "hierarchy" or "mind_map".
    pub chart_kind: String,
    /// Matches returned by one search.
    pub max_search_results: usize,
    /// Operation history entries kept.
    pub history_capacity: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 600,
            max_nodes: 20,
            chart_kind: "flow".to_string(),
            max_search_results: 50,
            history_capacity: crate::history::DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl RevscopeConfig {
    /// Reject settings no operation could run with.
    pub fn validate(&self) -> RevscopeResult<()> {
        let a = &self.analysis;
        for (name, value) in [
            ("max_chunk_size", a.max_chunk_size),
            ("max_nodes", a.max_nodes),
            ("max_search_results", a.max_search_results),
            ("history_capacity", a.history_capacity),
        ] {
            if value == 0 {
                return Err(RevscopeError::invalid_argument(format!(
                    "analysis.{} must be at least 1",
                    name
                )));
            }
        }
        self.chart_kind()?;
        self.risk_table()?;
        Ok(())
    }

    /// Configured default chart kind.
    pub fn chart_kind(&self) -> RevscopeResult<ChartKind> {
        self.analysis.chart_kind.parse()
    }

    /// Built-in risk catalog with this config's overrides applied.
    pub fn risk_table(&self) -> RevscopeResult<RiskTable> {
        if self.risk.is_empty() {
            Ok(RiskTable::builtin())
        } else {
            RiskTable::with_overrides(&self.risk)
        }
    }
}

/// Loads configuration from revscope.toml in `root` if it exists.
pub fn load_config(root: &Path) -> RevscopeResult<Option<RevscopeConfig>> {
    let path = root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    load_config_file(&path).map(Some)
}

/// Loads and validates a specific config file.
pub fn load_config_file(path: &Path) -> RevscopeResult<RevscopeConfig> {
    let content = fs::read_to_string(path).with_path(path)?;
    let cfg: RevscopeConfig =
        toml::from_str(&content).map_err(|e| RevscopeError::config(path, e.to_string()))?;
    cfg.validate()
        .map_err(|e| RevscopeError::config(path, e.to_string()))?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}
