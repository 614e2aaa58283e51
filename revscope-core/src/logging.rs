//! Structured logging for analysis runs using **tracing**.
//!
//! The core only emits events. Binaries install the JSON subscriber with
//! [`init_structured_logging`]; stdout stays reserved for tool output and
//! the LSP wire protocol.

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::RevscopeError;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "warn,revscope_core=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global JSON subscriber on stderr.
///
/// Returns `false` when a subscriber was already installed (a second call
/// is harmless).
///
/// # Environment Variables
/// - `RUST_LOG`: Controls log filtering (e.g., `RUST_LOG=revscope_core=debug`)
pub fn init_structured_logging() -> bool {
    tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_target(true)
        .with_current_span(true)
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// An engine operation finished.
pub fn log_operation(operation: &str, summary: &str) {
    info!(operation = %operation, summary = %summary, "operation complete");
}

/// An engine operation returned an error.
pub fn log_operation_failure(operation: &str, err: &RevscopeError) {
    warn!(operation = %operation, code = err.code(), error = %err, "operation failed");
}

/// A request never reached an operation (unknown name, undecodable params).
pub fn log_rejected_request(name: &str, err: &RevscopeError) {
    warn!(request = %name, code = err.code(), error = %err, "request rejected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_structured_logging();
        assert!(!init_structured_logging());
        log_operation("chunk", "3 chunk(s)");
        log_operation_failure("search", &RevscopeError::invalid_argument("bad regex"));
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(DEFAULT_FILTER.parse::<EnvFilter>().is_ok());
    }
}
