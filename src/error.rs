//! Rich diagnostic error types for the histograph engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.
//!
//! Recoverable conditions (dropped patch entries, conflicts, failed individual
//! metrics, timeouts) are not represented here: they travel as values in the
//! reconcile report and the enrichment outcome.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the histograph engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source spans) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum HistoError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Export(#[from] ExportError),
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("node not found: {id}")]
    #[diagnostic(
        code(histo::graph::node_not_found),
        help(
            "No node with this id exists in the current graph. \
             List node ids with `histograph export --format json` or check for typos."
        )
    )]
    NodeNotFound { id: String },

    #[error("cannot merge node {id} into itself")]
    #[diagnostic(
        code(histo::graph::self_merge),
        help("Pick two different node ids: the node to keep and the node to absorb.")
    )]
    SelfMerge { id: String },
}

// ---------------------------------------------------------------------------
// Patch errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PatchError {
    #[error("patch document is not valid JSON: {message}")]
    #[diagnostic(
        code(histo::patch::parse),
        help(
            "The patch must be a JSON object with `nodes` and `edges` arrays \
             (or a bare array of node entries). Individual malformed entries are \
             skipped, but the document itself has to parse."
        )
    )]
    Parse { message: String },

    #[error("patch document has unexpected shape: expected {expected}")]
    #[diagnostic(
        code(histo::patch::shape),
        help("Wrap node entries in `{{\"nodes\": [...], \"edges\": [...]}}`.")
    )]
    Shape { expected: String },

    #[error("invalid conflict resolution: {input}")]
    #[diagnostic(
        code(histo::patch::resolution),
        help("Resolutions take the form `<entity id>-<field>=existing` or `=proposed`.")
    )]
    InvalidResolution { input: String },
}

// ---------------------------------------------------------------------------
// Metrics errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum MetricsError {
    #[error("metrics computation was cancelled")]
    #[diagnostic(
        code(histo::metrics::cancelled),
        help("A newer mutation superseded this recomputation. Its result is discarded.")
    )]
    Cancelled,

    #[error("metric {metric} produced a non-finite value")]
    #[diagnostic(
        code(histo::metrics::non_finite),
        help("The metric fell back to its default. Check for degenerate edge data.")
    )]
    NonFinite { metric: &'static str },

    #[error("metric {metric} failed: {message}")]
    #[diagnostic(
        code(histo::metrics::failed),
        help("The metric fell back to its default; sibling metrics were unaffected.")
    )]
    Failed {
        metric: &'static str,
        message: String,
    },

    #[error("metrics recomputation timed out after {seconds}s")]
    #[diagnostic(
        code(histo::metrics::timeout),
        help(
            "The graph stays usable with stale or absent metrics. \
             Raise `metrics_timeout_secs` or lower `exact_betweenness_limit` \
             for large graphs."
        )
    )]
    Timeout { seconds: u64 },

    #[error("metrics worker crashed: {message}")]
    #[diagnostic(
        code(histo::metrics::crashed),
        help("The worker is restarted on the next recomputation, up to the configured limit.")
    )]
    WorkerCrashed { message: String },

    #[error("metrics unavailable after {failures} consecutive failures")]
    #[diagnostic(
        code(histo::metrics::unavailable),
        help(
            "The metrics supervisor stopped retrying. Call `Engine::reset_metrics()` \
             (or restart the CLI) once the cause is fixed."
        )
    )]
    Unavailable { failures: usize },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(histo::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(histo::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             This may indicate corruption; try running with a fresh data directory."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(histo::store::serde),
        help(
            "Failed to serialize or deserialize the graph document. \
             Stored documents from other schema versions are reseeded automatically."
        )
    )]
    Serialization { message: String },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(histo::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(histo::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(histo::config::invalid),
        help("Check the EngineConfig fields. {message}")
    )]
    Invalid { message: String },

    #[error("failed to read seed file {path}: {message}")]
    #[diagnostic(
        code(histo::config::seed),
        help("`seed_path` must point at a JSON graph patch.")
    )]
    Seed { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ExportError {
    #[error("failed to write export: {path}")]
    #[diagnostic(
        code(histo::export::write),
        help("Ensure the output directory exists and you have write permissions.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode export: {message}")]
    #[diagnostic(code(histo::export::encode))]
    Encode { message: String },
}

/// Convenience alias for functions returning histograph results.
pub type HistoResult<T> = std::result::Result<T, HistoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_converts_to_histo_error() {
        let err = GraphError::NodeNotFound { id: "x".into() };
        let histo: HistoError = err.into();
        assert!(matches!(
            histo,
            HistoError::Graph(GraphError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn metrics_error_converts_to_histo_error() {
        let histo: HistoError = MetricsError::Timeout { seconds: 15 }.into();
        assert!(matches!(
            histo,
            HistoError::Metrics(MetricsError::Timeout { seconds: 15 })
        ));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = MetricsError::Unavailable { failures: 3 };
        let msg = format!("{err}");
        assert!(msg.contains('3'));

        let err = GraphError::SelfMerge { id: "dmowski".into() };
        assert!(format!("{err}").contains("dmowski"));
    }
}
