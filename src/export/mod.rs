//! Boundary formats: the canonical JSON document, GEXF for Gephi, and a
//! flat CSV node table.

pub mod csv;
pub mod gexf;

use std::path::Path;

use crate::error::ExportError;
use crate::graph::{Graph, SourceCitation};

/// Result type for export operations.
pub type ExportResult<T> = std::result::Result<T, ExportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Gexf,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Gexf => "gexf",
            ExportFormat::Csv => "csv",
        }
    }
}

/// Render `graph` in `format`.
pub fn render(graph: &Graph, format: ExportFormat) -> ExportResult<String> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(graph).map_err(|e| ExportError::Encode {
            message: e.to_string(),
        }),
        ExportFormat::Gexf => Ok(gexf::to_gexf(graph)),
        ExportFormat::Csv => Ok(csv::to_csv(graph)),
    }
}

/// Render and write to `path`.
pub fn write_file(graph: &Graph, format: ExportFormat, path: &Path) -> ExportResult<()> {
    let content = render(graph, format)?;
    std::fs::write(path, content).map_err(|e| ExportError::Write {
        path: path.display().to_string(),
        source: e,
    })
}

/// Non-empty source URIs joined with `"; "`.
pub(crate) fn joined_uris(sources: &[SourceCitation]) -> String {
    sources
        .iter()
        .map(|s| s.uri.as_str())
        .filter(|uri| !uri.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;

    #[test]
    fn json_export_is_the_canonical_document() {
        let mut graph = Graph::new();
        graph.nodes.push(Node::new("a", "Alpha"));
        let json = render(&graph, ExportFormat::Json).unwrap();
        let parsed: Graph = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, graph);
    }

    #[test]
    fn write_file_reports_bad_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.csv");
        assert!(matches!(
            write_file(&Graph::new(), ExportFormat::Csv, &path),
            Err(ExportError::Write { .. })
        ));
    }

    #[test]
    fn uris_skip_empty_entries() {
        let sources = vec![
            SourceCitation::new("https://a.example"),
            SourceCitation::new(""),
            SourceCitation::new("isbn:123"),
        ];
        assert_eq!(joined_uris(&sources), "https://a.example; isbn:123");
    }
}
