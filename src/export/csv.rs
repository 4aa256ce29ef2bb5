//! Flat CSV node table (RFC 4180).

use crate::graph::{Graph, Node};

use super::joined_uris;

const HEADER: [&str; 17] = [
    "ID",
    "Label",
    "Type",
    "Description",
    "Validity",
    "Region",
    "Importance",
    "Certainty",
    "Confidence Score",
    "PageRank",
    "Community",
    "Degree Centrality",
    "Betweenness Centrality",
    "Closeness Centrality",
    "Clustering Coefficient",
    "Vulnerability Score",
    "Sources URI",
];

/// Quote a field when it contains a separator, quote, or line break.
pub fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn row(node: &Node) -> Vec<String> {
    let metrics = node.metrics();
    vec![
        node.id.clone(),
        node.label.clone(),
        node.node_type.as_str().to_string(),
        node.description.clone().unwrap_or_default(),
        cell(node.validity.as_ref()),
        cell(node.region.as_ref().map(|r| &r.label)),
        cell(node.importance),
        node.certainty.as_str().to_string(),
        cell(node.confidence_score),
        cell(metrics.pagerank),
        cell(metrics.community),
        cell(metrics.degree_centrality),
        cell(metrics.betweenness),
        cell(metrics.closeness),
        cell(metrics.clustering),
        cell(metrics.network_health.as_ref().map(|h| h.vulnerability_score)),
        joined_uris(&node.sources),
    ]
}

/// One row per node, CRLF line endings, absent values as empty cells.
pub fn to_csv(graph: &Graph) -> String {
    let mut out = HEADER.join(",");
    out.push_str("\r\n");
    for node in &graph.nodes {
        let fields: Vec<String> = row(node).iter().map(|f| quote_field(f)).collect();
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SourceCitation;

    #[test]
    fn header_and_empty_metric_cells() {
        let mut graph = Graph::new();
        graph.nodes.push(Node::new("a", "Alpha"));
        let csv = to_csv(&graph);
        let lines: Vec<&str> = csv.split("\r\n").collect();
        assert!(lines[0].starts_with("ID,Label,Type,Description"));
        assert_eq!(lines[1], "a,Alpha,concept,,,,,confirmed,,,,,,,,,");
        assert_eq!(lines[1].split(',').count(), HEADER.len());
    }

    #[test]
    fn quotes_fields_with_separators() {
        let mut node = Node::new("a", "Dmowski, Roman").with_description("He said \"no\"");
        node.sources = vec![SourceCitation::new("x"), SourceCitation::new("y")];
        let mut graph = Graph::new();
        graph.nodes.push(node);
        let csv = to_csv(&graph);
        assert!(csv.contains("\"Dmowski, Roman\""));
        assert!(csv.contains("\"He said \"\"no\"\"\""));
        assert!(csv.contains(",x; y\r\n"));
    }

    #[test]
    fn plain_fields_are_not_quoted() {
        assert_eq!(quote_field("plain"), "plain");
        assert_eq!(quote_field("two\nlines"), "\"two\nlines\"");
    }
}
