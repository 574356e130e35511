//! Graph export for visualization tools
//!
//! - Node-link JSON (the layout graph libraries read and write)
//! - GraphML

use crate::citation::{GraphNode, GraphView, Origin};
use citegraph_common::errors::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct NodeLinkGraph<'a> {
    directed: bool,
    multigraph: bool,
    nodes: Vec<NodeAttributes<'a>>,
    links: Vec<Link>,
}

#[derive(Serialize)]
struct NodeAttributes<'a> {
    id: String,
    paper_title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    year: Option<i32>,
    authors: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    venue: Option<&'a str>,
    depth: u32,
    seed: bool,
    identifiers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cited_by_count: Option<u64>,
}

impl<'a> From<&'a GraphNode> for NodeAttributes<'a> {
    fn from(node: &'a GraphNode) -> Self {
        Self {
            id: node.canonical_id().to_string(),
            paper_title: &node.record.title,
            year: node.record.year,
            authors: node.record.authors.join("; "),
            venue: node.record.venue.as_deref(),
            depth: node.depth,
            seed: node.origin == Origin::Seed,
            identifiers: node.identifiers.iter().map(|id| id.to_string()).collect(),
            cited_by_count: node.record.cited_by_count,
        }
    }
}

#[derive(Serialize)]
struct Link {
    source: String,
    target: String,
}

/// Write the graph as node-link JSON; links point from citing to cited
pub fn write_node_link_json<W: Write>(graph: &impl GraphView, writer: W) -> Result<()> {
    let document = NodeLinkGraph {
        directed: true,
        multigraph: false,
        nodes: graph.nodes().into_iter().map(NodeAttributes::from).collect(),
        links: graph
            .edges()
            .into_iter()
            .map(|(citing, cited)| Link {
                source: citing.to_string(),
                target: cited.to_string(),
            })
            .collect(),
    };
    serde_json::to_writer_pretty(writer, &document)?;
    Ok(())
}

/// Write the graph as GraphML
pub fn write_graphml<W: Write>(graph: &impl GraphView, mut writer: W) -> Result<()> {
    writeln!(writer, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(writer, r#"<graphml xmlns="http://graphml.graphdrawing.org/xmlns">"#)?;
    for (key, kind) in [
        ("paper_title", "string"),
        ("year", "int"),
        ("authors", "string"),
        ("venue", "string"),
        ("depth", "int"),
        ("seed", "boolean"),
    ] {
        writeln!(
            writer,
            r#"  <key id="{key}" for="node" attr.name="{key}" attr.type="{kind}"/>"#
        )?;
    }
    writeln!(writer, r#"  <graph id="citations" edgedefault="directed">"#)?;

    for node in graph.nodes() {
        let attrs = NodeAttributes::from(node);
        writeln!(writer, r#"    <node id="{}">"#, escape(&attrs.id))?;
        write_data(&mut writer, "paper_title", attrs.paper_title)?;
        if let Some(year) = attrs.year {
            write_data(&mut writer, "year", &year.to_string())?;
        }
        if !attrs.authors.is_empty() {
            write_data(&mut writer, "authors", &attrs.authors)?;
        }
        if let Some(venue) = attrs.venue {
            write_data(&mut writer, "venue", venue)?;
        }
        write_data(&mut writer, "depth", &attrs.depth.to_string())?;
        write_data(&mut writer, "seed", if attrs.seed { "true" } else { "false" })?;
        writeln!(writer, "    </node>")?;
    }

    for (citing, cited) in graph.edges() {
        writeln!(
            writer,
            r#"    <edge source="{}" target="{}"/>"#,
            escape(&citing.to_string()),
            escape(&cited.to_string())
        )?;
    }

    writeln!(writer, "  </graph>")?;
    writeln!(writer, "</graphml>")?;
    Ok(())
}

fn write_data<W: Write>(writer: &mut W, key: &str, value: &str) -> std::io::Result<()> {
    writeln!(writer, r#"      <data key="{}">{}</data>"#, key, escape(value))
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::CitationGraph;
    use citegraph_common::record::{Identifier, PublicationRecord};

    fn sample() -> CitationGraph {
        let mut graph = CitationGraph::new();
        let record = |id: &str, title: &str| PublicationRecord {
            identifiers: Identifier::parse(id).into_iter().collect(),
            title: title.to_string(),
            authors: vec!["Doe, J.".into()],
            year: Some(2021),
            venue: None,
            url: None,
            references: None,
            cited_by: None,
            cited_by_count: None,
        };
        let a = graph.insert_node(record("10.1234/a", "Rust & <graphs>"), 0, Origin::Seed);
        let b = graph.insert_node(record("W2", "Cited work"), 1, Origin::Discovered);
        graph.add_edge(a, b);
        graph
    }

    #[test]
    fn test_node_link_json() {
        let mut out = Vec::new();
        write_node_link_json(&sample(), &mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(json["directed"], true);
        assert_eq!(json["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(json["nodes"][0]["paper_title"], "Rust & <graphs>");
        assert_eq!(json["nodes"][0]["seed"], true);
        assert_eq!(json["links"][0]["source"], "doi:10.1234/a");
        assert_eq!(json["links"][0]["target"], "W2");
    }

    #[test]
    fn test_graphml_escapes() {
        let mut out = Vec::new();
        write_graphml(&sample(), &mut out).unwrap();
        let xml = String::from_utf8(out).unwrap();

        assert!(xml.contains("Rust &amp; &lt;graphs&gt;"));
        assert!(xml.contains(r#"<edge source="doi:10.1234/a" target="W2"/>"#));
        assert_eq!(xml.matches("<node ").count(), 2);
    }
}
