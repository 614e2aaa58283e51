//! Mermaid and Graphviz DOT text for diagram specs.
//!
//! Both emitters write into a pre-sized `String` through `std::fmt::Write`.
//! Formatting into a `String` cannot fail in practice; if it ever does, the
//! emitter logs and returns a minimal valid diagram instead of panicking.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::diagram::{ChartKind, DiagramSpec};

const EXTERNAL_ID: &str = "external_calls";

/// Mermaid source for `spec`.
///
/// - flow → `flowchart TD`
/// - hierarchy → `graph LR`
/// - mind map → `mindmap`, nodes grouped by module group
pub fn to_mermaid(spec: &DiagramSpec) -> String {
    let mut out = String::with_capacity(64 + spec.nodes.len() * 48 + spec.edges.len() * 32);
    let result = match spec.kind {
        ChartKind::Flow => write_mermaid_graph(&mut out, spec, "flowchart TD"),
        ChartKind::Hierarchy => write_mermaid_graph(&mut out, spec, "graph LR"),
        ChartKind::MindMap => write_mermaid_mindmap(&mut out, spec),
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "failed to generate mermaid text");
        return "flowchart TD\n".to_string();
    }
    out
}

fn write_mermaid_graph(out: &mut String, spec: &DiagramSpec, header: &str) -> std::fmt::Result {
    writeln!(out, "{}", header)?;
    for node in &spec.nodes {
        writeln!(out, "    {}[\"{}\"]", node.id, escape_label(&node.label))?;
    }
    for edge in &spec.edges {
        if edge.count > 1 {
            writeln!(out, "    {} -->|{}| {}", edge.from, edge.count, edge.to)?;
        } else {
            writeln!(out, "    {} --> {}", edge.from, edge.to)?;
        }
    }

    if !spec.external.is_empty() {
        writeln!(
            out,
            "    {}((\"{} more\"))",
            EXTERNAL_ID,
            spec.external.dropped.len()
        )?;
        let ids = label_ids(spec);
        for (label, count) in &spec.external.outbound {
            if let Some(id) = ids.get(label.as_str()) {
                writeln!(out, "    {} -.->|{}| {}", id, count, EXTERNAL_ID)?;
            }
        }
        for (label, count) in &spec.external.inbound {
            if let Some(id) = ids.get(label.as_str()) {
                writeln!(out, "    {} -.->|{}| {}", EXTERNAL_ID, count, id)?;
            }
        }
    }

    for node in &spec.nodes {
        writeln!(out, "    class {} {}", node.id, node.group)?;
    }
    Ok(())
}

fn write_mermaid_mindmap(out: &mut String, spec: &DiagramSpec) -> std::fmt::Result {
    writeln!(out, "mindmap")?;
    writeln!(out, "  root((call structure))")?;
    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for node in &spec.nodes {
        groups.entry(node.group.as_str()).or_default().push(node.label.as_str());
    }
    for (group, labels) in groups {
        writeln!(out, "    {}", group)?;
        for label in labels {
            writeln!(out, "      {}", escape_label(label))?;
        }
    }
    if !spec.external.is_empty() {
        writeln!(out, "    {} more", spec.external.dropped.len())?;
    }
    Ok(())
}

/// Graphviz DOT source for `spec`.
pub fn to_dot(spec: &DiagramSpec) -> String {
    let mut dot = String::with_capacity(150 + spec.nodes.len() * 80 + spec.edges.len() * 40);
    if let Err(e) = write_dot(&mut dot, spec) {
        tracing::error!(error = %e, "failed to generate DOT text");
        return "digraph revscope {\n}\n".to_string();
    }
    dot
}

fn write_dot(dot: &mut String, spec: &DiagramSpec) -> std::fmt::Result {
    writeln!(dot, "digraph revscope {{")?;
    let rankdir = match spec.kind {
        ChartKind::Hierarchy => "LR",
        _ => "TB",
    };
    writeln!(dot, "  rankdir={};", rankdir)?;
    if spec.kind == ChartKind::MindMap {
        writeln!(dot, "  layout=twopi;")?;
    }
    writeln!(dot, "  node [shape=box, style=filled, fontname=\"JetBrains Mono\"];")?;
    writeln!(dot)?;

    for node in &spec.nodes {
        writeln!(
            dot,
            "  {} [label=\"{}\", fillcolor={}];",
            node.id,
            escape_label(&node.label),
            group_color(&node.group)
        )?;
    }
    if !spec.external.is_empty() {
        writeln!(
            dot,
            "  {} [label=\"{} more\", shape=ellipse, fillcolor=lightgrey];",
            EXTERNAL_ID,
            spec.external.dropped.len()
        )?;
    }
    writeln!(dot)?;

    for edge in &spec.edges {
        writeln!(dot, "  {} -> {} [label=\"{}\"];", edge.from, edge.to, edge.count)?;
    }
    let ids = label_ids(spec);
    for (label, count) in &spec.external.outbound {
        if let Some(id) = ids.get(label.as_str()) {
            writeln!(dot, "  {} -> {} [style=dashed, label=\"{}\"];", id, EXTERNAL_ID, count)?;
        }
    }
    for (label, count) in &spec.external.inbound {
        if let Some(id) = ids.get(label.as_str()) {
            writeln!(dot, "  {} -> {} [style=dashed, label=\"{}\"];", EXTERNAL_ID, id, count)?;
        }
    }

    writeln!(dot, "}}")?;
    Ok(())
}

fn label_ids(spec: &DiagramSpec) -> BTreeMap<&str, &str> {
    spec.nodes
        .iter()
        .map(|n| (n.label.as_str(), n.id.as_str()))
        .collect()
}

fn group_color(group: &str) -> &'static str {
    match group {
        "modbus" => "lightblue",
        "network" => "lightsalmon",
        "serial" => "khaki",
        "lifecycle" => "palegreen",
        "data_access" => "plum",
        "external" => "lightgrey",
        _ => "white",
    }
}

fn escape_label(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}
