//! Inspection helpers: Graphviz export and summary statistics.

use std::fmt::Write;

use serde::Serialize;

use crate::graph::{Depsgraph, Node, NodeData, NodeId};

/// Render the graph in Graphviz `dot` syntax.
///
/// Entities become clusters with one nested cluster per component.
/// Relations that close a cycle are drawn dashed red.
pub fn to_dot(graph: &Depsgraph) -> String {
    let mut out = String::new();
    out.push_str("digraph depsgraph {\n");
    out.push_str("  rankdir=LR;\n  compound=true;\n  node [shape=box, fontname=\"Helvetica\", fontsize=10];\n");

    for (id, node) in graph.nodes() {
        if matches!(node.data(), NodeData::Root(_) | NodeData::TimeSource(_)) && node.owner().is_none() {
            write_node(&mut out, "  ", id, node);
        }
    }

    for (entity, ident_id) in graph.entities() {
        let Some(ident) = graph.node(ident_id).and_then(Node::as_identifier) else {
            continue;
        };
        let _ = writeln!(out, "  subgraph cluster_{} {{", ident_id.index());
        let _ = writeln!(out, "    label=\"{}\";", escape(entity.as_str()));
        if let Some(ts) = ident.time_source().and_then(|ts| graph.node(ts).map(|n| (ts, n))) {
            write_node(&mut out, "    ", ts.0, ts.1);
        }
        for component_id in ident.components() {
            let (Some(component_node), Some(component)) = (graph.node(component_id), graph.component(component_id))
            else {
                continue;
            };
            let _ = writeln!(out, "    subgraph cluster_{} {{", component_id.index());
            let label = if component_node.subpath().is_empty() {
                component.kind().to_string()
            } else {
                format!("{}[{}]", component.kind(), component_node.subpath())
            };
            let _ = writeln!(out, "      label=\"{}\";", escape(&label));
            for &op in component.operations() {
                if let Some(node) = graph.node(op) {
                    write_node(&mut out, "      ", op, node);
                }
            }
            out.push_str("    }\n");
        }
        for &sub in graph.subgraphs() {
            if let Some(node) = graph.node(sub).filter(|n| n.owner() == Some(entity)) {
                write_node(&mut out, "    ", sub, node);
            }
        }
        out.push_str("  }\n");
    }

    for (_, rel) in graph.relations() {
        let style = if rel.is_cyclic() { ", style=dashed, color=red" } else { "" };
        let _ = writeln!(
            out,
            "  {} -> {} [label=\"{}\"{}];",
            rel.from(),
            rel.to(),
            escape(rel.label()),
            style
        );
    }
    out.push_str("}\n");
    out
}

fn write_node(out: &mut String, indent: &str, id: NodeId, node: &Node) {
    let attrs = match node.data() {
        NodeData::Root(_) => ", shape=doublecircle",
        NodeData::TimeSource(_) => ", shape=ellipse, style=filled, fillcolor=\"#fde9b8\"",
        NodeData::Operation(op) if op.is_synthetic() => ", style=dashed",
        NodeData::Subgraph(_) => ", shape=folder",
        _ => "",
    };
    let _ = writeln!(out, "{indent}{} [label=\"{}\"{}];", id, escape(node.name()), attrs);
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Size and shape of a built graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub entities: usize,
    pub components: usize,
    pub operations: usize,
    /// Entry/exit barriers and pass-throughs added during the build.
    pub synthetic_operations: usize,
    pub operations_with_callback: usize,
    pub relations: usize,
    pub cyclic_relations: usize,
    pub time_sources: usize,
    pub subgraphs: usize,
    /// Operations on the longest dependency chain.
    pub depth: usize,
    pub diagnostics: usize,
}

impl GraphStats {
    pub fn collect(graph: &Depsgraph) -> Self {
        let mut stats = Self {
            entities: graph.entities().count(),
            relations: graph.relation_count(),
            cyclic_relations: graph.relations().filter(|(_, r)| r.is_cyclic()).count(),
            subgraphs: graph.subgraphs().len(),
            depth: longest_chain(graph),
            diagnostics: graph.diagnostics().len(),
            ..Self::default()
        };
        for (_, node) in graph.nodes() {
            match node.data() {
                NodeData::Component(_) => stats.components += 1,
                NodeData::TimeSource(_) => stats.time_sources += 1,
                NodeData::Operation(op) => {
                    stats.operations += 1;
                    stats.synthetic_operations += usize::from(op.is_synthetic());
                    stats.operations_with_callback += usize::from(op.has_callback());
                }
                _ => {}
            }
        }
        stats
    }
}

/// Length of the longest chain of operations over non-cyclic relations.
fn longest_chain(graph: &Depsgraph) -> usize {
    let mut depth: Vec<Option<usize>> = vec![None; graph.node_count()];
    let mut best = 0;
    for &root in graph.operations() {
        let mut stack = vec![(root, false)];
        while let Some((node, expanded)) = stack.pop() {
            let successors: Vec<NodeId> = graph
                .successors(node)
                .into_iter()
                .filter(|&s| graph.node(s).is_some_and(Node::is_operation))
                .collect();
            if expanded {
                let below = successors.iter().filter_map(|s| depth[s.index()]).max().unwrap_or(0);
                depth[node.index()] = Some(below + 1);
                continue;
            }
            if depth[node.index()].is_some() {
                continue;
            }
            // Provisional value so a cycle left unmarked cannot recurse forever.
            depth[node.index()] = Some(0);
            stack.push((node, true));
            stack.extend(
                successors
                    .into_iter()
                    .filter(|s| depth[s.index()].is_none())
                    .map(|s| (s, false)),
            );
        }
        best = best.max(depth[root.index()].unwrap_or(0));
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{NoopBinder, build};
    use crate::scene::{Entity, EntityKind, ParentLink, Scene};

    fn scene() -> Scene {
        let mut child = Entity::new("Child \"1\"", EntityKind::Mesh);
        child.parent = Some(ParentLink {
            entity: "Parent".into(),
            ..Default::default()
        });
        Scene::new("Scene")
            .with_entity(Entity::new("Parent", EntityKind::Empty))
            .with_entity(child)
    }

    #[test]
    fn test_dot_output() {
        let graph = build(&scene(), &NoopBinder);
        let dot = to_dot(&graph);

        assert!(dot.starts_with("digraph depsgraph {"));
        assert!(dot.trim_end().ends_with('}'));
        assert!(dot.contains("label=\"Child \\\"1\\\"\""));
        assert!(dot.contains("label=\"Transform\""));
        let edges = dot.lines().filter(|line| line.contains(" -> node_")).count();
        assert_eq!(edges, graph.relation_count());
    }

    #[test]
    fn test_stats() {
        let graph = build(&scene(), &NoopBinder);
        let stats = GraphStats::collect(&graph);

        assert_eq!(stats.entities, 3);
        assert_eq!(stats.operations, graph.operations().len());
        assert!(stats.synthetic_operations > 0);
        assert_eq!(stats.operations_with_callback, 0);
        assert_eq!(stats.cyclic_relations, 0);
        assert_eq!(stats.time_sources, 1);
        // Parent transform, then child transform, then child geometry.
        assert!(stats.depth >= 6);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["relations"], graph.relation_count());
    }
}
