//! Dependency cycle detection.

use std::collections::VecDeque;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::diagnostics::DiagnosticKind;
use crate::graph::{Depsgraph, NodeId, RelationId};

/// Every dependency cycle among operations, one closed path per strongly
/// connected component. Relations already marked cyclic still count.
pub fn find_cycles(graph: &Depsgraph) -> Vec<Vec<NodeId>> {
    let mut pg: DiGraph<NodeId, ()> = DiGraph::new();
    let mut index: FxHashMap<NodeId, NodeIndex> = FxHashMap::default();
    for &op in graph.operations() {
        index.insert(op, pg.add_node(op));
    }
    for (_, rel) in graph.relations() {
        if let (Some(&from), Some(&to)) = (index.get(&rel.from()), index.get(&rel.to())) {
            pg.add_edge(from, to, ());
        }
    }

    let mut cycles: Vec<Vec<NodeId>> = tarjan_scc(&pg)
        .into_iter()
        .filter(|scc| scc.len() > 1 || pg.contains_edge(scc[0], scc[0]))
        .filter_map(|scc| {
            let members: FxHashSet<NodeId> = scc.iter().map(|&i| pg[i]).collect();
            let start = members.iter().copied().min_by_key(NodeId::index)?;
            closed_path(graph, start, &members)
        })
        .collect();
    cycles.sort_by_key(|cycle| cycle[0].index());
    cycles
}

/// Shortest path `start -> ... -> last` with `last -> start`, staying inside `members`.
fn closed_path(graph: &Depsgraph, start: NodeId, members: &FxHashSet<NodeId>) -> Option<Vec<NodeId>> {
    let mut parent: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        for &rel in graph.node(node)?.outlinks() {
            let Some(next) = graph.relation(rel).map(|r| r.to()) else {
                continue;
            };
            if next == start {
                let mut path = vec![node];
                let mut current = node;
                while let Some(&p) = parent.get(&current) {
                    path.push(p);
                    current = p;
                }
                path.reverse();
                return Some(path);
            }
            if members.contains(&next) && next != start && !parent.contains_key(&next) {
                parent.insert(next, node);
                queue.push_back(next);
            }
        }
    }
    None
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

/// Mark every relation that closes a cycle among operations as cyclic.
///
/// Depth-first search from each operation in insertion order; a relation
/// into an operation still on the stack is a back edge. Marked relations are
/// skipped by later searches, so calling this again marks nothing new.
/// Returns the number of relations marked.
pub fn detect_cycles(graph: &mut Depsgraph) -> usize {
    let mut color = vec![Color::White; graph.node_count()];
    let mut back_edges: Vec<(RelationId, Vec<NodeId>)> = Vec::new();

    for &root in graph.operations() {
        if color[root.index()] != Color::White {
            continue;
        }
        // (node, next outlink to look at)
        let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
        color[root.index()] = Color::Grey;

        while let Some(top) = stack.last_mut() {
            let (node, cursor) = *top;
            top.1 += 1;
            let Some(&rel_id) = graph.node(node).and_then(|n| n.outlinks().get(cursor)) else {
                color[node.index()] = Color::Black;
                stack.pop();
                continue;
            };

            let Some(rel) = graph.relation(rel_id) else {
                continue;
            };
            let next = rel.to();
            if rel.is_cyclic() || !graph.node(next).is_some_and(|n| n.is_operation()) {
                continue;
            }
            match color[next.index()] {
                Color::White => {
                    color[next.index()] = Color::Grey;
                    stack.push((next, 0));
                }
                Color::Grey => {
                    let from = stack.iter().position(|&(n, _)| n == next).unwrap_or(0);
                    let path = stack[from..].iter().map(|&(n, _)| n).collect();
                    back_edges.push((rel_id, path));
                }
                Color::Black => {}
            }
        }
    }

    for (rel_id, path) in &back_edges {
        let label = graph.relation(*rel_id).map(|r| r.label().to_string()).unwrap_or_default();
        graph.diagnostics().report(
            DiagnosticKind::Cycle,
            format!(
                "dependency cycle {}; relation '{}' ignored during evaluation",
                graph.describe_path(path),
                label
            ),
        );
        if let Some(rel) = graph.relation_mut(*rel_id) {
            rel.cyclic = true;
        }
    }
    back_edges.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ComponentKind, EntityId, OperationCode, OperationRole, RelationKind};

    fn chain(names: &[&str]) -> (Depsgraph, Vec<NodeId>) {
        let mut graph = Depsgraph::new();
        let component = graph.ensure_component(&EntityId::new("Cube"), ComponentKind::Parameters, "");
        let ops = names
            .iter()
            .map(|name| {
                graph
                    .ensure_operation(component, OperationCode::Generic, name, OperationRole::Exec)
                    .unwrap()
                    .0
            })
            .collect();
        (graph, ops)
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let (mut graph, ops) = chain(&["a", "b", "c"]);
        graph.add_relation(ops[0], ops[1], RelationKind::Operation, "");
        graph.add_relation(ops[1], ops[2], RelationKind::Operation, "");
        graph.add_relation(ops[0], ops[2], RelationKind::Operation, "");

        assert!(find_cycles(&graph).is_empty());
        assert_eq!(detect_cycles(&mut graph), 0);
        assert!(graph.diagnostics().is_empty());
    }

    #[test]
    fn test_back_edge_is_marked() {
        let (mut graph, ops) = chain(&["a", "b", "c"]);
        let ab = graph.add_relation(ops[0], ops[1], RelationKind::Operation, "a -> b").unwrap();
        let bc = graph.add_relation(ops[1], ops[2], RelationKind::Operation, "b -> c").unwrap();
        let ca = graph.add_relation(ops[2], ops[0], RelationKind::Operation, "c -> a").unwrap();

        assert_eq!(find_cycles(&graph), vec![ops.clone()]);
        assert_eq!(detect_cycles(&mut graph), 1);
        assert!(graph.relation(ca).unwrap().is_cyclic());
        assert!(!graph.relation(ab).unwrap().is_cyclic());
        assert!(!graph.relation(bc).unwrap().is_cyclic());
        assert_eq!(graph.diagnostics().count(DiagnosticKind::Cycle), 1);

        // Marked relations are no longer followed.
        assert!(graph.successors(ops[2]).is_empty());
        assert_eq!(detect_cycles(&mut graph), 0);
        // Still reported as a cycle for explicit checks.
        assert!(graph.check_acyclic().is_err());
    }

    #[test]
    fn test_self_loop() {
        let (mut graph, ops) = chain(&["a"]);
        graph.add_relation(ops[0], ops[0], RelationKind::Operation, "a -> a");
        assert_eq!(find_cycles(&graph), vec![vec![ops[0]]]);
        assert_eq!(detect_cycles(&mut graph), 1);
    }

    #[test]
    fn test_two_independent_cycles() {
        let (mut graph, ops) = chain(&["a", "b", "c", "d"]);
        graph.add_relation(ops[0], ops[1], RelationKind::Operation, "");
        graph.add_relation(ops[1], ops[0], RelationKind::Operation, "");
        graph.add_relation(ops[2], ops[3], RelationKind::Operation, "");
        graph.add_relation(ops[3], ops[2], RelationKind::Operation, "");

        let cycles = find_cycles(&graph);
        assert_eq!(cycles, vec![vec![ops[0], ops[1]], vec![ops[2], ops[3]]]);
        assert_eq!(detect_cycles(&mut graph), 2);

        let message = graph.check_acyclic().unwrap_err().to_string();
        assert!(message.contains("Cube/Parameters/a → Cube/Parameters/b → Cube/Parameters/a"));
    }
}
