//! Transitive reduction of operation relations.

use rustc_hash::FxHashMap;

use crate::graph::{Depsgraph, NodeId, RelationId};

/// Remove every relation `p -> t` where `p` already reaches `t` through
/// another path.
///
/// Only relations between operations are considered: time-source edges are
/// kept, and cyclic relations are ignored. Returns the number removed.
pub fn transitive_reduction(graph: &mut Depsgraph) -> usize {
    // Inbound operation edges of every operation, by node index.
    let mut inbound: FxHashMap<usize, Vec<(RelationId, NodeId)>> = FxHashMap::default();
    for &op in graph.operations() {
        let Some(node) = graph.node(op) else {
            continue;
        };
        let edges = node
            .inlinks()
            .iter()
            .filter_map(|&r| graph.relation(r).map(|rel| (r, rel)))
            .filter(|(_, rel)| !rel.is_cyclic())
            .filter(|(_, rel)| graph.node(rel.from()).is_some_and(|n| n.is_operation()))
            .map(|(r, rel)| (r, rel.from()))
            .collect();
        inbound.insert(op.index(), edges);
    }

    let targets = graph.operations().to_vec();
    let mut removed = 0;
    let mut stack: Vec<NodeId> = Vec::new();
    for target in targets {
        let Some(direct) = inbound.get(&target.index()).filter(|edges| edges.len() > 1) else {
            continue;
        };

        let nodes = graph.node_slice_mut();
        for node in nodes.iter_mut() {
            node.marks = Default::default();
        }
        nodes[target.index()].marks.visited = true;

        // Everything upstream of a direct predecessor, reached through an
        // inbound relation, is reachable.
        for &(_, pred) in direct {
            stack.push(pred);
            while let Some(node) = stack.pop() {
                for &(_, from) in inbound.get(&node.index()).map(Vec::as_slice).unwrap_or_default() {
                    let marks = &mut nodes[from.index()].marks;
                    marks.reachable = true;
                    if !marks.visited {
                        marks.visited = true;
                        stack.push(from);
                    }
                }
            }
        }

        let (redundant, kept): (Vec<_>, Vec<_>) = direct
            .iter()
            .copied()
            .partition(|&(_, pred)| nodes[pred.index()].marks.reachable);
        if redundant.is_empty() {
            continue;
        }
        for (rel, _) in &redundant {
            graph.remove_relation(*rel);
        }
        removed += redundant.len();
        inbound.insert(target.index(), kept);
    }

    for node in graph.node_slice_mut() {
        node.marks = Default::default();
    }
    tracing::debug!("transitive reduction removed {} relations", removed);
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ComponentKind, EntityId, OperationCode, OperationRole, RelationKind};
    use petgraph::algo::has_path_connecting;
    use petgraph::graph::{DiGraph, NodeIndex};

    fn ops(count: usize) -> (Depsgraph, Vec<NodeId>) {
        let mut graph = Depsgraph::new();
        let component = graph.ensure_component(&EntityId::new("Cube"), ComponentKind::Parameters, "");
        let ops = (0..count)
            .map(|i| {
                graph
                    .ensure_operation(component, OperationCode::Generic, &format!("op{i}"), OperationRole::Exec)
                    .unwrap()
                    .0
            })
            .collect();
        (graph, ops)
    }

    fn to_petgraph(graph: &Depsgraph, ops: &[NodeId]) -> DiGraph<(), ()> {
        let mut pg = DiGraph::new();
        for _ in ops {
            pg.add_node(());
        }
        let position = |id: NodeId| ops.iter().position(|&op| op == id);
        for (_, rel) in graph.relations() {
            if let (Some(a), Some(b)) = (position(rel.from()), position(rel.to())) {
                pg.add_edge(NodeIndex::new(a), NodeIndex::new(b), ());
            }
        }
        pg
    }

    #[test]
    fn test_diamond_with_shortcut() {
        let (mut graph, n) = ops(4);
        graph.add_relation(n[0], n[1], RelationKind::Operation, "");
        graph.add_relation(n[0], n[2], RelationKind::Operation, "");
        graph.add_relation(n[1], n[3], RelationKind::Operation, "");
        graph.add_relation(n[2], n[3], RelationKind::Operation, "");
        let shortcut = graph.add_relation(n[0], n[3], RelationKind::Operation, "").unwrap();

        assert_eq!(transitive_reduction(&mut graph), 1);
        assert!(graph.relation(shortcut).is_none());
        assert_eq!(graph.relation_count(), 4);
        assert_eq!(transitive_reduction(&mut graph), 0);
    }

    #[test]
    fn test_time_source_edges_are_kept() {
        let (mut graph, n) = ops(2);
        let time = graph.ensure_time_source(None);
        graph.add_relation(n[0], n[1], RelationKind::Operation, "");
        graph.add_relation(time, n[0], RelationKind::Time, "");
        let direct = graph.add_relation(time, n[1], RelationKind::Time, "").unwrap();

        assert_eq!(transitive_reduction(&mut graph), 0);
        assert!(graph.relation(direct).is_some());
    }

    #[test]
    fn test_cyclic_relations_are_ignored() {
        let (mut graph, n) = ops(3);
        graph.add_relation(n[0], n[1], RelationKind::Operation, "");
        graph.add_relation(n[1], n[2], RelationKind::Operation, "");
        graph.add_relation(n[0], n[2], RelationKind::Operation, "");
        let back = graph.add_relation(n[2], n[0], RelationKind::Operation, "").unwrap();
        crate::build::detect_cycles(&mut graph);

        assert_eq!(transitive_reduction(&mut graph), 1);
        assert!(graph.relation(back).is_some_and(|r| r.is_cyclic()));
    }

    #[test]
    fn test_random_dags_keep_reachability() {
        // Fixed-seed LCG so failures reproduce.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as usize
        };

        for round in 0..20 {
            let count = 4 + round % 9;
            let (mut graph, n) = ops(count);
            for a in 0..count {
                for b in a + 1..count {
                    if next() % 3 == 0 {
                        graph.add_relation(n[a], n[b], RelationKind::Operation, "");
                    }
                }
            }

            let before = to_petgraph(&graph, &n);
            transitive_reduction(&mut graph);
            let after = to_petgraph(&graph, &n);

            for a in 0..count {
                for b in 0..count {
                    let (ia, ib) = (NodeIndex::new(a), NodeIndex::new(b));
                    assert_eq!(
                        has_path_connecting(&before, ia, ib, None),
                        has_path_connecting(&after, ia, ib, None),
                        "round {round}: reachability {a} -> {b} changed"
                    );
                }
            }

            // No remaining direct edge is implied by a longer path.
            for (id, rel) in graph.relations() {
                let mut without = after.clone();
                let (a, b) = (
                    n.iter().position(|&op| op == rel.from()).unwrap(),
                    n.iter().position(|&op| op == rel.to()).unwrap(),
                );
                let edge = without.find_edge(NodeIndex::new(a), NodeIndex::new(b)).unwrap();
                without.remove_edge(edge);
                assert!(
                    !has_path_connecting(&without, NodeIndex::new(a), NodeIndex::new(b), None),
                    "round {round}: {id} is redundant"
                );
            }
        }
    }
}
