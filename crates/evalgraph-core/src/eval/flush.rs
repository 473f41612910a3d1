//! Propagating tags downstream before a pass.

use rustc_hash::FxHashSet;

use crate::graph::{Depsgraph, NodeId};

/// Tag every operation reachable from the entry set over non-cyclic
/// relations. Returns the number of operations tagged for the pass.
pub(crate) fn flush_updates(graph: &mut Depsgraph) -> usize {
    let mut seen: FxHashSet<NodeId> = graph.entry_tags.iter().copied().collect();
    let mut queue: Vec<NodeId> = seen.iter().copied().collect();
    let mut reached = Vec::new();

    while let Some(node) = queue.pop() {
        if graph.node(node).is_some_and(|n| n.is_operation()) {
            reached.push(node);
        }
        for next in graph.successors(node) {
            if seen.insert(next) {
                queue.push(next);
            }
        }
    }

    for &op in &reached {
        if let Some(op) = graph.operation_mut(op) {
            op.needs_update = true;
        }
    }
    tracing::debug!(
        "flushed {} entry tags to {} operations",
        graph.entry_tags.len(),
        reached.len()
    );
    reached.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ComponentKind, EntityId, OperationCode, OperationRole, RelationKind};

    #[test]
    fn test_flush_follows_relations_only() {
        let mut graph = Depsgraph::new();
        let component = graph.ensure_component(&EntityId::new("Cube"), ComponentKind::Parameters, "");
        let op = |graph: &mut Depsgraph, name: &str| {
            graph
                .ensure_operation(component, OperationCode::Generic, name, OperationRole::Exec)
                .unwrap()
                .0
        };
        let (a, b, c, d) = (op(&mut graph, "a"), op(&mut graph, "b"), op(&mut graph, "c"), op(&mut graph, "d"));
        graph.add_relation(a, b, RelationKind::Operation, "");
        graph.add_relation(b, c, RelationKind::Operation, "");
        graph.add_relation(d, a, RelationKind::Operation, "");

        graph.tag_operation(a);
        assert_eq!(flush_updates(&mut graph), 3);
        assert_eq!(graph.tagged_operations(), vec![a, b, c]);
    }

    #[test]
    fn test_flush_from_time_source() {
        let mut graph = Depsgraph::new();
        let time = graph.ensure_time_source(None);
        let component = graph.ensure_component(&EntityId::new("Cube"), ComponentKind::Animation, "");
        let (animated, _) = graph
            .ensure_operation(component, OperationCode::AnimationEval, "Animation", OperationRole::Exec)
            .unwrap();
        let (still, _) = graph
            .ensure_operation(component, OperationCode::Generic, "Still", OperationRole::Exec)
            .unwrap();
        graph.add_relation(time, animated, RelationKind::Time, "");

        graph.tag_time_source();
        assert_eq!(flush_updates(&mut graph), 1);
        assert!(graph.operation(animated).unwrap().needs_update());
        assert!(!graph.operation(still).unwrap().needs_update());
    }
}
