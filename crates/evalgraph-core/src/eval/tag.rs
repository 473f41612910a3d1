//! Marking parts of the graph for re-evaluation.

use crate::build::ComponentKey;
use crate::diagnostics::DiagnosticKind;
use crate::graph::{Depsgraph, EntityId, NodeId};

/// What changed outside the graph.
#[derive(Debug, Clone)]
pub enum TagTarget {
    /// Every operation of an entity.
    Entity(EntityId),
    /// Every operation of one component.
    Component(ComponentKey),
    /// A single operation.
    Operation(NodeId),
    /// The global time source (frame change).
    TimeSource,
}

/// Tag `target` for the next evaluation pass.
///
/// Returns the number of nodes added to the entry set; unknown targets are
/// reported as lookup diagnostics and tag nothing.
pub fn tag_dirty(graph: &mut Depsgraph, target: &TagTarget) -> usize {
    match target {
        TagTarget::Entity(id) => graph.tag_entity(id),
        TagTarget::Component(key) => match key.find(graph) {
            Some(component) => graph.tag_component(component),
            None => {
                graph
                    .diagnostics()
                    .report(DiagnosticKind::Lookup, format!("cannot tag {key}: not in the graph"));
                0
            }
        },
        TagTarget::Operation(op) => usize::from(graph.tag_operation(*op)),
        TagTarget::TimeSource => usize::from(graph.tag_time_source()),
    }
}

impl Depsgraph {
    /// Mark one operation as needing an update. Tagging twice is harmless.
    pub fn tag_operation(&mut self, op: NodeId) -> bool {
        let Some(node) = self.operation_mut(op) else {
            return false;
        };
        node.needs_update = true;
        self.entry_tags.insert(op);
        true
    }

    /// Tag every operation of a component.
    pub fn tag_component(&mut self, component: NodeId) -> usize {
        let ops = self
            .component(component)
            .map(|c| c.operations().to_vec())
            .unwrap_or_default();
        ops.into_iter().filter(|&op| self.tag_operation(op)).count()
    }

    /// Tag every operation of an entity.
    ///
    /// While a relation rebuild is pending the entity is also remembered, so
    /// the tag survives [`crate::build::rebuild_if_needed`].
    pub fn tag_entity(&mut self, id: &EntityId) -> usize {
        if self.need_update && !self.retag.contains(id) {
            self.retag.push(id.clone());
        }
        if self.find_entity(id).is_none() {
            self.diagnostics()
                .report(DiagnosticKind::Lookup, format!("cannot tag entity '{id}': not in the graph"));
            return 0;
        }
        self.entity_operations(id)
            .into_iter()
            .filter(|&op| self.tag_operation(op))
            .count()
    }

    /// Tag the global time source; the next pass updates everything that
    /// depends on time.
    pub fn tag_time_source(&mut self) -> bool {
        match self.time_source() {
            Some(ts) => {
                self.entry_tags.insert(ts);
                true
            }
            None => false,
        }
    }

    /// Invalidate the relations of the graph; see [`crate::build::rebuild_if_needed`].
    pub fn tag_relations_update(&mut self) {
        self.need_update = true;
    }

    /// Nodes currently in the entry set.
    pub fn entry_tags(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entry_tags.iter().copied()
    }

    /// Operations currently tagged for update, in insertion order.
    pub fn tagged_operations(&self) -> Vec<NodeId> {
        self.operations()
            .iter()
            .copied()
            .filter(|&op| self.operation(op).is_some_and(|o| o.needs_update()))
            .collect()
    }
}
