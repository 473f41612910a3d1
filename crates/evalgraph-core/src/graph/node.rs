//! Node kinds stored in the graph arena.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::Depsgraph;
use super::types::{ComponentKind, EntityId, NodeId, NodeType, OperationCode, OperationRole, RelationId};
use crate::eval::OperationCallback;

/// Transient marks used by graph walks (reduction, priorities).
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Marks {
    pub visited: bool,
    pub reachable: bool,
}

/// A node in the dependency graph.
pub struct Node {
    pub(crate) name: String,
    /// Entity the node belongs to; `None` for the root and global time source.
    pub(crate) owner: Option<EntityId>,
    pub(crate) subpath: String,
    pub(crate) inlinks: Vec<RelationId>,
    pub(crate) outlinks: Vec<RelationId>,
    pub(crate) marks: Marks,
    pub(crate) data: NodeData,
}

/// Kind-specific node payload.
pub enum NodeData {
    Root(RootNode),
    TimeSource(TimeSourceNode),
    Identifier(IdentifierNode),
    Component(ComponentNode),
    Operation(OperationNode),
    Subgraph(SubgraphNode),
}

/// Entry point of the graph; owns the global time source.
#[derive(Debug, Default)]
pub struct RootNode {
    pub(crate) time_source: Option<NodeId>,
}

/// Source of time-dependent updates.
#[derive(Debug, Default)]
pub struct TimeSourceNode {
    pub(crate) frame: f64,
    /// Offset applied on top of the global frame for per-entity sources.
    pub(crate) offset: f64,
}

/// One external entity.
#[derive(Debug)]
pub struct IdentifierNode {
    pub(crate) id: EntityId,
    pub(crate) components: BTreeMap<(ComponentKind, String), NodeId>,
    pub(crate) time_source: Option<NodeId>,
}

/// A group of operations evaluated as one aspect of an entity.
#[derive(Debug)]
pub struct ComponentNode {
    pub(crate) kind: ComponentKind,
    pub(crate) identifier: NodeId,
    pub(crate) operations: BTreeMap<(OperationCode, String), NodeId>,
    /// Operations in insertion order.
    pub(crate) order: Vec<NodeId>,
    pub(crate) entry: Option<NodeId>,
    pub(crate) exit: Option<NodeId>,
}

/// Leaf unit of schedulable work.
pub struct OperationNode {
    pub(crate) component: NodeId,
    pub(crate) kind: ComponentKind,
    pub(crate) opcode: OperationCode,
    pub(crate) role: OperationRole,
    pub(crate) callback: Option<OperationCallback>,
    /// Barriers and pass-throughs created while designating entry/exit points.
    pub(crate) synthetic: bool,
    pub(crate) priority: f32,
    pub(crate) pending: AtomicU32,
    pub(crate) scheduled: AtomicBool,
    pub(crate) needs_update: bool,
}

/// Isolated nested graph for an instanced group.
pub struct SubgraphNode {
    pub(crate) graph: Box<Depsgraph>,
    pub(crate) group: String,
}

impl OperationNode {
    pub(crate) fn new(
        component: NodeId,
        kind: ComponentKind,
        opcode: OperationCode,
        role: OperationRole,
    ) -> Self {
        Self {
            component,
            kind,
            opcode,
            role,
            callback: None,
            synthetic: false,
            priority: 0.0,
            pending: AtomicU32::new(0),
            scheduled: AtomicBool::new(false),
            needs_update: false,
        }
    }

    pub fn component(&self) -> NodeId {
        self.component
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn opcode(&self) -> OperationCode {
        self.opcode
    }

    pub fn role(&self) -> OperationRole {
        self.role
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    pub fn priority(&self) -> f32 {
        self.priority
    }

    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Whether the operation was queued in the current pass.
    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::Acquire)
    }

    /// Reset per-pass scheduling state.
    pub(crate) fn reset(&mut self) {
        *self.pending.get_mut() = 0;
        *self.scheduled.get_mut() = false;
        self.needs_update = false;
        self.priority = 0.0;
    }
}

impl ComponentNode {
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn identifier(&self) -> NodeId {
        self.identifier
    }

    pub fn entry(&self) -> Option<NodeId> {
        self.entry
    }

    pub fn exit(&self) -> Option<NodeId> {
        self.exit
    }

    /// Operations in insertion order.
    pub fn operations(&self) -> &[NodeId] {
        &self.order
    }
}

impl IdentifierNode {
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn components(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.components.values().copied()
    }

    pub fn time_source(&self) -> Option<NodeId> {
        self.time_source
    }
}

impl TimeSourceNode {
    pub fn frame(&self) -> f64 {
        self.frame
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }
}

impl SubgraphNode {
    pub fn graph(&self) -> &Depsgraph {
        &self.graph
    }

    pub fn group(&self) -> &str {
        &self.group
    }
}

impl Node {
    pub(crate) fn new(name: impl Into<String>, owner: Option<EntityId>, subpath: impl Into<String>, data: NodeData) -> Self {
        Self {
            name: name.into(),
            owner,
            subpath: subpath.into(),
            inlinks: Vec::new(),
            outlinks: Vec::new(),
            marks: Marks::default(),
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Option<&EntityId> {
        self.owner.as_ref()
    }

    pub fn subpath(&self) -> &str {
        &self.subpath
    }

    pub fn inlinks(&self) -> &[RelationId] {
        &self.inlinks
    }

    pub fn outlinks(&self) -> &[RelationId] {
        &self.outlinks
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    /// Kind tag of this node.
    pub fn node_type(&self) -> NodeType {
        match &self.data {
            NodeData::Root(_) => NodeType::Root,
            NodeData::TimeSource(_) => NodeType::TimeSource,
            NodeData::Identifier(_) => NodeType::Identifier,
            NodeData::Component(c) => NodeType::Component(c.kind),
            NodeData::Operation(op) => NodeType::Operation {
                component: op.kind,
                opcode: op.opcode,
            },
            NodeData::Subgraph(_) => NodeType::Subgraph,
        }
    }

    pub fn as_operation(&self) -> Option<&OperationNode> {
        match &self.data {
            NodeData::Operation(op) => Some(op),
            _ => None,
        }
    }

    pub(crate) fn as_operation_mut(&mut self) -> Option<&mut OperationNode> {
        match &mut self.data {
            NodeData::Operation(op) => Some(op),
            _ => None,
        }
    }

    pub fn as_component(&self) -> Option<&ComponentNode> {
        match &self.data {
            NodeData::Component(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn as_component_mut(&mut self) -> Option<&mut ComponentNode> {
        match &mut self.data {
            NodeData::Component(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_identifier(&self) -> Option<&IdentifierNode> {
        match &self.data {
            NodeData::Identifier(id) => Some(id),
            _ => None,
        }
    }

    pub(crate) fn as_identifier_mut(&mut self) -> Option<&mut IdentifierNode> {
        match &mut self.data {
            NodeData::Identifier(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_time_source(&self) -> Option<&TimeSourceNode> {
        match &self.data {
            NodeData::TimeSource(ts) => Some(ts),
            _ => None,
        }
    }

    pub(crate) fn as_time_source_mut(&mut self) -> Option<&mut TimeSourceNode> {
        match &mut self.data {
            NodeData::TimeSource(ts) => Some(ts),
            _ => None,
        }
    }

    pub fn as_subgraph(&self) -> Option<&SubgraphNode> {
        match &self.data {
            NodeData::Subgraph(sub) => Some(sub),
            _ => None,
        }
    }

    pub fn is_operation(&self) -> bool {
        matches!(self.data, NodeData::Operation(_))
    }

    pub fn is_time_source(&self) -> bool {
        matches!(self.data, NodeData::TimeSource(_))
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("subpath", &self.subpath)
            .field("type", &self.node_type())
            .field("inlinks", &self.inlinks.len())
            .field("outlinks", &self.outlinks.len())
            .finish()
    }
}
