//! The dependency graph: node arena, identifier map and operation list.

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};

use super::node::{
    ComponentNode, IdentifierNode, Node, NodeData, OperationNode, RootNode, SubgraphNode,
    TimeSourceNode,
};
use super::relation::Relation;
use super::types::{
    ComponentKind, EntityId, NodeId, OperationCode, OperationRole, RelationId, RelationKind,
    next_epoch,
};
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};

/// Dependency graph of one scene.
///
/// Nodes live in an arena and are addressed by [`NodeId`]. Relations never
/// create nodes; both endpoints must exist before an edge is added.
pub struct Depsgraph {
    epoch: u32,
    nodes: Vec<Node>,
    /// Removed relations leave a tombstone so ids stay stable.
    relations: Vec<Option<Relation>>,
    live_relations: usize,
    id_map: FxHashMap<EntityId, NodeId>,
    /// Identifier nodes in insertion order.
    entities: Vec<NodeId>,
    root: Option<NodeId>,
    /// Every operation node, in insertion order.
    operations: Vec<NodeId>,
    subgraphs: Vec<NodeId>,
    pub(crate) entry_tags: FxHashSet<NodeId>,
    pub(crate) need_update: bool,
    /// Entities tagged while the graph was waiting for a rebuild.
    pub(crate) retag: Vec<EntityId>,
    diagnostics: Diagnostics,
}

impl Depsgraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            epoch: next_epoch(),
            nodes: Vec::new(),
            relations: Vec::new(),
            live_relations: 0,
            id_map: FxHashMap::default(),
            entities: Vec::new(),
            root: None,
            operations: Vec::new(),
            subgraphs: Vec::new(),
            entry_tags: FxHashSet::default(),
            need_update: false,
            retag: Vec::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Drop every node and relation. Ids handed out before stop resolving.
    pub fn clear(&mut self) {
        self.epoch = next_epoch();
        self.nodes.clear();
        self.relations.clear();
        self.live_relations = 0;
        self.id_map.clear();
        self.entities.clear();
        self.root = None;
        self.operations.clear();
        self.subgraphs.clear();
        self.entry_tags.clear();
    }

    fn slot(&self, id: NodeId) -> Option<usize> {
        (id.epoch == self.epoch && id.index() < self.nodes.len()).then_some(id.index())
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slot(id).map(|i| &self.nodes[i])
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slot(id).map(move |i| &mut self.nodes[i])
    }

    /// Like [`Depsgraph::node`] but reports ids from another build as an error.
    pub fn try_node(&self, id: NodeId) -> Result<&Node> {
        self.node(id).ok_or_else(|| Error::StaleNode(id.to_string()))
    }

    pub fn operation(&self, id: NodeId) -> Option<&OperationNode> {
        self.node(id).and_then(Node::as_operation)
    }

    pub(crate) fn operation_mut(&mut self, id: NodeId) -> Option<&mut OperationNode> {
        self.node_mut(id).and_then(Node::as_operation_mut)
    }

    pub fn component(&self, id: NodeId) -> Option<&ComponentNode> {
        self.node(id).and_then(Node::as_component)
    }

    pub fn relation(&self, id: RelationId) -> Option<&Relation> {
        if id.epoch != self.epoch {
            return None;
        }
        self.relations.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn relation_mut(&mut self, id: RelationId) -> Option<&mut Relation> {
        if id.epoch != self.epoch {
            return None;
        }
        self.relations.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// All live relations.
    pub fn relations(&self) -> impl Iterator<Item = (RelationId, &Relation)> + '_ {
        let epoch = self.epoch;
        self.relations
            .iter()
            .enumerate()
            .filter_map(move |(i, rel)| rel.as_ref().map(|rel| (RelationId::new(i, epoch), rel)))
    }

    /// All nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        let epoch = self.epoch;
        self.nodes
            .iter()
            .enumerate()
            .map(move |(i, node)| (NodeId::new(i, epoch), node))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relation_count(&self) -> usize {
        self.live_relations
    }

    /// Operation nodes in insertion order.
    pub fn operations(&self) -> &[NodeId] {
        &self.operations
    }

    /// Identifier nodes in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = (&EntityId, NodeId)> + '_ {
        self.entities.iter().filter_map(|&id| {
            self.node(id)
                .and_then(Node::as_identifier)
                .map(|ident| (&ident.id, id))
        })
    }

    pub fn subgraphs(&self) -> &[NodeId] {
        &self.subgraphs
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// The global time source owned by the root.
    pub fn time_source(&self) -> Option<NodeId> {
        self.root
            .and_then(|root| match &self.node(root)?.data {
                NodeData::Root(r) => r.time_source,
                _ => None,
            })
    }

    /// Current frame of the global time source.
    pub fn frame(&self) -> f64 {
        self.time_source()
            .and_then(|ts| self.node(ts))
            .and_then(Node::as_time_source)
            .map(TimeSourceNode::frame)
            .unwrap_or_default()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Whether relations were invalidated and a rebuild is pending.
    pub fn need_update(&self) -> bool {
        self.need_update
    }

    pub fn find_entity(&self, id: &EntityId) -> Option<NodeId> {
        self.id_map.get(id).copied()
    }

    pub fn entity_time_source(&self, id: &EntityId) -> Option<NodeId> {
        self.find_entity(id)
            .and_then(|node| self.node(node))
            .and_then(Node::as_identifier)
            .and_then(IdentifierNode::time_source)
    }

    pub fn find_component(&self, id: &EntityId, kind: ComponentKind, subpath: &str) -> Option<NodeId> {
        let ident = self.node(self.find_entity(id)?)?.as_identifier()?;
        ident.components.get(&(kind, subpath.to_string())).copied()
    }

    pub fn find_operation(
        &self,
        id: &EntityId,
        kind: ComponentKind,
        subpath: &str,
        opcode: OperationCode,
        name: &str,
    ) -> Option<NodeId> {
        let component = self.component(self.find_component(id, kind, subpath)?)?;
        component.operations.get(&(opcode, name.to_string())).copied()
    }

    /// First operation of an entity with the given name.
    pub fn find_operation_by_name(&self, id: &EntityId, name: &str) -> Option<NodeId> {
        let ident = self.node(self.find_entity(id)?)?.as_identifier()?;
        ident
            .components
            .values()
            .filter_map(|&c| self.component(c))
            .flat_map(|c| c.order.iter().copied())
            .find(|&op| self.node(op).is_some_and(|n| n.name == name))
    }

    /// Component that owns an operation.
    pub fn owning_component(&self, op: NodeId) -> Option<NodeId> {
        self.operation(op).map(OperationNode::component)
    }

    /// Add an edge `from -> to`. Returns `None` if either endpoint is missing.
    ///
    /// An existing `from -> to` edge of the same kind is returned instead of
    /// adding a parallel one.
    pub fn add_relation(
        &mut self,
        from: NodeId,
        to: NodeId,
        kind: RelationKind,
        label: impl Into<String>,
    ) -> Option<RelationId> {
        let (from_slot, to_slot) = (self.slot(from)?, self.slot(to)?);
        let existing = self.nodes[from_slot]
            .outlinks
            .iter()
            .copied()
            .find(|&r| self.relation(r).is_some_and(|rel| rel.to == to && rel.kind == kind));
        if existing.is_some() {
            return existing;
        }
        let id = RelationId::new(self.relations.len(), self.epoch);
        self.relations.push(Some(Relation {
            from,
            to,
            kind,
            label: label.into(),
            cyclic: false,
        }));
        self.live_relations += 1;
        self.nodes[from_slot].outlinks.push(id);
        self.nodes[to_slot].inlinks.push(id);
        Some(id)
    }

    /// Remove an edge together with both of its registrations.
    pub fn remove_relation(&mut self, id: RelationId) -> Option<Relation> {
        if id.epoch != self.epoch {
            return None;
        }
        let rel = self.relations.get_mut(id.index())?.take()?;
        self.live_relations -= 1;
        if let Some(from) = self.node_mut(rel.from) {
            from.outlinks.retain(|&r| r != id);
        }
        if let Some(to) = self.node_mut(rel.to) {
            to.inlinks.retain(|&r| r != id);
        }
        Some(rel)
    }

    /// First direct edge `from -> to`, if any.
    pub fn find_relation(&self, from: NodeId, to: NodeId) -> Option<RelationId> {
        self.node(from)?
            .outlinks
            .iter()
            .copied()
            .find(|&r| self.relation(r).is_some_and(|rel| rel.to == to))
    }

    /// Whether a direct edge `from -> to` exists.
    pub fn has_relation(&self, from: NodeId, to: NodeId) -> bool {
        self.find_relation(from, to).is_some()
    }

    /// Direct predecessors over non-cyclic relations.
    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|node| {
                node.inlinks
                    .iter()
                    .filter_map(|&r| self.relation(r))
                    .filter(|rel| !rel.cyclic)
                    .map(Relation::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Direct successors over non-cyclic relations.
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|node| {
                node.outlinks
                    .iter()
                    .filter_map(|&r| self.relation(r))
                    .filter(|rel| !rel.cyclic)
                    .map(Relation::to)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Fail with [`Error::CyclicDependency`] if any operations form a cycle.
    pub fn check_acyclic(&self) -> Result<()> {
        let cycles = crate::build::find_cycles(self);
        match cycles.first() {
            None => Ok(()),
            Some(cycle) => Err(Error::CyclicDependency(self.describe_path(cycle))),
        }
    }

    /// Human-readable chain of node names, closed back onto the first one.
    pub fn describe_path(&self, nodes: &[NodeId]) -> String {
        let mut names: Vec<String> = nodes.iter().map(|&n| self.describe(n)).collect();
        if let Some(first) = names.first().cloned() {
            names.push(first);
        }
        names.join(" → ")
    }

    /// `entity/component[subpath]/name` style label for logs.
    pub fn describe(&self, id: NodeId) -> String {
        let Some(node) = self.node(id) else {
            return format!("<stale {id}>");
        };
        match &node.data {
            NodeData::Operation(op) => {
                let owner = node.owner.as_ref().map(EntityId::as_str).unwrap_or("?");
                if node.subpath.is_empty() {
                    format!("{owner}/{}/{}", op.kind, node.name)
                } else {
                    format!("{owner}/{}[{}]/{}", op.kind, node.subpath, node.name)
                }
            }
            NodeData::Component(c) => {
                let owner = node.owner.as_ref().map(EntityId::as_str).unwrap_or("?");
                if node.subpath.is_empty() {
                    format!("{owner}/{}", c.kind)
                } else {
                    format!("{owner}/{}[{}]", c.kind, node.subpath)
                }
            }
            _ => node.name.clone(),
        }
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len(), self.epoch);
        self.nodes.push(node);
        id
    }

    pub(crate) fn ensure_root(&mut self) -> NodeId {
        if let Some(root) = self.root {
            return root;
        }
        let root = self.push_node(Node::new("Root", None, "", NodeData::Root(RootNode::default())));
        let ts = self.push_node(Node::new(
            "Time Source",
            None,
            "",
            NodeData::TimeSource(TimeSourceNode::default()),
        ));
        if let NodeData::Root(r) = &mut self.nodes[root.index()].data {
            r.time_source = Some(ts);
        }
        self.root = Some(root);
        root
    }

    /// Global time source when `owner` is `None`, the entity's own otherwise.
    pub(crate) fn ensure_time_source(&mut self, owner: Option<&EntityId>) -> NodeId {
        let Some(id) = owner else {
            self.ensure_root();
            return self.time_source().unwrap_or_else(|| unreachable!("root always owns a time source"));
        };
        let ident = self.ensure_identifier(id);
        if let Some(ts) = self.nodes[ident.index()].as_identifier().and_then(|i| i.time_source) {
            return ts;
        }
        let ts = self.push_node(Node::new(
            format!("{id} Time Source"),
            Some(id.clone()),
            "",
            NodeData::TimeSource(TimeSourceNode::default()),
        ));
        if let Some(ident) = self.nodes[ident.index()].as_identifier_mut() {
            ident.time_source = Some(ts);
        }
        ts
    }

    pub(crate) fn ensure_identifier(&mut self, id: &EntityId) -> NodeId {
        if let Some(&node) = self.id_map.get(id) {
            return node;
        }
        let node = self.push_node(Node::new(
            id.as_str(),
            Some(id.clone()),
            "",
            NodeData::Identifier(IdentifierNode {
                id: id.clone(),
                components: BTreeMap::new(),
                time_source: None,
            }),
        ));
        self.id_map.insert(id.clone(), node);
        self.entities.push(node);
        node
    }

    pub(crate) fn ensure_component(&mut self, id: &EntityId, kind: ComponentKind, subpath: &str) -> NodeId {
        let ident = self.ensure_identifier(id);
        let key = (kind, subpath.to_string());
        if let Some(&c) = self.nodes[ident.index()]
            .as_identifier()
            .and_then(|i| i.components.get(&key))
        {
            return c;
        }
        let component = self.push_node(Node::new(
            kind.name(),
            Some(id.clone()),
            subpath,
            NodeData::Component(ComponentNode {
                kind,
                identifier: ident,
                operations: BTreeMap::new(),
                order: Vec::new(),
                entry: None,
                exit: None,
            }),
        ));
        if let Some(i) = self.nodes[ident.index()].as_identifier_mut() {
            i.components.insert(key, component);
        }
        component
    }

    /// Find or create an operation inside `component`. Returns `(id, created)`.
    pub(crate) fn ensure_operation(
        &mut self,
        component: NodeId,
        opcode: OperationCode,
        name: &str,
        role: OperationRole,
    ) -> Option<(NodeId, bool)> {
        let slot = self.slot(component)?;
        let (kind, owner, subpath) = {
            let node = &self.nodes[slot];
            let c = node.as_component()?;
            if let Some(&op) = c.operations.get(&(opcode, name.to_string())) {
                return Some((op, false));
            }
            (c.kind, node.owner.clone(), node.subpath.clone())
        };
        let op = self.push_node(Node::new(
            name,
            owner,
            subpath,
            NodeData::Operation(OperationNode::new(component, kind, opcode, role)),
        ));
        if let Some(c) = self.nodes[slot].as_component_mut() {
            c.operations.insert((opcode, name.to_string()), op);
            c.order.push(op);
        }
        self.operations.push(op);
        Some((op, true))
    }

    pub(crate) fn add_subgraph(&mut self, owner: &EntityId, group: &str, graph: Depsgraph) -> NodeId {
        if let Some(&existing) = self.subgraphs.iter().find(|&&s| {
            let node = &self.nodes[s.index()];
            node.owner.as_ref() == Some(owner) && node.as_subgraph().is_some_and(|sub| sub.group == group)
        }) {
            return existing;
        }
        self.ensure_identifier(owner);
        let node = self.push_node(Node::new(
            format!("Group {group}"),
            Some(owner.clone()),
            "",
            NodeData::Subgraph(SubgraphNode {
                graph: Box::new(graph),
                group: group.to_string(),
            }),
        ));
        self.subgraphs.push(node);
        node
    }

    pub(crate) fn set_component_entry(&mut self, component: NodeId, entry: NodeId) {
        if let Some(c) = self.node_mut(component).and_then(Node::as_component_mut) {
            c.entry = Some(entry);
        }
    }

    pub(crate) fn set_component_exit(&mut self, component: NodeId, exit: NodeId) {
        if let Some(c) = self.node_mut(component).and_then(Node::as_component_mut) {
            c.exit = Some(exit);
        }
    }

    /// Every operation of an entity, component by component.
    pub fn entity_operations(&self, id: &EntityId) -> Vec<NodeId> {
        let Some(ident) = self.find_entity(id).and_then(|n| self.node(n)).and_then(Node::as_identifier) else {
            return Vec::new();
        };
        ident
            .components
            .values()
            .filter_map(|&c| self.component(c))
            .flat_map(|c| c.order.iter().copied())
            .collect()
    }

    pub(crate) fn node_slice_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }
}

impl Default for Depsgraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Depsgraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Depsgraph")
            .field("nodes", &self.nodes.len())
            .field("relations", &self.live_relations)
            .field("entities", &self.entities.len())
            .field("operations", &self.operations.len())
            .field("need_update", &self.need_update)
            .finish()
    }
}
