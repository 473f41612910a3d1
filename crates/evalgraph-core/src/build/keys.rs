//! Lookup keys used by the relation builder.
//!
//! A key names a node by identity instead of by id. Keys only ever find
//! existing nodes; the node builder is the only place nodes are created.

use std::fmt;

use crate::graph::{ComponentKind, Depsgraph, EntityId, NodeId, OperationCode};
use crate::scene::PathResolver;

/// What a key resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// A concrete node (operation, time source, root).
    Node(NodeId),
    /// A component; edges attach to its exit (as source) or entry (as target).
    Component(NodeId),
}

/// A key that can be resolved against a built node set.
pub trait RelationKey: fmt::Display {
    fn resolve(&self, graph: &Depsgraph, resolver: &dyn PathResolver) -> Option<Resolved>;
}

/// The root node.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootKey;

/// The global time source, or the time source of one entity.
#[derive(Debug, Clone, Default)]
pub struct TimeSourceKey {
    pub entity: Option<EntityId>,
}

/// An entity as a whole; resolves through its transform component.
#[derive(Debug, Clone)]
pub struct IdentifierKey {
    pub entity: EntityId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentKey {
    pub entity: EntityId,
    pub kind: ComponentKind,
    pub subpath: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationKey {
    pub component: ComponentKey,
    pub opcode: OperationCode,
    pub name: String,
}

/// A property path of an entity, resolved through a [`PathResolver`].
#[derive(Debug, Clone)]
pub struct PathKey {
    pub entity: EntityId,
    pub path: String,
}

impl TimeSourceKey {
    pub fn global() -> Self {
        Self { entity: None }
    }

    pub fn entity(entity: &EntityId) -> Self {
        Self {
            entity: Some(entity.clone()),
        }
    }
}

impl IdentifierKey {
    pub fn new(entity: &EntityId) -> Self {
        Self {
            entity: entity.clone(),
        }
    }
}

impl ComponentKey {
    pub fn new(entity: &EntityId, kind: ComponentKind) -> Self {
        Self {
            entity: entity.clone(),
            kind,
            subpath: String::new(),
        }
    }

    pub fn bone(entity: &EntityId, bone: &str) -> Self {
        Self::new(entity, ComponentKind::Bone).with_subpath(bone)
    }

    pub fn with_subpath(mut self, subpath: impl Into<String>) -> Self {
        self.subpath = subpath.into();
        self
    }

    pub fn find(&self, graph: &Depsgraph) -> Option<NodeId> {
        graph.find_component(&self.entity, self.kind, &self.subpath)
    }
}

impl OperationKey {
    pub fn new(entity: &EntityId, kind: ComponentKind, opcode: OperationCode, name: impl Into<String>) -> Self {
        Self::in_component(ComponentKey::new(entity, kind), opcode, name)
    }

    pub fn in_component(component: ComponentKey, opcode: OperationCode, name: impl Into<String>) -> Self {
        Self {
            component,
            opcode,
            name: name.into(),
        }
    }

    pub fn find(&self, graph: &Depsgraph) -> Option<NodeId> {
        graph.find_operation(
            &self.component.entity,
            self.component.kind,
            &self.component.subpath,
            self.opcode,
            &self.name,
        )
    }
}

impl PathKey {
    pub fn new(entity: &EntityId, path: impl Into<String>) -> Self {
        Self {
            entity: entity.clone(),
            path: path.into(),
        }
    }
}

impl RelationKey for RootKey {
    fn resolve(&self, graph: &Depsgraph, _resolver: &dyn PathResolver) -> Option<Resolved> {
        graph.root().map(Resolved::Node)
    }
}

impl RelationKey for TimeSourceKey {
    fn resolve(&self, graph: &Depsgraph, _resolver: &dyn PathResolver) -> Option<Resolved> {
        match &self.entity {
            None => graph.time_source(),
            Some(entity) => graph.entity_time_source(entity),
        }
        .map(Resolved::Node)
    }
}

impl RelationKey for IdentifierKey {
    fn resolve(&self, graph: &Depsgraph, _resolver: &dyn PathResolver) -> Option<Resolved> {
        graph
            .find_component(&self.entity, ComponentKind::Transform, "")
            .or_else(|| {
                graph
                    .node(graph.find_entity(&self.entity)?)?
                    .as_identifier()?
                    .components()
                    .next()
            })
            .map(Resolved::Component)
    }
}

impl RelationKey for ComponentKey {
    fn resolve(&self, graph: &Depsgraph, _resolver: &dyn PathResolver) -> Option<Resolved> {
        self.find(graph).map(Resolved::Component)
    }
}

impl RelationKey for OperationKey {
    fn resolve(&self, graph: &Depsgraph, _resolver: &dyn PathResolver) -> Option<Resolved> {
        self.find(graph).map(Resolved::Node)
    }
}

impl RelationKey for PathKey {
    fn resolve(&self, graph: &Depsgraph, resolver: &dyn PathResolver) -> Option<Resolved> {
        let resolved = resolver.resolve(&self.entity, &self.path)?;
        let component = ComponentKey::new(&self.entity, resolved.component).with_subpath(resolved.subpath);
        if let Some((opcode, name)) = resolved.operation {
            let key = OperationKey::in_component(component.clone(), opcode, name);
            if let Some(op) = key.find(graph) {
                return Some(Resolved::Node(op));
            }
        }
        component.resolve(graph, resolver)
    }
}

impl fmt::Display for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RootKey")
    }
}

impl fmt::Display for TimeSourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity {
            None => f.write_str("TimeSourceKey(global)"),
            Some(entity) => write!(f, "TimeSourceKey({entity})"),
        }
    }
}

impl fmt::Display for IdentifierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentifierKey({})", self.entity)
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subpath.is_empty() {
            write!(f, "ComponentKey({}, {})", self.entity, self.kind)
        } else {
            write!(f, "ComponentKey({}, {}, '{}')", self.entity, self.kind, self.subpath)
        }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationKey({}, '{}')", self.component, self.name)
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathKey({}, '{}')", self.entity, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OperationRole;
    use crate::scene::DefaultPathResolver;

    fn graph() -> Depsgraph {
        let mut graph = Depsgraph::new();
        let cube = EntityId::new("Cube");
        let geometry = graph.ensure_component(&cube, ComponentKind::Geometry, "");
        graph
            .ensure_operation(geometry, OperationCode::Modifier, "Modifier Subsurf", OperationRole::Exec)
            .unwrap();
        graph.ensure_component(&cube, ComponentKind::Transform, "");
        graph.ensure_time_source(None);
        graph
    }

    #[test]
    fn test_keys_never_create() {
        let graph = graph();
        let before = graph.node_count();
        let ghost = EntityId::new("Ghost");
        let r = &DefaultPathResolver;

        assert!(IdentifierKey::new(&ghost).resolve(&graph, r).is_none());
        assert!(ComponentKey::new(&ghost, ComponentKind::Transform).resolve(&graph, r).is_none());
        assert!(TimeSourceKey::entity(&ghost).resolve(&graph, r).is_none());
        assert_eq!(graph.node_count(), before);
    }

    #[test]
    fn test_identifier_prefers_transform() {
        let graph = graph();
        let cube = EntityId::new("Cube");
        let transform = graph.find_component(&cube, ComponentKind::Transform, "").unwrap();
        assert_eq!(
            IdentifierKey::new(&cube).resolve(&graph, &DefaultPathResolver),
            Some(Resolved::Component(transform))
        );
    }

    #[test]
    fn test_path_key_resolves_operation_then_component() {
        let graph = graph();
        let cube = EntityId::new("Cube");
        let r = &DefaultPathResolver;

        let op = OperationKey::new(&cube, ComponentKind::Geometry, OperationCode::Modifier, "Modifier Subsurf")
            .find(&graph)
            .unwrap();
        assert_eq!(
            PathKey::new(&cube, "modifiers[\"Subsurf\"].levels").resolve(&graph, r),
            Some(Resolved::Node(op))
        );

        let geometry = graph.find_component(&cube, ComponentKind::Geometry, "").unwrap();
        assert_eq!(
            PathKey::new(&cube, "modifiers[\"Missing\"].levels").resolve(&graph, r),
            Some(Resolved::Component(geometry))
        );
        assert!(PathKey::new(&cube, "custom_prop").resolve(&graph, r).is_none());
    }

    #[test]
    fn test_key_display() {
        let cube = EntityId::new("Cube");
        assert_eq!(ComponentKey::bone(&cube, "Hand").to_string(), "ComponentKey(Cube, Bone, 'Hand')");
        assert_eq!(TimeSourceKey::global().to_string(), "TimeSourceKey(global)");
    }
}
