//! Graph construction.
//!
//! A build runs in fixed passes over a [`Scene`]:
//!
//! 1. [`NodeBuilder`] creates identifiers, components and operations, binds
//!    callbacks and designates component entry/exit operations.
//! 2. Instanced groups get an isolated nested graph each.
//! 3. [`RelationBuilder`] connects operations through lookup keys.
//! 4. Relations that close a cycle are marked (optional).
//! 5. Redundant relations are removed by transitive reduction (optional).

mod binder;
mod cycles;
mod keys;
mod nodes;
mod reduce;
mod relations;

pub use binder::{NoopBinder, OperationBinder, OperationSignature};
pub use cycles::{detect_cycles, find_cycles};
pub use keys::{
    ComponentKey, IdentifierKey, OperationKey, PathKey, RelationKey, Resolved, RootKey,
    TimeSourceKey,
};
pub use nodes::NodeBuilder;
pub use reduce::transitive_reduction;
pub use relations::RelationBuilder;

use std::time::Instant;

use crate::config::BuildConfig;
use crate::diagnostics::DiagnosticKind;
use crate::graph::{Depsgraph, EntityId};
use crate::scene::{DefaultPathResolver, PathResolver, Scene};

/// Operation names shared by the node and relation builders.
pub mod names {
    pub const ENTRY: &str = "Entry";
    pub const EXIT: &str = "Exit";
    pub const PASSTHROUGH: &str = "Pass Through";

    pub const ANIMATION: &str = "Animation";
    pub const LOCAL_TRANSFORM: &str = "Local Transform";
    pub const PARENT: &str = "Parent";
    pub const CONSTRAINT_STACK: &str = "Constraint Stack";
    pub const TRANSFORM_FINAL: &str = "Final Transform";

    pub const GEOMETRY_EVAL: &str = "Geometry Eval";
    pub const GEOMETRY_FINAL: &str = "Geometry Final";

    pub const POSE_REBUILD: &str = "Rebuild Pose";
    pub const POSE_INIT: &str = "Init Pose";
    pub const POSE_FLUSH: &str = "Flush Pose";
    pub const BONE_LOCAL: &str = "Bone Local";
    pub const BONE_CONSTRAINTS: &str = "Bone Constraints";
    pub const BONE_DONE: &str = "Bone Done";

    pub const RIGIDBODY_REBUILD: &str = "Rebuild Rigid Body World";
    pub const RIGIDBODY_SIMULATE: &str = "Simulate Rigid Body World";
    pub const RIGIDBODY_SYNC: &str = "Rigid Body Sync";

    pub fn driver(path: &str) -> String {
        format!("Driver {path}")
    }

    pub fn modifier(name: &str) -> String {
        format!("Modifier {name}")
    }

    pub fn particle_system(name: &str) -> String {
        format!("Particle System {name}")
    }

    pub fn ik_solver(bone: &str) -> String {
        format!("IK Solver {bone}")
    }

    pub fn spline_ik_solver(bone: &str) -> String {
        format!("Spline IK Solver {bone}")
    }
}

/// Build the graph of a scene with the default resolver and settings.
pub fn build(scene: &Scene, binder: &dyn OperationBinder) -> Depsgraph {
    build_with(scene, binder, &DefaultPathResolver, &BuildConfig::default())
}

/// Build the graph of a scene.
///
/// Never fails: missing references and structural problems are reported
/// through [`Depsgraph::diagnostics`] and the affected relations skipped.
pub fn build_with(
    scene: &Scene,
    binder: &dyn OperationBinder,
    resolver: &dyn PathResolver,
    config: &BuildConfig,
) -> Depsgraph {
    let mut graph = Depsgraph::new();
    build_into(&mut graph, scene, binder, resolver, config, &mut Vec::new());
    graph
}

/// Run every build pass into `graph`, which is expected to be empty.
///
/// `groups` holds the instanced groups currently being expanded, so a group
/// that (indirectly) instances itself is reported instead of recursing.
fn build_into(
    graph: &mut Depsgraph,
    scene: &Scene,
    binder: &dyn OperationBinder,
    resolver: &dyn PathResolver,
    config: &BuildConfig,
    groups: &mut Vec<String>,
) {
    let start = Instant::now();

    NodeBuilder::new(graph, binder)
        .with_scene_entities(scene)
        .build_scene(scene);
    build_subgraphs(graph, scene, binder, resolver, config, groups);
    RelationBuilder::new(graph, resolver).build_scene(scene);

    let cyclic = if config.detect_cycles { detect_cycles(graph) } else { 0 };
    let removed = if config.transitive_reduction {
        transitive_reduction(graph)
    } else {
        0
    };

    let summary = format!(
        "built '{}': {} operations, {} relations ({} removed, {} cyclic) in {:?}",
        scene.name,
        graph.operations().len(),
        graph.relation_count(),
        removed,
        cyclic,
        start.elapsed()
    );
    if groups.is_empty() {
        tracing::info!("{}", summary);
    } else {
        tracing::debug!("{}", summary);
    }
}

fn build_subgraphs(
    graph: &mut Depsgraph,
    scene: &Scene,
    binder: &dyn OperationBinder,
    resolver: &dyn PathResolver,
    config: &BuildConfig,
    groups: &mut Vec<String>,
) {
    for entity in &scene.entities {
        let Some(name) = &entity.instance_group else {
            continue;
        };
        let Some(group) = scene.group(name) else {
            graph.diagnostics().report(
                DiagnosticKind::Lookup,
                format!("'{}' instances unknown group '{name}'", entity.id),
            );
            continue;
        };
        if groups.contains(name) {
            graph.diagnostics().report(
                DiagnosticKind::Structural,
                format!("group '{name}' instances itself through '{}'; not expanded", entity.id),
            );
            continue;
        }

        let members = Scene {
            name: format!("{}/{name}", scene.name),
            frame: scene.frame,
            entities: group
                .entities
                .iter()
                .filter_map(|id| scene.entity(id))
                .cloned()
                .collect(),
            groups: scene.groups.clone(),
            rigidbody_world: None,
        };

        groups.push(name.clone());
        let mut nested = Depsgraph::new();
        build_into(&mut nested, &members, binder, resolver, config, groups);
        groups.pop();

        for diagnostic in nested.diagnostics().take() {
            graph
                .diagnostics()
                .report(diagnostic.kind, format!("[group {name}] {}", diagnostic.message));
        }
        graph.add_subgraph(&entity.id, name, nested);
    }
}

/// Rebuild a graph whose relations were invalidated, keeping its tags.
///
/// Does nothing unless [`Depsgraph::tag_relations_update`] was called since
/// the last build. Returns whether a rebuild happened.
pub fn rebuild_if_needed(graph: &mut Depsgraph, scene: &Scene, binder: &dyn OperationBinder) -> bool {
    rebuild_if_needed_with(graph, scene, binder, &DefaultPathResolver, &BuildConfig::default())
}

/// [`rebuild_if_needed`] with an explicit resolver and settings.
pub fn rebuild_if_needed_with(
    graph: &mut Depsgraph,
    scene: &Scene,
    binder: &dyn OperationBinder,
    resolver: &dyn PathResolver,
    config: &BuildConfig,
) -> bool {
    if !graph.need_update {
        return false;
    }

    let mut tagged: Vec<EntityId> = Vec::new();
    let mut time_tagged = false;
    for &node in &graph.entry_tags {
        match graph.node(node) {
            Some(n) if n.is_time_source() && n.owner().is_none() => time_tagged = true,
            Some(n) => {
                if let Some(owner) = n.owner() {
                    if !tagged.contains(owner) {
                        tagged.push(owner.clone());
                    }
                }
            }
            None => {}
        }
    }
    for owner in std::mem::take(&mut graph.retag) {
        if !tagged.contains(&owner) {
            tagged.push(owner);
        }
    }

    let stale = graph.diagnostics().take();
    tracing::debug!(
        "rebuilding graph: {} tagged entities, {} old diagnostics dropped",
        tagged.len(),
        stale.len()
    );

    graph.clear();
    build_into(graph, scene, binder, resolver, config, &mut Vec::new());
    graph.need_update = false;

    for owner in &tagged {
        if graph.find_entity(owner).is_some() {
            graph.tag_entity(owner);
        }
    }
    if time_tagged {
        graph.tag_time_source();
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ComponentKind, OperationCode};
    use crate::scene::{Entity, EntityKind, Group, ParentLink};

    fn instancing_scene() -> Scene {
        let mut instancer = Entity::new("Instancer", EntityKind::Empty);
        instancer.instance_group = Some("Props".to_string());
        let mut scene = Scene::new("Scene")
            .with_entity(Entity::new("Chair", EntityKind::Mesh))
            .with_entity(instancer);
        scene.groups.push(Group {
            name: "Props".to_string(),
            entities: vec![EntityId::new("Chair")],
        });
        scene
    }

    #[test]
    fn test_build_chain_is_reduced() {
        let mut child = Entity::new("Child", EntityKind::Empty);
        child.parent = Some(ParentLink {
            entity: EntityId::new("Parent"),
            ..Default::default()
        });
        let scene = Scene::new("Scene")
            .with_entity(Entity::new("Parent", EntityKind::Empty))
            .with_entity(child);

        let graph = build(&scene, &NoopBinder);
        let child = EntityId::new("Child");
        let entry = graph
            .component(graph.find_component(&child, ComponentKind::Transform, "").unwrap())
            .unwrap()
            .entry()
            .unwrap();
        let last = graph.find_operation_by_name(&child, names::TRANSFORM_FINAL).unwrap();

        // Entry -> Local -> Parent -> Final makes the barrier edge to Final redundant.
        assert!(!graph.has_relation(entry, last));
        assert!(graph.check_acyclic().is_ok());
    }

    #[test]
    fn test_reduction_can_be_disabled() {
        let scene = Scene::new("Scene").with_entity(Entity::new("Cube", EntityKind::Empty));
        let reduced = build(&scene, &NoopBinder);
        let full = build_with(
            &scene,
            &NoopBinder,
            &DefaultPathResolver,
            &BuildConfig::default().with_transitive_reduction(false),
        );
        assert!(full.relation_count() > reduced.relation_count());
    }

    #[test]
    fn test_instanced_group_builds_subgraph() {
        let scene = instancing_scene();
        let graph = build(&scene, &NoopBinder);

        assert_eq!(graph.subgraphs().len(), 1);
        let node = graph.node(graph.subgraphs()[0]).unwrap();
        assert_eq!(node.owner(), Some(&EntityId::new("Instancer")));
        let nested = node.as_subgraph().unwrap();
        assert_eq!(nested.group(), "Props");
        assert!(nested
            .graph()
            .find_operation_by_name(&EntityId::new("Chair"), names::GEOMETRY_EVAL)
            .is_some());
        assert!(nested.graph().find_entity(&EntityId::new("Instancer")).is_none());
    }

    #[test]
    fn test_recursive_group_is_reported() {
        let mut scene = instancing_scene();
        scene.groups[0].entities.push(EntityId::new("Instancer"));
        let graph = build(&scene, &NoopBinder);

        assert_eq!(graph.subgraphs().len(), 1);
        assert_eq!(graph.diagnostics().count(DiagnosticKind::Structural), 1);
    }

    #[test]
    fn test_rebuild_only_when_requested() {
        let scene = Scene::new("Scene").with_entity(Entity::new("Cube", EntityKind::Mesh));
        let mut graph = build(&scene, &NoopBinder);
        assert!(!rebuild_if_needed(&mut graph, &scene, &NoopBinder));

        graph.tag_relations_update();
        assert!(rebuild_if_needed(&mut graph, &scene, &NoopBinder));
        assert!(!graph.need_update());
    }

    #[test]
    fn test_rebuild_reapplies_tags() {
        let scene = Scene::new("Scene")
            .with_entity(Entity::new("Cube", EntityKind::Mesh))
            .with_entity(Entity::new("Lamp", EntityKind::Lamp));
        let mut graph = build(&scene, &NoopBinder);
        let cube = EntityId::new("Cube");

        graph.tag_entity(&cube);
        graph.tag_relations_update();
        graph.tag_entity(&EntityId::new("Lamp"));
        let old = graph.find_operation_by_name(&cube, names::GEOMETRY_EVAL).unwrap();

        assert!(rebuild_if_needed(&mut graph, &scene, &NoopBinder));
        assert!(graph.node(old).is_none());

        for name in ["Cube", "Lamp"] {
            let id = EntityId::new(name);
            let ops = graph.entity_operations(&id);
            assert!(!ops.is_empty());
            assert!(ops.iter().all(|&op| graph.operation(op).unwrap().needs_update()));
        }
        let local = graph
            .find_operation(&cube, ComponentKind::Transform, "", OperationCode::LocalTransform, names::LOCAL_TRANSFORM)
            .unwrap();
        assert!(graph.entry_tags.contains(&local));
    }
}
