//! First construction pass: identifiers, components and operations.

use rustc_hash::FxHashSet;

use super::binder::{OperationBinder, OperationSignature};
use super::names;
use crate::diagnostics::DiagnosticKind;
use crate::eval::OperationCallback;
use crate::graph::{
    ComponentKind, Depsgraph, EntityId, NodeId, NodeType, OperationCode, OperationRole,
    RelationKind,
};
use crate::scene::{Entity, EntityKind, Pose, Scene};

/// Creates every node of the graph. Never creates relations, except the
/// barrier edges that designate component entry and exit operations.
pub struct NodeBuilder<'a> {
    graph: &'a mut Depsgraph,
    binder: &'a dyn OperationBinder,
    /// Entities of the scene being built; `None` accepts any entity.
    known: Option<FxHashSet<EntityId>>,
}

impl<'a> NodeBuilder<'a> {
    pub fn new(graph: &'a mut Depsgraph, binder: &'a dyn OperationBinder) -> Self {
        Self {
            graph,
            binder,
            known: None,
        }
    }

    /// Restrict operation owners to the entities of `scene`.
    pub fn with_scene_entities(mut self, scene: &Scene) -> Self {
        let mut known: FxHashSet<EntityId> = scene.entities.iter().map(|e| e.id.clone()).collect();
        known.insert(scene.id());
        self.known = Some(known);
        self
    }

    fn is_known(&self, id: &EntityId) -> bool {
        self.known.as_ref().is_none_or(|known| known.contains(id))
    }

    /// Find the node with the given identity, creating it if needed.
    ///
    /// Operations created this way are placeholders (role `Exec`, no
    /// callback) until [`NodeBuilder::add_operation`] fills them in.
    pub fn get_or_create(&mut self, entity: &EntityId, subpath: &str, kind: NodeType, name: &str) -> NodeId {
        match kind {
            NodeType::Root => self.graph.ensure_root(),
            NodeType::TimeSource => self.graph.ensure_time_source(Some(entity)),
            NodeType::Identifier => self.graph.ensure_identifier(entity),
            NodeType::Component(component) => self.graph.ensure_component(entity, component, subpath),
            NodeType::Operation { component, opcode } => {
                let component = self.graph.ensure_component(entity, component, subpath);
                self.graph
                    .ensure_operation(component, opcode, name, OperationRole::Exec)
                    .map(|(op, _)| op)
                    .unwrap_or_else(|| unreachable!("ensure_component returns a component"))
            }
            NodeType::Subgraph => self.graph.add_subgraph(entity, name, Depsgraph::new()),
        }
    }

    /// Create (or complete) an operation and its component.
    ///
    /// Returns `None` when the owning entity is not part of the scene.
    #[allow(clippy::too_many_arguments)]
    pub fn add_operation(
        &mut self,
        entity: &EntityId,
        subpath: &str,
        kind: ComponentKind,
        role: OperationRole,
        callback: Option<OperationCallback>,
        opcode: OperationCode,
        name: &str,
    ) -> Option<NodeId> {
        if !self.is_known(entity) {
            self.graph.diagnostics().report(
                DiagnosticKind::Lookup,
                format!("operation '{name}' skipped: entity '{entity}' is not in the scene"),
            );
            return None;
        }
        let component = self.graph.ensure_component(entity, kind, subpath);
        let (op, _) = self.graph.ensure_operation(component, opcode, name, role)?;
        if let Some(node) = self.graph.operation_mut(op) {
            node.role = role;
            if callback.is_some() {
                node.callback = callback;
            }
        }
        Some(op)
    }

    /// Add an operation whose callback comes from the binder.
    fn bind_operation(
        &mut self,
        entity: &EntityId,
        subpath: &str,
        kind: ComponentKind,
        role: OperationRole,
        opcode: OperationCode,
        name: &str,
    ) -> Option<NodeId> {
        let signature = OperationSignature {
            entity,
            component: kind,
            subpath,
            opcode,
            role,
            name,
        };
        let callback = self.binder.bind(&signature);
        self.add_operation(entity, subpath, kind, role, callback, opcode, name)
    }

    fn synthetic_operation(&mut self, component: NodeId, name: &str, role: OperationRole) -> Option<NodeId> {
        let (op, _) = self
            .graph
            .ensure_operation(component, OperationCode::Noop, name, role)?;
        if let Some(node) = self.graph.operation_mut(op) {
            node.synthetic = true;
        }
        Some(op)
    }

    /// Designate exactly one entry and one exit operation of a component.
    ///
    /// Entry candidates have role `Init` or no inbound relations, exit
    /// candidates role `Post` or no outbound relations. A single candidate is
    /// used directly; several get a no-op barrier in front (behind) them.
    /// Safe to call repeatedly: barriers and their edges are created once.
    pub fn verify_entry_exit(&mut self, component: NodeId) {
        let Some(ops) = self.graph.component(component).map(|c| c.operations().to_vec()) else {
            return;
        };
        let mut real = Vec::new();
        let mut entry_barrier = None;
        let mut exit_barrier = None;
        let mut passthrough = None;
        for &op in &ops {
            let (Some(node), Some(operation)) = (self.graph.node(op), self.graph.operation(op)) else {
                continue;
            };
            if !operation.synthetic {
                real.push(op);
            } else if node.name() == names::ENTRY {
                entry_barrier = Some(op);
            } else if node.name() == names::EXIT {
                exit_barrier = Some(op);
            } else if node.name() == names::PASSTHROUGH {
                passthrough = Some(op);
            }
        }

        if real.is_empty() {
            let op = match passthrough {
                Some(op) => Some(op),
                None => self.synthetic_operation(component, names::PASSTHROUGH, OperationRole::Exec),
            };
            if let Some(op) = op {
                self.graph.set_component_entry(component, op);
                self.graph.set_component_exit(component, op);
            }
            return;
        }

        let entry_candidates: Vec<NodeId> = real
            .iter()
            .copied()
            .filter(|&op| {
                self.graph.operation(op).is_some_and(|o| o.role == OperationRole::Init)
                    || self.graph.node(op).is_some_and(|n| n.inlinks().is_empty())
            })
            .collect();
        let exit_candidates: Vec<NodeId> = real
            .iter()
            .copied()
            .filter(|&op| {
                self.graph.operation(op).is_some_and(|o| o.role == OperationRole::Post)
                    || self.graph.node(op).is_some_and(|n| n.outlinks().is_empty())
            })
            .collect();

        let entry = self.designate(component, &real, &entry_candidates, entry_barrier, true);
        let exit = self.designate(component, &real, &exit_candidates, exit_barrier, false);
        if let Some(entry) = entry {
            self.graph.set_component_entry(component, entry);
        }
        if let Some(exit) = exit {
            self.graph.set_component_exit(component, exit);
        }
    }

    fn designate(
        &mut self,
        component: NodeId,
        real: &[NodeId],
        candidates: &[NodeId],
        barrier: Option<NodeId>,
        entry: bool,
    ) -> Option<NodeId> {
        let barrier = match (barrier, candidates.len()) {
            (Some(barrier), _) => barrier,
            (None, 1) => return Some(candidates[0]),
            (None, 0) => {
                let current = self
                    .graph
                    .component(component)
                    .and_then(|c| if entry { c.entry() } else { c.exit() })
                    .filter(|op| real.contains(op));
                if current.is_some() {
                    return current;
                }
                tracing::warn!(
                    "{}: operations form a loop inside the component",
                    self.graph.describe(component)
                );
                self.graph.diagnostics().report(
                    DiagnosticKind::Structural,
                    format!(
                        "{}: no {} candidate, using first operation",
                        self.graph.describe(component),
                        if entry { "entry" } else { "exit" }
                    ),
                );
                return real.first().copied();
            }
            (None, n) => {
                tracing::debug!(
                    "{}: {} {} candidates, adding barrier",
                    self.graph.describe(component),
                    n,
                    if entry { "entry" } else { "exit" }
                );
                if entry {
                    self.synthetic_operation(component, names::ENTRY, OperationRole::Init)?
                } else {
                    self.synthetic_operation(component, names::EXIT, OperationRole::Out)?
                }
            }
        };

        for &op in candidates {
            let (from, to) = if entry { (barrier, op) } else { (op, barrier) };
            if !self.graph.has_relation(from, to) {
                let label = if entry { "Component Entry" } else { "Component Exit" };
                self.graph.add_relation(from, to, RelationKind::Operation, label);
            }
        }
        Some(barrier)
    }

    /// Run [`NodeBuilder::verify_entry_exit`] on every component of an entity.
    pub fn verify_entity_entry_exit(&mut self, id: &EntityId) {
        let components: Vec<NodeId> = self
            .graph
            .find_entity(id)
            .and_then(|node| self.graph.node(node))
            .and_then(|node| node.as_identifier())
            .map(|ident| ident.components().collect())
            .unwrap_or_default();
        for component in components {
            self.verify_entry_exit(component);
        }
    }

    /// Run [`NodeBuilder::verify_entry_exit`] on every component of the graph.
    pub fn verify_all_entry_exit(&mut self) {
        let entities: Vec<EntityId> = self.graph.entities().map(|(id, _)| id.clone()).collect();
        for id in entities {
            self.verify_entity_entry_exit(&id);
        }
    }

    /// Create all nodes for a scene.
    pub fn build_scene(&mut self, scene: &Scene) {
        self.graph.ensure_root();
        let ts = self.graph.ensure_time_source(None);
        if let Some(ts) = self.graph.node_mut(ts).and_then(|n| n.as_time_source_mut()) {
            ts.frame = scene.frame;
        }
        self.graph.ensure_identifier(&scene.id());

        for entity in &scene.entities {
            self.build_entity(entity, scene.frame);
        }
        self.build_rigidbody_world(scene);
        self.verify_all_entry_exit();

        tracing::debug!(
            "built {} operations for {} entities",
            self.graph.operations().len(),
            scene.entities.len()
        );
    }

    fn build_entity(&mut self, entity: &Entity, frame: f64) {
        let id = &entity.id;
        self.graph.ensure_identifier(id);

        if let Some(offset) = entity.time_offset {
            let ts = self.graph.ensure_time_source(Some(id));
            if let Some(ts) = self.graph.node_mut(ts).and_then(|n| n.as_time_source_mut()) {
                ts.offset = offset;
                ts.frame = frame + offset;
            }
        }

        if entity.kind.is_data() {
            self.bind_operation(
                id,
                "",
                ComponentKind::Geometry,
                OperationRole::Exec,
                OperationCode::GeometryEval,
                names::GEOMETRY_EVAL,
            );
        } else {
            self.build_object(entity);
        }

        if entity.animation.is_some() {
            self.bind_operation(
                id,
                "",
                ComponentKind::Animation,
                OperationRole::Exec,
                OperationCode::AnimationEval,
                names::ANIMATION,
            );
        }
        for driver in &entity.drivers {
            self.bind_operation(
                id,
                "",
                ComponentKind::Parameters,
                OperationRole::Exec,
                OperationCode::Driver,
                &names::driver(&driver.path),
            );
        }

        self.verify_entity_entry_exit(id);
    }

    fn build_object(&mut self, entity: &Entity) {
        let id = &entity.id;
        let transform = ComponentKind::Transform;

        self.bind_operation(id, "", transform, OperationRole::Init, OperationCode::LocalTransform, names::LOCAL_TRANSFORM);
        if entity.parent.is_some() {
            self.bind_operation(id, "", transform, OperationRole::Exec, OperationCode::Parent, names::PARENT);
        }
        if !entity.constraints.is_empty() {
            self.bind_operation(id, "", transform, OperationRole::Exec, OperationCode::Constraints, names::CONSTRAINT_STACK);
        }
        self.bind_operation(id, "", transform, OperationRole::Post, OperationCode::TransformFinal, names::TRANSFORM_FINAL);

        if entity.kind.has_geometry() {
            let geometry = ComponentKind::Geometry;
            self.bind_operation(id, "", geometry, OperationRole::Init, OperationCode::GeometryEval, names::GEOMETRY_EVAL);
            for modifier in &entity.modifiers {
                self.bind_operation(
                    id,
                    "",
                    geometry,
                    OperationRole::Exec,
                    OperationCode::Modifier,
                    &names::modifier(&modifier.name),
                );
            }
            self.bind_operation(id, "", geometry, OperationRole::Post, OperationCode::GeometryFinal, names::GEOMETRY_FINAL);
        }

        if let Some(data) = &entity.data {
            if !self.is_known(data) {
                self.graph.diagnostics().report(
                    DiagnosticKind::Lookup,
                    format!("'{id}' references geometry datablock '{data}' which is not in the scene"),
                );
            }
        }

        for psys in &entity.particle_systems {
            self.bind_operation(
                id,
                "",
                ComponentKind::EvalParticles,
                OperationRole::Exec,
                OperationCode::ParticleSystem,
                &names::particle_system(&psys.name),
            );
        }

        if entity.kind == EntityKind::Armature {
            if let Some(pose) = &entity.pose {
                self.build_pose(id, pose);
            }
        }
    }

    fn build_pose(&mut self, id: &EntityId, pose: &Pose) {
        let eval_pose = ComponentKind::EvalPose;
        self.bind_operation(id, "", eval_pose, OperationRole::Rebuild, OperationCode::PoseRebuild, names::POSE_REBUILD);
        self.bind_operation(id, "", eval_pose, OperationRole::Init, OperationCode::PoseInit, names::POSE_INIT);

        for bone in &pose.bones {
            let name = bone.name.as_str();
            self.bind_operation(id, name, ComponentKind::Bone, OperationRole::Init, OperationCode::BoneLocal, names::BONE_LOCAL);
            if !bone.constraints.is_empty() {
                self.bind_operation(
                    id,
                    name,
                    ComponentKind::Bone,
                    OperationRole::Exec,
                    OperationCode::BoneConstraints,
                    names::BONE_CONSTRAINTS,
                );
            }
            self.bind_operation(id, name, ComponentKind::Bone, OperationRole::Post, OperationCode::BoneDone, names::BONE_DONE);

            if let Some(ik) = &bone.ik {
                let (opcode, solver) = if ik.spline {
                    (OperationCode::SplineIkSolver, names::spline_ik_solver(name))
                } else {
                    (OperationCode::IkSolver, names::ik_solver(name))
                };
                self.bind_operation(id, "", eval_pose, OperationRole::Sim, opcode, &solver);
            }
        }

        self.bind_operation(id, "", eval_pose, OperationRole::Post, OperationCode::PoseFlush, names::POSE_FLUSH);
    }

    fn build_rigidbody_world(&mut self, scene: &Scene) {
        let Some(world) = &scene.rigidbody_world else {
            return;
        };
        let scene_id = scene.id();
        let transform = ComponentKind::Transform;
        self.bind_operation(&scene_id, "", transform, OperationRole::Rebuild, OperationCode::RigidBodyRebuild, names::RIGIDBODY_REBUILD);
        self.bind_operation(&scene_id, "", transform, OperationRole::Sim, OperationCode::RigidBodySimulate, names::RIGIDBODY_SIMULATE);

        for member in rigidbody_members(scene, world) {
            if scene.entity(&member).is_some_and(|e| !e.kind.is_data()) {
                self.bind_operation(&member, "", transform, OperationRole::Exec, OperationCode::RigidBodySync, names::RIGIDBODY_SYNC);
            } else {
                self.graph.diagnostics().report(
                    DiagnosticKind::Lookup,
                    format!("rigid body member '{member}' is not an object of the scene"),
                );
            }
        }
    }
}

/// World members plus every entity flagged as a rigid body, without repeats.
pub(crate) fn rigidbody_members(scene: &Scene, world: &crate::scene::RigidBodyWorld) -> Vec<EntityId> {
    let mut members: Vec<EntityId> = Vec::new();
    let flagged = scene.entities.iter().filter(|e| e.rigid_body).map(|e| &e.id);
    for id in world.members.iter().chain(flagged) {
        if !members.contains(id) {
            members.push(id.clone());
        }
    }
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::NoopBinder;
    use rstest::rstest;

    fn component_of(graph: &Depsgraph, entity: &str, kind: ComponentKind) -> NodeId {
        graph.find_component(&EntityId::new(entity), kind, "").unwrap()
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut graph = Depsgraph::new();
        let mut builder = NodeBuilder::new(&mut graph, &NoopBinder);
        let cube = EntityId::new("Cube");
        let kind = NodeType::Operation {
            component: ComponentKind::Transform,
            opcode: OperationCode::Generic,
        };

        let a = builder.get_or_create(&cube, "", kind, "step");
        let b = builder.get_or_create(&cube, "", kind, "step");
        assert_eq!(a, b);

        let ident = builder.get_or_create(&cube, "", NodeType::Identifier, "");
        assert_eq!(graph.find_entity(&cube), Some(ident));
        assert_eq!(graph.operations().len(), 1);
        assert_eq!(graph.operation(a).unwrap().role(), OperationRole::Exec);
    }

    #[test]
    fn test_add_operation_completes_placeholder() {
        let mut graph = Depsgraph::new();
        let mut builder = NodeBuilder::new(&mut graph, &NoopBinder);
        let cube = EntityId::new("Cube");
        let placeholder = builder.get_or_create(
            &cube,
            "",
            NodeType::Operation {
                component: ComponentKind::Geometry,
                opcode: OperationCode::GeometryEval,
            },
            "Geometry Eval",
        );
        let callback = crate::eval::callback(|_, _| Ok(()));
        let op = builder
            .add_operation(
                &cube,
                "",
                ComponentKind::Geometry,
                OperationRole::Init,
                Some(callback),
                OperationCode::GeometryEval,
                "Geometry Eval",
            )
            .unwrap();

        assert_eq!(op, placeholder);
        let node = graph.operation(op).unwrap();
        assert_eq!(node.role(), OperationRole::Init);
        assert!(node.has_callback());
        assert_eq!(graph.operations().len(), 1);
    }

    #[test]
    fn test_unknown_owner_is_skipped() {
        let scene = Scene::new("Scene").with_entity(Entity::new("Cube", EntityKind::Mesh));
        let mut graph = Depsgraph::new();
        let mut builder = NodeBuilder::new(&mut graph, &NoopBinder).with_scene_entities(&scene);
        let op = builder.add_operation(
            &EntityId::new("Ghost"),
            "",
            ComponentKind::Transform,
            OperationRole::Exec,
            None,
            OperationCode::Generic,
            "anything",
        );
        assert!(op.is_none());
        assert!(graph.find_entity(&EntityId::new("Ghost")).is_none());
        assert_eq!(graph.diagnostics().count(DiagnosticKind::Lookup), 1);
    }

    #[rstest]
    #[case::single(1)]
    #[case::pair(2)]
    #[case::many(5)]
    fn test_entry_exit_designation(#[case] count: usize) {
        let mut graph = Depsgraph::new();
        let mut builder = NodeBuilder::new(&mut graph, &NoopBinder);
        let cube = EntityId::new("Cube");
        let ops: Vec<NodeId> = (0..count)
            .map(|i| {
                builder
                    .add_operation(
                        &cube,
                        "",
                        ComponentKind::Parameters,
                        OperationRole::Exec,
                        None,
                        OperationCode::Generic,
                        &format!("op{i}"),
                    )
                    .unwrap()
            })
            .collect();
        let component = builder.graph.find_component(&cube, ComponentKind::Parameters, "").unwrap();
        builder.verify_entry_exit(component);
        builder.verify_entry_exit(component);

        let c = graph.component(component).unwrap();
        let (entry, exit) = (c.entry().unwrap(), c.exit().unwrap());
        if count == 1 {
            assert_eq!(entry, ops[0]);
            assert_eq!(exit, ops[0]);
            assert_eq!(graph.relation_count(), 0);
        } else {
            assert!(graph.operation(entry).unwrap().is_synthetic());
            assert!(graph.operation(exit).unwrap().is_synthetic());
            assert_eq!(graph.operation(entry).unwrap().opcode(), OperationCode::Noop);
            for &op in &ops {
                assert!(graph.has_relation(entry, op));
                assert!(graph.has_relation(op, exit));
            }
            // Repeated verification adds neither barriers nor edges.
            assert_eq!(graph.relation_count(), 2 * count);
            assert_eq!(graph.operations().len(), count + 2);
        }
    }

    #[test]
    fn test_empty_component_gets_passthrough() {
        let mut graph = Depsgraph::new();
        let mut builder = NodeBuilder::new(&mut graph, &NoopBinder);
        let cube = EntityId::new("Cube");
        let component = builder.get_or_create(&cube, "", NodeType::Component(ComponentKind::Proxy), "");
        builder.verify_entry_exit(component);

        let c = graph.component(component).unwrap();
        assert_eq!(c.entry(), c.exit());
        let op = graph.operation(c.entry().unwrap()).unwrap();
        assert!(op.is_synthetic());
        assert_eq!(op.opcode().cost(), 0.0);
    }

    #[test]
    fn test_build_object_operations() {
        let mut cube = Entity::new("Cube", EntityKind::Mesh);
        cube.modifiers.push(crate::scene::Modifier {
            name: "Subsurf".to_string(),
            ..Default::default()
        });
        let scene = Scene::new("Scene").with_entity(cube);

        let mut graph = Depsgraph::new();
        NodeBuilder::new(&mut graph, &NoopBinder)
            .with_scene_entities(&scene)
            .build_scene(&scene);

        let cube = EntityId::new("Cube");
        assert!(graph.find_operation_by_name(&cube, names::LOCAL_TRANSFORM).is_some());
        assert!(graph.find_operation_by_name(&cube, names::TRANSFORM_FINAL).is_some());
        assert!(graph.find_operation_by_name(&cube, "Modifier Subsurf").is_some());
        assert!(graph.find_operation_by_name(&cube, names::PARENT).is_none());

        // Both transform operations are unlinked at node time, so barriers are added.
        let transform = graph.component(component_of(&graph, "Cube", ComponentKind::Transform)).unwrap();
        assert_eq!(graph.node(transform.entry().unwrap()).unwrap().name(), names::ENTRY);
        assert_eq!(graph.node(transform.exit().unwrap()).unwrap().name(), names::EXIT);
        assert!(graph.time_source().is_some());
    }

    #[test]
    fn test_rigidbody_world_adds_sync() {
        let mut ball = Entity::new("Ball", EntityKind::Mesh);
        ball.rigid_body = true;
        let mut scene = Scene::new("Scene").with_entity(ball);
        scene.rigidbody_world = Some(crate::scene::RigidBodyWorld {
            members: vec![EntityId::new("Ghost")],
        });

        let mut graph = Depsgraph::new();
        NodeBuilder::new(&mut graph, &NoopBinder)
            .with_scene_entities(&scene)
            .build_scene(&scene);

        assert!(graph
            .find_operation_by_name(&EntityId::new("Ball"), names::RIGIDBODY_SYNC)
            .is_some());
        assert!(graph
            .find_operation_by_name(&scene.id(), names::RIGIDBODY_SIMULATE)
            .is_some());
        assert_eq!(graph.diagnostics().count(DiagnosticKind::Lookup), 1);
    }
}
