//! Second construction pass: relations between existing operations.

use super::keys::{ComponentKey, IdentifierKey, OperationKey, PathKey, RelationKey, Resolved, TimeSourceKey};
use super::names;
use super::nodes::rigidbody_members;
use crate::diagnostics::DiagnosticKind;
use crate::graph::{ComponentKind, Depsgraph, EntityId, NodeId, OperationCode, RelationId, RelationKind};
use crate::scene::{
    Animation, Bone, Constraint, ConstraintTarget, Entity, EntityKind, ParentKind, ParentLink,
    PathResolver, Pose, Scene,
};

/// Connects the operations created by the node builder.
///
/// Relations are declared between keys; a key that does not resolve is
/// reported and the relation skipped, so a partially broken scene still
/// yields a usable graph.
pub struct RelationBuilder<'a> {
    graph: &'a mut Depsgraph,
    resolver: &'a dyn PathResolver,
}

impl<'a> RelationBuilder<'a> {
    pub fn new(graph: &'a mut Depsgraph, resolver: &'a dyn PathResolver) -> Self {
        Self { graph, resolver }
    }

    fn lookup<K: RelationKey + ?Sized>(&self, key: &K) -> Option<Resolved> {
        let resolved = key.resolve(self.graph, self.resolver);
        if resolved.is_none() {
            self.graph
                .diagnostics()
                .report(DiagnosticKind::Lookup, format!("{key} not found"));
        }
        resolved
    }

    /// Find the node a key names. Never creates anything.
    pub fn find<K: RelationKey + ?Sized>(&self, key: &K) -> Option<NodeId> {
        match self.lookup(key)? {
            Resolved::Node(node) | Resolved::Component(node) => Some(node),
        }
    }

    /// Add `from -> to` between the nodes two keys resolve to.
    ///
    /// Components attach through their exit operation as the source and their
    /// entry operation as the target. Skipped when either key is missing, and
    /// when an operation would depend on its own component (or the reverse).
    pub fn add_relation<F, T>(&mut self, from: &F, to: &T, kind: RelationKind, label: &str) -> Option<RelationId>
    where
        F: RelationKey + ?Sized,
        T: RelationKey + ?Sized,
    {
        let from_resolved = self.lookup(from)?;
        let to_resolved = self.lookup(to)?;

        let source = match from_resolved {
            Resolved::Node(node) => Some(node),
            Resolved::Component(c) => self.graph.component(c).and_then(|c| c.exit()),
        };
        let target = match to_resolved {
            Resolved::Node(node) => Some(node),
            Resolved::Component(c) => self.graph.component(c).and_then(|c| c.entry()),
        };
        let (Some(source), Some(target)) = (source, target) else {
            self.graph.diagnostics().report(
                DiagnosticKind::Structural,
                format!("{from} -> {to}: component has no entry/exit operation"),
            );
            return None;
        };

        let self_reference = match (from_resolved, to_resolved) {
            (Resolved::Component(c), _) if self.graph.owning_component(target) == Some(c) => true,
            (_, Resolved::Component(c)) if self.graph.owning_component(source) == Some(c) => true,
            _ => source == target,
        };
        if self_reference {
            tracing::debug!("skipping self-referential relation {} -> {} ({})", from, to, label);
            return None;
        }

        if let Some(existing) = self.graph.find_relation(source, target) {
            return Some(existing);
        }
        self.graph.add_relation(source, target, kind, label)
    }

    /// Connect everything in a scene.
    pub fn build_scene(&mut self, scene: &Scene) {
        for entity in &scene.entities {
            self.build_entity(scene, entity);
        }
        self.build_rigidbody_world(scene);

        tracing::debug!("built {} relations", self.graph.relation_count());
    }

    fn build_entity(&mut self, scene: &Scene, entity: &Entity) {
        let id = &entity.id;
        if entity.time_offset.is_some() {
            self.add_relation(
                &TimeSourceKey::global(),
                &TimeSourceKey::entity(id),
                RelationKind::Time,
                "[Time Offset]",
            );
        }

        if entity.kind.is_data() {
            self.build_datablock(entity);
        } else {
            self.build_object(scene, entity);
        }

        if let Some(animation) = &entity.animation {
            self.build_animation(entity, animation);
        }
        if !entity.drivers.is_empty() {
            self.build_drivers(entity);
        }
    }

    fn time_key(entity: &Entity) -> TimeSourceKey {
        if entity.time_offset.is_some() {
            TimeSourceKey::entity(&entity.id)
        } else {
            TimeSourceKey::global()
        }
    }

    fn build_object(&mut self, scene: &Scene, entity: &Entity) {
        let id = &entity.id;
        let transform = |opcode, name: &str| OperationKey::new(id, ComponentKind::Transform, opcode, name);

        let mut stack = vec![transform(OperationCode::LocalTransform, names::LOCAL_TRANSFORM)];
        if let Some(link) = &entity.parent {
            self.build_parent(entity, link);
            stack.push(transform(OperationCode::Parent, names::PARENT));
        }
        if !entity.constraints.is_empty() {
            let stack_key = transform(OperationCode::Constraints, names::CONSTRAINT_STACK);
            self.build_constraints(id, None, &entity.constraints, &stack_key, &Self::time_key(entity));
            stack.push(stack_key);
        }
        stack.push(transform(OperationCode::TransformFinal, names::TRANSFORM_FINAL));
        for pair in stack.windows(2) {
            self.add_relation(&pair[0], &pair[1], RelationKind::Operation, "[Transform Stack]");
        }

        if entity.kind.has_geometry() {
            self.build_geometry(scene, entity);
        }
        if !entity.particle_systems.is_empty() {
            self.build_particles(scene, entity);
        }
        if entity.kind == EntityKind::Armature {
            if let Some(pose) = &entity.pose {
                self.build_pose(entity, pose);
            }
        }
    }

    fn build_parent(&mut self, entity: &Entity, link: &ParentLink) {
        let id = &entity.id;
        let parent = &link.entity;
        if parent == id {
            self.graph.diagnostics().report(
                DiagnosticKind::Structural,
                format!("'{id}' is parented to itself; parent relation skipped"),
            );
            return;
        }
        let parent_op = OperationKey::new(id, ComponentKind::Transform, OperationCode::Parent, names::PARENT);
        let parent_transform = ComponentKey::new(parent, ComponentKind::Transform);

        match link.kind {
            ParentKind::Object => {
                self.add_relation(&parent_transform, &parent_op, RelationKind::Transform, "[ObParent]");
            }
            ParentKind::Bone => match &link.bone {
                Some(bone) => {
                    self.add_relation(&ComponentKey::bone(parent, bone), &parent_op, RelationKind::Transform, "[Bone Parent]");
                }
                None => {
                    self.graph.diagnostics().report(
                        DiagnosticKind::Lookup,
                        format!("'{id}' has a bone parent without a bone name"),
                    );
                    self.add_relation(&parent_transform, &parent_op, RelationKind::Transform, "[ObParent]");
                }
            },
            ParentKind::Vertex | ParentKind::CurveFollow => {
                self.add_relation(&parent_transform, &parent_op, RelationKind::Transform, "[ObParent]");
                let label = if link.kind == ParentKind::Vertex {
                    "[Vertex Parent]"
                } else {
                    "[Curve Follow Parent]"
                };
                self.add_relation(
                    &ComponentKey::new(parent, ComponentKind::Geometry),
                    &parent_op,
                    RelationKind::GeometryEval,
                    label,
                );
            }
            ParentKind::ArmatureDeform | ParentKind::LatticeDeform => {
                self.add_relation(&parent_transform, &parent_op, RelationKind::Transform, "[ObParent]");
                if entity.kind.has_geometry() {
                    let (deformer, label) = if link.kind == ParentKind::ArmatureDeform {
                        (ComponentKey::new(parent, ComponentKind::EvalPose), "[Armature Deform]")
                    } else {
                        (ComponentKey::new(parent, ComponentKind::Geometry), "[Lattice Deform]")
                    };
                    self.add_relation(
                        &deformer,
                        &ComponentKey::new(id, ComponentKind::Geometry),
                        RelationKind::GeometryEval,
                        label,
                    );
                }
            }
        }
    }

    /// Constraint targets feed `stack`. Object constraints (`bone == None`)
    /// skip targets naming the owner itself; bone constraints may target
    /// sibling bones of their own armature.
    fn build_constraints(
        &mut self,
        owner: &EntityId,
        bone: Option<&str>,
        constraints: &[Constraint],
        stack: &OperationKey,
        time: &TimeSourceKey,
    ) {
        for constraint in constraints {
            if constraint.time_dependent {
                self.add_relation(time, stack, RelationKind::Time, "[TimeSrc -> Constraint]");
            }
            for target in &constraint.targets {
                let own_target = &target.entity == owner
                    && match bone {
                        None => target.subtarget.is_none(),
                        Some(bone) => target.subtarget.as_deref() == Some(bone),
                    };
                if own_target {
                    tracing::debug!("constraint '{}' on '{}' targets its owner", constraint.name, owner);
                    continue;
                }
                let from = target_component(target, false);
                self.add_relation(&from, stack, RelationKind::Transform, &constraint.name);
            }
        }
    }

    fn build_geometry(&mut self, scene: &Scene, entity: &Entity) {
        let id = &entity.id;
        let geometry = |opcode, name: &str| OperationKey::new(id, ComponentKind::Geometry, opcode, name);
        let eval = geometry(OperationCode::GeometryEval, names::GEOMETRY_EVAL);

        self.add_relation(
            &ComponentKey::new(id, ComponentKind::Transform),
            &ComponentKey::new(id, ComponentKind::Geometry),
            RelationKind::ComponentOrder,
            "[Object Transform -> Geometry]",
        );

        if let Some(data) = &entity.data {
            // Unknown datablocks were already reported by the node pass.
            if scene.entity(data).is_some() {
                self.add_relation(
                    &ComponentKey::new(data, ComponentKind::Geometry),
                    &eval,
                    RelationKind::Datablock,
                    "[ObData Geometry]",
                );
            }
        }

        let time = Self::time_key(entity);
        let mut previous = eval;
        for modifier in &entity.modifiers {
            let key = geometry(OperationCode::Modifier, &names::modifier(&modifier.name));
            self.add_relation(&previous, &key, RelationKind::Operation, "[Modifier Stack]");
            if modifier.time_dependent {
                self.add_relation(&time, &key, RelationKind::Time, "[TimeSrc -> Modifier]");
            }
            for dependency in &modifier.dependencies {
                if &dependency.entity == id {
                    continue;
                }
                self.add_relation(
                    &ComponentKey::new(&dependency.entity, dependency.component),
                    &key,
                    RelationKind::GeometryEval,
                    &format!("[{} Dependency]", modifier.name),
                );
            }
            previous = key;
        }
        self.add_relation(
            &previous,
            &geometry(OperationCode::GeometryFinal, names::GEOMETRY_FINAL),
            RelationKind::Operation,
            "[Modifier Stack]",
        );
    }

    fn build_datablock(&mut self, entity: &Entity) {
        let Some(keys) = &entity.data else {
            return;
        };
        self.add_relation(
            &ComponentKey::new(keys, ComponentKind::Geometry),
            &OperationKey::new(&entity.id, ComponentKind::Geometry, OperationCode::GeometryEval, names::GEOMETRY_EVAL),
            RelationKind::GeometryEval,
            "[Shapekeys]",
        );
    }

    fn build_particles(&mut self, scene: &Scene, entity: &Entity) {
        let id = &entity.id;
        let time = Self::time_key(entity);
        let source = if entity.kind.has_geometry() {
            ComponentKind::Geometry
        } else {
            ComponentKind::Transform
        };

        for psys in &entity.particle_systems {
            let key = OperationKey::new(
                id,
                ComponentKind::EvalParticles,
                OperationCode::ParticleSystem,
                names::particle_system(&psys.name),
            );
            self.add_relation(&ComponentKey::new(id, source), &key, RelationKind::GeometryEval, "[Emitter]");
            self.add_relation(&time, &key, RelationKind::Time, "[TimeSrc -> PSys]");

            for effector in psys.effectors.iter().filter(|e| *e != id) {
                let kind = match scene.entity(effector) {
                    Some(e) if e.kind.has_geometry() => ComponentKind::Geometry,
                    _ => ComponentKind::Transform,
                };
                self.add_relation(&ComponentKey::new(effector, kind), &key, RelationKind::Standard, "[Effector]");
            }
            for target in psys.boid_targets.iter().filter(|t| *t != id) {
                self.add_relation(
                    &ComponentKey::new(target, ComponentKind::Transform),
                    &key,
                    RelationKind::Transform,
                    "[Boid Target]",
                );
            }
        }
    }

    fn build_pose(&mut self, entity: &Entity, pose: &Pose) {
        let id = &entity.id;
        let eval_pose = |opcode, name: &str| OperationKey::new(id, ComponentKind::EvalPose, opcode, name);
        let init = eval_pose(OperationCode::PoseInit, names::POSE_INIT);
        let flush = eval_pose(OperationCode::PoseFlush, names::POSE_FLUSH);

        self.add_relation(
            &eval_pose(OperationCode::PoseRebuild, names::POSE_REBUILD),
            &init,
            RelationKind::Operation,
            "[Pose Rebuild]",
        );
        self.add_relation(
            &ComponentKey::new(id, ComponentKind::Transform),
            &init,
            RelationKind::Transform,
            "[Object Transform -> Pose]",
        );

        let time = Self::time_key(entity);
        for bone in &pose.bones {
            let local = bone_op(id, &bone.name, OperationCode::BoneLocal, names::BONE_LOCAL);
            let done = bone_op(id, &bone.name, OperationCode::BoneDone, names::BONE_DONE);

            self.add_relation(&init, &local, RelationKind::Operation, "[Pose Init -> Bone]");
            if let Some(parent) = &bone.parent {
                match pose.bones.iter().find(|b| &b.name == parent) {
                    Some(parent_bone) => {
                        self.add_relation(&bone_ready(id, parent_bone), &local, RelationKind::Transform, "[Parent Bone]");
                    }
                    None => self.graph.diagnostics().report(
                        DiagnosticKind::Lookup,
                        format!("bone '{}' of '{id}' has unknown parent '{parent}'", bone.name),
                    ),
                }
            }

            if bone.constraints.is_empty() {
                self.add_relation(&local, &done, RelationKind::Operation, "[Bone Stack]");
            } else {
                let stack = bone_op(id, &bone.name, OperationCode::BoneConstraints, names::BONE_CONSTRAINTS);
                self.build_constraints(id, Some(&bone.name), &bone.constraints, &stack, &time);
                self.add_relation(&local, &stack, RelationKind::Operation, "[Bone Stack]");
                self.add_relation(&stack, &done, RelationKind::Operation, "[Bone Stack]");
            }
            self.add_relation(&done, &flush, RelationKind::Operation, "[Bone -> Pose Flush]");

            if bone.ik.is_some() {
                self.build_ik(id, pose, bone, &init);
            }
        }
    }

    /// IK solvers run after every chain bone is ready and before any of them
    /// is done.
    fn build_ik(&mut self, id: &EntityId, pose: &Pose, tip: &Bone, init: &OperationKey) {
        let Some(ik) = &tip.ik else {
            return;
        };
        let solver = if ik.spline {
            OperationKey::new(id, ComponentKind::EvalPose, OperationCode::SplineIkSolver, names::spline_ik_solver(&tip.name))
        } else {
            OperationKey::new(id, ComponentKind::EvalPose, OperationCode::IkSolver, names::ik_solver(&tip.name))
        };
        self.add_relation(init, &solver, RelationKind::Operation, "[Pose Init -> IK]");

        for target in ik.target.iter().chain(ik.pole.iter()) {
            if &target.entity == id && target.subtarget.as_deref() == Some(tip.name.as_str()) {
                continue;
            }
            let from = target_component(target, ik.spline);
            self.add_relation(&from, &solver, RelationKind::Transform, "[IK Target]");
        }

        // Bounded by the bone count so malformed parent loops terminate.
        let limit = match ik.chain_length {
            0 => pose.bones.len(),
            n => n.min(pose.bones.len()),
        };
        let mut bone = Some(tip);
        let mut length = 0;
        while let Some(current) = bone {
            self.add_relation(&bone_ready(id, current), &solver, RelationKind::Operation, "[IK Chain]");
            self.add_relation(
                &solver,
                &bone_op(id, &current.name, OperationCode::BoneDone, names::BONE_DONE),
                RelationKind::Operation,
                "[IK Result]",
            );
            length += 1;
            if length >= limit {
                break;
            }
            bone = current
                .parent
                .as_ref()
                .and_then(|parent| pose.bones.iter().find(|b| &b.name == parent));
        }
    }

    fn build_animation(&mut self, entity: &Entity, animation: &Animation) {
        let id = &entity.id;
        let anim = ComponentKey::new(id, ComponentKind::Animation);
        if animation.time_dependent {
            self.add_relation(&Self::time_key(entity), &anim, RelationKind::Time, "[TimeSrc -> Animation]");
        }

        if animation.channels.is_empty() {
            if entity.kind.is_data() {
                self.add_relation(&anim, &ComponentKey::new(id, ComponentKind::Geometry), RelationKind::Operation, "[Animation]");
            } else {
                self.add_relation(
                    &anim,
                    &OperationKey::new(id, ComponentKind::Transform, OperationCode::LocalTransform, names::LOCAL_TRANSFORM),
                    RelationKind::Operation,
                    "[Animation -> Local Transform]",
                );
            }
            return;
        }
        for channel in &animation.channels {
            self.add_relation(&anim, &PathKey::new(id, channel.as_str()), RelationKind::Operation, "[Animation]");
        }
    }

    fn build_drivers(&mut self, entity: &Entity) {
        let id = &entity.id;
        for driver in &entity.drivers {
            let key = OperationKey::new(id, ComponentKind::Parameters, OperationCode::Driver, names::driver(&driver.path));
            if entity.animation.is_some() {
                self.add_relation(
                    &ComponentKey::new(id, ComponentKind::Animation),
                    &key,
                    RelationKind::Driver,
                    "[AnimData Before Drivers]",
                );
            }
            self.add_relation(&key, &PathKey::new(id, driver.path.as_str()), RelationKind::Driver, "[Driver]");

            for variable in &driver.variables {
                let label = "[Driver Target]";
                match (&variable.bone, &variable.path) {
                    (Some(bone), _) => {
                        self.add_relation(&ComponentKey::bone(&variable.entity, bone), &key, RelationKind::DriverTarget, label)
                    }
                    (None, Some(path)) => {
                        self.add_relation(&PathKey::new(&variable.entity, path.as_str()), &key, RelationKind::DriverTarget, label)
                    }
                    (None, None) => {
                        self.add_relation(&IdentifierKey::new(&variable.entity), &key, RelationKind::DriverTarget, label)
                    }
                };
            }
        }
    }

    fn build_rigidbody_world(&mut self, scene: &Scene) {
        let Some(world) = &scene.rigidbody_world else {
            return;
        };
        let scene_id = scene.id();
        let rebuild = OperationKey::new(&scene_id, ComponentKind::Transform, OperationCode::RigidBodyRebuild, names::RIGIDBODY_REBUILD);
        let simulate = OperationKey::new(&scene_id, ComponentKind::Transform, OperationCode::RigidBodySimulate, names::RIGIDBODY_SIMULATE);
        let time = TimeSourceKey::global();

        self.add_relation(&time, &rebuild, RelationKind::Time, "[TimeSrc -> Rigidbody Reset/Rebuild]");
        self.add_relation(&time, &simulate, RelationKind::Time, "[TimeSrc -> Rigidbody Sim Step]");
        self.add_relation(&rebuild, &simulate, RelationKind::Operation, "[Rigidbody Rebuild -> Sim Step]");

        for member in rigidbody_members(scene, world) {
            if !scene.entity(&member).is_some_and(|e| !e.kind.is_data()) {
                continue;
            }
            let transform = |opcode, name: &str| OperationKey::new(&member, ComponentKind::Transform, opcode, name);
            let sync = transform(OperationCode::RigidBodySync, names::RIGIDBODY_SYNC);
            self.add_relation(
                &transform(OperationCode::LocalTransform, names::LOCAL_TRANSFORM),
                &sync,
                RelationKind::Transform,
                "[Object Transform -> RB Sync]",
            );
            self.add_relation(&simulate, &sync, RelationKind::Operation, "[Rigidbody Sim Eval -> RBO Sync]");
            self.add_relation(
                &sync,
                &transform(OperationCode::TransformFinal, names::TRANSFORM_FINAL),
                RelationKind::Transform,
                "[RB Sync -> Final Transform]",
            );
        }
    }
}

fn bone_op(id: &EntityId, bone: &str, opcode: OperationCode, name: &str) -> OperationKey {
    OperationKey::in_component(ComponentKey::bone(id, bone), opcode, name)
}

/// Last operation of a bone before IK: children and solvers read it.
fn bone_ready(id: &EntityId, bone: &Bone) -> OperationKey {
    if bone.constraints.is_empty() {
        bone_op(id, &bone.name, OperationCode::BoneLocal, names::BONE_LOCAL)
    } else {
        bone_op(id, &bone.name, OperationCode::BoneConstraints, names::BONE_CONSTRAINTS)
    }
}

/// Component of a constraint or IK target that the owner reads.
fn target_component(target: &ConstraintTarget, geometry: bool) -> ComponentKey {
    match &target.subtarget {
        Some(bone) => ComponentKey::bone(&target.entity, bone),
        None if geometry || target.geometry => ComponentKey::new(&target.entity, ComponentKind::Geometry),
        None => ComponentKey::new(&target.entity, ComponentKind::Transform),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{NodeBuilder, NoopBinder};
    use crate::graph::OperationRole;
    use crate::scene::DefaultPathResolver;

    fn nodes_only(scene: &Scene) -> Depsgraph {
        let mut graph = Depsgraph::new();
        NodeBuilder::new(&mut graph, &NoopBinder)
            .with_scene_entities(scene)
            .build_scene(scene);
        graph
    }

    fn op(graph: &Depsgraph, entity: &str, name: &str) -> NodeId {
        graph.find_operation_by_name(&EntityId::new(entity), name).unwrap()
    }

    #[test]
    fn test_missing_endpoint_skips_relation() {
        let scene = Scene::new("Scene").with_entity(Entity::new("Cube", EntityKind::Mesh));
        let mut graph = nodes_only(&scene);
        let before = graph.relation_count();

        let mut builder = RelationBuilder::new(&mut graph, &DefaultPathResolver);
        let ghost = ComponentKey::new(&EntityId::new("Ghost"), ComponentKind::Transform);
        let cube = ComponentKey::new(&EntityId::new("Cube"), ComponentKind::Transform);
        assert!(builder.add_relation(&ghost, &cube, RelationKind::Standard, "x").is_none());
        assert!(builder.find(&ghost).is_none());

        assert_eq!(graph.relation_count(), before);
        assert_eq!(graph.diagnostics().count(DiagnosticKind::Lookup), 2);
        assert!(graph.find_entity(&EntityId::new("Ghost")).is_none());
    }

    #[test]
    fn test_component_endpoints_use_exit_and_entry() {
        let scene = Scene::new("Scene")
            .with_entity(Entity::new("A", EntityKind::Empty))
            .with_entity(Entity::new("B", EntityKind::Empty));
        let mut graph = nodes_only(&scene);
        let (a, b) = (EntityId::new("A"), EntityId::new("B"));

        let rel = RelationBuilder::new(&mut graph, &DefaultPathResolver)
            .add_relation(
                &ComponentKey::new(&a, ComponentKind::Transform),
                &ComponentKey::new(&b, ComponentKind::Transform),
                RelationKind::Transform,
                "A -> B",
            )
            .unwrap();

        let a_exit = graph
            .component(graph.find_component(&a, ComponentKind::Transform, "").unwrap())
            .unwrap()
            .exit()
            .unwrap();
        let b_entry = graph
            .component(graph.find_component(&b, ComponentKind::Transform, "").unwrap())
            .unwrap()
            .entry()
            .unwrap();
        let relation = graph.relation(rel).unwrap();
        assert_eq!(relation.from(), a_exit);
        assert_eq!(relation.to(), b_entry);
    }

    #[test]
    fn test_self_reference_is_suppressed() {
        let scene = Scene::new("Scene").with_entity(Entity::new("A", EntityKind::Empty));
        let mut graph = nodes_only(&scene);
        let a = EntityId::new("A");
        let before = graph.relation_count();

        let mut builder = RelationBuilder::new(&mut graph, &DefaultPathResolver);
        let local = OperationKey::new(&a, ComponentKind::Transform, OperationCode::LocalTransform, names::LOCAL_TRANSFORM);
        let own = ComponentKey::new(&a, ComponentKind::Transform);
        assert!(builder.add_relation(&own, &local, RelationKind::Standard, "self").is_none());
        assert!(builder.add_relation(&local, &own, RelationKind::Standard, "self").is_none());
        assert_eq!(graph.relation_count(), before);
    }

    #[test]
    fn test_duplicate_relation_is_reused() {
        let scene = Scene::new("Scene")
            .with_entity(Entity::new("A", EntityKind::Empty))
            .with_entity(Entity::new("B", EntityKind::Empty));
        let mut graph = nodes_only(&scene);
        let mut builder = RelationBuilder::new(&mut graph, &DefaultPathResolver);
        let from = ComponentKey::new(&EntityId::new("A"), ComponentKind::Transform);
        let to = ComponentKey::new(&EntityId::new("B"), ComponentKind::Transform);

        let first = builder.add_relation(&from, &to, RelationKind::Transform, "one");
        let second = builder.add_relation(&from, &to, RelationKind::Transform, "two");
        assert_eq!(first, second);
    }

    #[test]
    fn test_parent_and_transform_stack() {
        let mut child = Entity::new("Child", EntityKind::Empty);
        child.parent = Some(ParentLink {
            entity: EntityId::new("Parent"),
            ..Default::default()
        });
        let scene = Scene::new("Scene")
            .with_entity(Entity::new("Parent", EntityKind::Empty))
            .with_entity(child);
        let mut graph = nodes_only(&scene);
        RelationBuilder::new(&mut graph, &DefaultPathResolver).build_scene(&scene);

        let local = op(&graph, "Child", names::LOCAL_TRANSFORM);
        let parent = op(&graph, "Child", names::PARENT);
        let last = op(&graph, "Child", names::TRANSFORM_FINAL);
        assert!(graph.has_relation(local, parent));
        assert!(graph.has_relation(parent, last));

        let parent_exit = graph
            .component(graph.find_component(&EntityId::new("Parent"), ComponentKind::Transform, "").unwrap())
            .unwrap()
            .exit()
            .unwrap();
        assert!(graph.has_relation(parent_exit, parent));
    }

    #[test]
    fn test_constraint_targeting_owner_is_skipped() {
        let mut cube = Entity::new("Cube", EntityKind::Mesh);
        cube.constraints.push(Constraint {
            name: "Track".to_string(),
            targets: vec![ConstraintTarget {
                entity: EntityId::new("Cube"),
                ..Default::default()
            }],
            time_dependent: false,
        });
        let scene = Scene::new("Scene").with_entity(cube);
        let mut graph = nodes_only(&scene);
        RelationBuilder::new(&mut graph, &DefaultPathResolver).build_scene(&scene);

        let stack = op(&graph, "Cube", names::CONSTRAINT_STACK);
        let preds = graph.predecessors(stack);
        assert!(preds.iter().all(|&p| graph.node(p).unwrap().owner() == Some(&EntityId::new("Cube"))));
        assert!(crate::build::find_cycles(&graph).is_empty());
    }

    #[test]
    fn test_driver_relations() {
        let mut target = Entity::new("Target", EntityKind::Empty);
        target.drivers.push(crate::scene::Driver {
            path: "scale".to_string(),
            variables: vec![crate::scene::DriverVariable {
                entity: EntityId::new("Control"),
                path: Some("location".to_string()),
                bone: None,
            }],
        });
        let scene = Scene::new("Scene")
            .with_entity(Entity::new("Control", EntityKind::Empty))
            .with_entity(target);
        let mut graph = nodes_only(&scene);
        RelationBuilder::new(&mut graph, &DefaultPathResolver).build_scene(&scene);

        let driver = op(&graph, "Target", &names::driver("scale"));
        assert_eq!(graph.operation(driver).unwrap().role(), OperationRole::Exec);

        let kinds: Vec<RelationKind> = graph
            .node(driver)
            .unwrap()
            .inlinks()
            .iter()
            .map(|&r| graph.relation(r).unwrap().kind())
            .collect();
        assert!(kinds.contains(&RelationKind::DriverTarget));
        let outs: Vec<RelationKind> = graph
            .node(driver)
            .unwrap()
            .outlinks()
            .iter()
            .map(|&r| graph.relation(r).unwrap().kind())
            .collect();
        assert_eq!(outs, vec![RelationKind::Driver]);
    }
}
