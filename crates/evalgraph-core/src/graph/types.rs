//! Identifiers and tag enums shared by the graph, builders and scheduler.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Name of an external entity (object, datablock, scene).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EntityId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

static NEXT_EPOCH: AtomicU32 = AtomicU32::new(1);

/// Allocate a fresh epoch; every graph build gets its own.
pub(crate) fn next_epoch() -> u32 {
    NEXT_EPOCH.fetch_add(1, Ordering::Relaxed)
}

/// Generational index of a node in a [`Depsgraph`](super::Depsgraph) arena.
///
/// The epoch ties the id to one build of one graph, so ids kept across a
/// rebuild stop resolving instead of pointing at unrelated nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) epoch: u32,
}

impl NodeId {
    /// Arenas hold at most `u32::MAX` slots.
    pub(crate) fn new(index: usize, epoch: u32) -> Self {
        debug_assert!(u32::try_from(index).is_ok(), "arena index {index} overflows u32");
        Self {
            index: index as u32,
            epoch,
        }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node_{}", self.index)
    }
}

/// Generational index of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId {
    pub(crate) index: u32,
    pub(crate) epoch: u32,
}

impl RelationId {
    /// Arenas hold at most `u32::MAX` slots.
    pub(crate) fn new(index: usize, epoch: u32) -> Self {
        debug_assert!(u32::try_from(index).is_ok(), "arena index {index} overflows u32");
        Self {
            index: index as u32,
            epoch,
        }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl std::fmt::Display for RelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rel_{}", self.index)
    }
}

/// Aspect of an entity that is evaluated as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Generic parameters, driver outputs and custom properties.
    Parameters,
    /// Proxy of a linked entity.
    Proxy,
    /// Animation curves.
    Animation,
    /// World transform.
    Transform,
    /// Geometry and modifier stack.
    Geometry,
    /// Sequencer strips.
    Sequencer,
    /// Whole-pose evaluation of an armature.
    EvalPose,
    /// A single bone; the component sub-path is the bone name.
    Bone,
    /// Particle systems.
    EvalParticles,
}

impl ComponentKind {
    pub fn name(&self) -> &'static str {
        match self {
            ComponentKind::Parameters => "Parameters",
            ComponentKind::Proxy => "Proxy",
            ComponentKind::Animation => "Animation",
            ComponentKind::Transform => "Transform",
            ComponentKind::Geometry => "Geometry",
            ComponentKind::Sequencer => "Sequencer",
            ComponentKind::EvalPose => "Pose Eval",
            ComponentKind::Bone => "Bone",
            ComponentKind::EvalParticles => "Particles",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Position of an operation inside its component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationRole {
    /// Runs first; candidate entry point of the component.
    Init,
    /// Regular step.
    Exec,
    /// Runs last; candidate exit point of the component.
    Post,
    /// Synthetic exit barrier.
    Out,
    /// Simulation step.
    Sim,
    /// Rebuilds cached simulation state.
    Rebuild,
}

/// What an operation computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCode {
    /// Placeholder with no work: barriers and pass-throughs.
    Noop,
    /// Operation added through the low-level API.
    Generic,

    LocalTransform,
    Parent,
    Constraints,
    RigidBodySync,
    TransformFinal,

    AnimationEval,
    Driver,

    GeometryEval,
    Modifier,
    GeometryFinal,

    PoseRebuild,
    PoseInit,
    PoseFlush,
    IkSolver,
    SplineIkSolver,

    BoneLocal,
    BoneConstraints,
    BoneDone,

    ParticleSystem,

    RigidBodyRebuild,
    RigidBodySimulate,
}

impl OperationCode {
    /// Scheduling cost used by the priority pass.
    pub fn cost(&self) -> f32 {
        match self {
            OperationCode::Noop => 0.0,
            _ => 1.0,
        }
    }
}

/// Semantic label of a relation. Every kind orders `to` after `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Standard,
    RootToActive,
    Datablock,
    Time,
    ComponentOrder,
    Operation,
    Driver,
    DriverTarget,
    Transform,
    GeometryEval,
    Update,
    UpdateUi,
}

impl RelationKind {
    pub fn name(&self) -> &'static str {
        match self {
            RelationKind::Standard => "standard",
            RelationKind::RootToActive => "root to active",
            RelationKind::Datablock => "datablock",
            RelationKind::Time => "time",
            RelationKind::ComponentOrder => "component order",
            RelationKind::Operation => "operation",
            RelationKind::Driver => "driver",
            RelationKind::DriverTarget => "driver target",
            RelationKind::Transform => "transform",
            RelationKind::GeometryEval => "geometry eval",
            RelationKind::Update => "update",
            RelationKind::UpdateUi => "update ui",
        }
    }
}

/// Node kind tag used when looking up or creating nodes by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Root,
    TimeSource,
    Identifier,
    Component(ComponentKind),
    Operation {
        component: ComponentKind,
        opcode: OperationCode,
    },
    Subgraph,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epochs_are_unique() {
        let a = next_epoch();
        let b = next_epoch();
        assert_ne!(a, b);
    }

    #[test]
    fn test_node_id_equality_includes_epoch() {
        let a = NodeId::new(3, 1);
        let b = NodeId::new(3, 2);
        assert_ne!(a, b);
        assert_eq!(a.index(), b.index());
        assert_eq!(a.to_string(), "node_3");
    }

    #[test]
    #[cfg(all(debug_assertions, target_pointer_width = "64"))]
    #[should_panic(expected = "overflows u32")]
    fn test_index_beyond_u32_is_rejected() {
        NodeId::new(u32::MAX as usize + 1, 1);
    }

    #[test]
    fn test_noop_is_free() {
        assert_eq!(OperationCode::Noop.cost(), 0.0);
        assert_eq!(OperationCode::Modifier.cost(), 1.0);
    }

    #[test]
    fn test_entity_id_serializes_as_string() {
        let id = EntityId::new("Cube");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"Cube\"");
    }
}
