//! Scene description consumed by the graph builders.
//!
//! The scene is plain data: which entities exist and how they reference each
//! other (parents, constraint targets, driver variables, modifier inputs,
//! ...). The builders walk it once to create operations and once to connect
//! them. It deserializes from JSON so tools can feed scenes from disk.

mod path;

use std::path::Path;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::{ComponentKind, EntityId};

pub use path::{DefaultPathResolver, PathResolver, ResolvedPath};

/// A scene: entities, groups and scene-wide simulation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    /// Identifier of the scene itself; scene-level operations live under it.
    pub name: String,
    pub frame: f64,
    pub entities: Vec<Entity>,
    pub groups: Vec<Group>,
    pub rigidbody_world: Option<RigidBodyWorld>,
}

/// Named set of entities that other entities can instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    pub name: String,
    pub entities: Vec<EntityId>,
}

/// Scene-wide rigid body simulation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidBodyWorld {
    /// Entities whose motion is driven by the simulation.
    pub members: Vec<EntityId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Empty,
    Mesh,
    Curve,
    Surface,
    Font,
    MetaBall,
    Lattice,
    Armature,
    Camera,
    Lamp,
    /// Geometry data shared by objects (mesh, curve data...).
    Datablock,
    /// Shape key block of a datablock.
    ShapeKeys,
}

impl EntityKind {
    /// Objects of this kind carry evaluated geometry.
    pub fn has_geometry(&self) -> bool {
        matches!(
            self,
            EntityKind::Mesh
                | EntityKind::Curve
                | EntityKind::Surface
                | EntityKind::Font
                | EntityKind::MetaBall
                | EntityKind::Lattice
        )
    }

    /// Data blocks are not placed in the scene and have no transform.
    pub fn is_data(&self) -> bool {
        matches!(self, EntityKind::Datablock | EntityKind::ShapeKeys)
    }
}

/// One entity of the scene.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub parent: Option<ParentLink>,
    pub animation: Option<Animation>,
    pub drivers: Vec<Driver>,
    pub constraints: Vec<Constraint>,
    pub modifiers: Vec<Modifier>,
    /// Geometry datablock for objects, shape keys for datablocks.
    pub data: Option<EntityId>,
    pub particle_systems: Vec<ParticleSystem>,
    pub pose: Option<Pose>,
    pub rigid_body: bool,
    /// Group instanced by this entity.
    pub instance_group: Option<String>,
    /// Frame offset applied to this entity's animation.
    pub time_offset: Option<f64>,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            kind,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentKind {
    #[default]
    Object,
    /// Parented to a bone; `ParentLink::bone` names it.
    Bone,
    /// Parented to vertices of the parent's geometry.
    Vertex,
    /// Deformed by the parent armature.
    ArmatureDeform,
    /// Deformed by the parent lattice.
    LatticeDeform,
    /// Follows the parent curve path.
    CurveFollow,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParentLink {
    pub entity: EntityId,
    pub kind: ParentKind,
    pub bone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Animation {
    /// Whether the curves change with time (true for any keyframed animation).
    pub time_dependent: bool,
    /// Property paths written by the animation.
    pub channels: Vec<String>,
}

impl Default for Animation {
    fn default() -> Self {
        Self {
            time_dependent: true,
            channels: Vec::new(),
        }
    }
}

/// Expression writing one property from other properties.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Driver {
    /// Property path written by the driver.
    pub path: String,
    pub variables: Vec<DriverVariable>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverVariable {
    pub entity: EntityId,
    pub path: Option<String>,
    pub bone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraint {
    pub name: String,
    pub targets: Vec<ConstraintTarget>,
    pub time_dependent: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintTarget {
    pub entity: EntityId,
    /// Bone of an armature target.
    pub subtarget: Option<String>,
    /// Target reads the geometry instead of the transform.
    pub geometry: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifier {
    pub name: String,
    pub time_dependent: bool,
    pub dependencies: Vec<ModifierDependency>,
}

/// Component of another entity read by a modifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifierDependency {
    pub entity: EntityId,
    #[serde(default = "default_dependency_component")]
    pub component: ComponentKind,
}

fn default_dependency_component() -> ComponentKind {
    ComponentKind::Transform
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleSystem {
    pub name: String,
    pub effectors: Vec<EntityId>,
    pub boid_targets: Vec<EntityId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Pose {
    pub bones: Vec<Bone>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Bone {
    pub name: String,
    pub parent: Option<String>,
    pub constraints: Vec<Constraint>,
    pub ik: Option<IkChain>,
}

/// Inverse kinematics chain ending at the owning bone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IkChain {
    pub target: Option<ConstraintTarget>,
    pub pole: Option<ConstraintTarget>,
    /// Number of bones in the chain; 0 walks up to the root bone.
    pub chain_length: usize,
    /// Spline IK: the target is a curve whose geometry is read.
    pub spline: bool,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse a scene from JSON.
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Load a scene from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_json(&source)
    }

    /// Identifier under which scene-level operations are created.
    pub fn id(&self) -> EntityId {
        EntityId::new(self.name.as_str())
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| &e.id == id)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Append an entity, builder style.
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    /// Reject descriptions the builders cannot interpret unambiguously.
    pub fn validate(&self) -> Result<()> {
        let mut seen = FxHashSet::default();
        seen.insert(self.id());
        for entity in &self.entities {
            if entity.id.as_str().is_empty() {
                return Err(Error::InvalidScene("entity with empty id".to_string()));
            }
            if !seen.insert(entity.id.clone()) {
                return Err(Error::InvalidScene(format!(
                    "duplicate entity id '{}'",
                    entity.id
                )));
            }
        }
        for group in &self.groups {
            if let Some(missing) = group.entities.iter().find(|id| !seen.contains(*id)) {
                return Err(Error::InvalidScene(format!(
                    "group '{}' references unknown entity '{}'",
                    group.name, missing
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_scene() {
        let scene = Scene::from_json(
            r#"{
                "name": "Scene",
                "entities": [
                    { "id": "Cube", "kind": "mesh", "modifiers": [{ "name": "Subsurf" }] },
                    { "id": "Empty", "parent": { "entity": "Cube" } }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(scene.entities.len(), 2);
        assert_eq!(scene.entities[0].kind, EntityKind::Mesh);
        assert_eq!(scene.entities[0].modifiers[0].name, "Subsurf");
        assert_eq!(scene.entities[1].kind, EntityKind::Empty);
        let parent = scene.entities[1].parent.as_ref().unwrap();
        assert_eq!(parent.kind, ParentKind::Object);
        assert_eq!(parent.entity, EntityId::new("Cube"));
        scene.validate().unwrap();
    }

    #[test]
    fn test_animation_defaults_to_time_dependent() {
        let scene = Scene::from_json(r#"{ "entities": [{ "id": "A", "animation": {} }] }"#).unwrap();
        assert!(scene.entities[0].animation.as_ref().unwrap().time_dependent);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let scene = Scene::new("Scene")
            .with_entity(Entity::new("Cube", EntityKind::Mesh))
            .with_entity(Entity::new("Cube", EntityKind::Empty));
        assert!(matches!(scene.validate(), Err(Error::InvalidScene(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_group_member() {
        let mut scene = Scene::new("Scene").with_entity(Entity::new("Cube", EntityKind::Mesh));
        scene.groups.push(Group {
            name: "Props".to_string(),
            entities: vec![EntityId::new("Ghost")],
        });
        assert!(scene.validate().is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scene.json");
        std::fs::write(&path, r#"{ "name": "S", "frame": 12.0 }"#).unwrap();
        let scene = Scene::from_path(&path).unwrap();
        assert_eq!(scene.frame, 12.0);
        assert!(Scene::from_path(dir.path().join("missing.json")).is_err());
    }
}
