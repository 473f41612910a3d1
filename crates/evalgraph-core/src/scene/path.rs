//! Property path resolution.
//!
//! Drivers and animation channels name the property they read or write with a
//! path such as `location` or `pose.bones["Hand"].rotation`. The resolver
//! maps such a path onto the component (and optionally the operation) that
//! produces the property.

use crate::build::names;
use crate::graph::{ComponentKind, EntityId, OperationCode};

/// Component/operation a property path belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub component: ComponentKind,
    pub subpath: String,
    /// Specific operation, when the path targets one step of a component.
    pub operation: Option<(OperationCode, String)>,
}

impl ResolvedPath {
    pub fn component(component: ComponentKind) -> Self {
        Self {
            component,
            subpath: String::new(),
            operation: None,
        }
    }

    pub fn with_subpath(mut self, subpath: impl Into<String>) -> Self {
        self.subpath = subpath.into();
        self
    }

    pub fn with_operation(mut self, opcode: OperationCode, name: impl Into<String>) -> Self {
        self.operation = Some((opcode, name.into()));
        self
    }
}

/// Resolves property paths of an entity.
pub trait PathResolver: Send + Sync {
    /// `None` if the path cannot be resolved.
    fn resolve(&self, entity: &EntityId, path: &str) -> Option<ResolvedPath>;
}

impl<F> PathResolver for F
where
    F: Fn(&EntityId, &str) -> Option<ResolvedPath> + Send + Sync,
{
    fn resolve(&self, entity: &EntityId, path: &str) -> Option<ResolvedPath> {
        self(entity, path)
    }
}

/// Built-in resolver for the property layout of [`crate::scene::Entity`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPathResolver;

const TRANSFORM_PROPERTIES: &[&str] = &[
    "location",
    "rotation_euler",
    "rotation_quaternion",
    "rotation_axis_angle",
    "rotation_mode",
    "scale",
    "delta_location",
    "delta_rotation_euler",
    "delta_rotation_quaternion",
    "delta_scale",
    "matrix_world",
    "matrix_local",
    "matrix_basis",
];

impl PathResolver for DefaultPathResolver {
    fn resolve(&self, _entity: &EntityId, path: &str) -> Option<ResolvedPath> {
        let path = path.trim();
        if path.is_empty() {
            return None;
        }

        if let Some(rest) = path.strip_prefix("pose.bones") {
            let bone = quoted_key(rest)?;
            return Some(ResolvedPath::component(ComponentKind::Bone).with_subpath(bone));
        }
        if let Some(rest) = path.strip_prefix("constraints") {
            // Any constraint setting feeds the whole stack.
            quoted_key(rest)?;
            return Some(
                ResolvedPath::component(ComponentKind::Transform)
                    .with_operation(OperationCode::Constraints, names::CONSTRAINT_STACK),
            );
        }
        if let Some(rest) = path.strip_prefix("modifiers") {
            let modifier = quoted_key(rest)?;
            return Some(
                ResolvedPath::component(ComponentKind::Geometry)
                    .with_operation(OperationCode::Modifier, names::modifier(modifier)),
            );
        }
        if path.starts_with("particle_systems") {
            return Some(ResolvedPath::component(ComponentKind::EvalParticles));
        }
        if path.starts_with("data") || path.starts_with("shape_keys") {
            return Some(ResolvedPath::component(ComponentKind::Geometry));
        }

        let head = path.split(['.', '[']).next().unwrap_or(path);
        if TRANSFORM_PROPERTIES.contains(&head) {
            return Some(ResolvedPath::component(ComponentKind::Transform));
        }

        Some(ResolvedPath::component(ComponentKind::Parameters))
    }
}

/// Extract `Name` from `["Name"]...`.
fn quoted_key(rest: &str) -> Option<&str> {
    let rest = rest.strip_prefix("[\"")?;
    let end = rest.find("\"]")?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(path: &str) -> Option<ResolvedPath> {
        DefaultPathResolver.resolve(&EntityId::new("Cube"), path)
    }

    #[test]
    fn test_transform_paths() {
        assert_eq!(resolve("location").unwrap().component, ComponentKind::Transform);
        assert_eq!(resolve("rotation_euler[2]").unwrap().component, ComponentKind::Transform);
        assert_eq!(resolve("scale").unwrap().component, ComponentKind::Transform);
    }

    #[test]
    fn test_bone_path() {
        let resolved = resolve("pose.bones[\"Hand.L\"].rotation_quaternion").unwrap();
        assert_eq!(resolved.component, ComponentKind::Bone);
        assert_eq!(resolved.subpath, "Hand.L");
        assert!(resolve("pose.bones").is_none());
    }

    #[test]
    fn test_modifier_path_targets_operation() {
        let resolved = resolve("modifiers[\"Subsurf\"].levels").unwrap();
        assert_eq!(resolved.component, ComponentKind::Geometry);
        assert_eq!(
            resolved.operation,
            Some((OperationCode::Modifier, "Modifier Subsurf".to_string()))
        );
    }

    #[test]
    fn test_fallback_to_parameters() {
        assert_eq!(resolve("[\"custom\"]").unwrap().component, ComponentKind::Parameters);
        assert_eq!(resolve("hide_viewport").unwrap().component, ComponentKind::Parameters);
        assert!(resolve("   ").is_none());
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |_: &EntityId, path: &str| {
            (path == "x").then(|| ResolvedPath::component(ComponentKind::Geometry))
        };
        assert!(resolver.resolve(&EntityId::new("A"), "x").is_some());
        assert!(resolver.resolve(&EntityId::new("A"), "y").is_none());
    }
}
