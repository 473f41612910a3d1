//! Directed, typed edges between nodes.

use super::types::{NodeId, RelationKind};

/// Edge `from -> to`: `to` depends on `from`.
///
/// A relation is registered in `from.outlinks` and `to.inlinks`; the graph
/// adds and removes both registrations together.
#[derive(Debug, Clone)]
pub struct Relation {
    pub(crate) from: NodeId,
    pub(crate) to: NodeId,
    pub(crate) kind: RelationKind,
    pub(crate) label: String,
    /// Closes a dependency cycle; ignored by reduction and scheduling.
    pub(crate) cyclic: bool,
}

impl Relation {
    pub fn from(&self) -> NodeId {
        self.from
    }

    pub fn to(&self) -> NodeId {
        self.to
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_cyclic(&self) -> bool {
        self.cyclic
    }
}
