//! Dependency graph storage.
//!
//! Node hierarchy of a built graph:
//!
//! ```text
//! Root ── Time Source
//!   │
//!   └── Identifier (one per entity) ── [Time Source]
//!           │
//!           ├── Component (kind, sub-path)
//!           │       ├── Operation ... (entry / exit designated)
//!           │       └── Operation
//!           └── Component ...
//!
//! Subgraph (instanced group, isolated nested graph)
//! ```
//!
//! Relations connect operations (and time sources to operations). They are
//! the only thing the reducer and scheduler look at; the hierarchy above is
//! bookkeeping for lookups and tagging.

mod depsgraph;
mod node;
mod relation;
mod types;

pub use depsgraph::Depsgraph;
pub use node::{
    ComponentNode, IdentifierNode, Node, NodeData, OperationNode, RootNode, SubgraphNode,
    TimeSourceNode,
};
pub use relation::Relation;
pub use types::{
    ComponentKind, EntityId, NodeId, NodeType, OperationCode, OperationRole, RelationId,
    RelationKind,
};
