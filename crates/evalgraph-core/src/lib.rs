//! Scene dependency graph and evaluation scheduler.
//!
//! This crate provides:
//! - Scene description (entities, parents, constraints, drivers, modifiers,
//!   poses, rigid bodies) deserialized from JSON
//! - Graph construction in two passes: operations first, relations second
//! - Entry/exit designation per component, cycle marking and transitive
//!   reduction
//! - Dirty tagging and flushing from entities, components, operations and
//!   time sources
//! - Parallel evaluation on a rayon pool, respecting dependencies
//! - Graphviz export and graph statistics

pub mod build;
pub mod config;
pub mod debug;
pub mod diagnostics;
pub mod error;
pub mod eval;
pub mod graph;
pub mod scene;

pub use build::{
    NoopBinder, OperationBinder, OperationSignature, build, build_with, rebuild_if_needed,
    rebuild_if_needed_with,
};
pub use config::{BuildConfig, Config, EvalConfig};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use error::{Error, Result};
pub use eval::{
    EvalContext, EvalMode, EvalReport, Evaluator, OperationCallback, OperationInfo, TagTarget,
    evaluate, evaluate_on_framechange, tag_dirty,
};
pub use graph::{ComponentKind, Depsgraph, EntityId, NodeId, OperationCode, RelationKind};
pub use scene::{DefaultPathResolver, Entity, EntityKind, PathResolver, Scene};
