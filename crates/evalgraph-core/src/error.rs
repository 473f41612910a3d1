//! Error types for evalgraph-core.
//!
//! Only hard failures surface here. Lookup misses, structural anomalies,
//! callback failures and cycles found during a build are absorbed and
//! reported through [`crate::diagnostics`] instead.

use thiserror::Error;

/// Result type for evalgraph-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in evalgraph-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Cyclic dependency detected between operations.
    #[error("cyclic dependency detected: {0}")]
    CyclicDependency(String),

    /// Entity not found in the graph.
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    /// Node id was created by another build of the graph.
    #[error("stale node id: {0}")]
    StaleNode(String),

    /// Scene description is malformed.
    #[error("invalid scene: {0}")]
    InvalidScene(String),

    /// Worker pool could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Render the error together with a short recovery hint.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::CyclicDependency(_) => {
                "break the loop by removing one of the listed constraints, drivers or parents"
            }
            Error::EntityNotFound(_) => "check the entity name against the scene description",
            Error::StaleNode(_) => "node ids are invalidated by rebuilds; look the node up again",
            Error::InvalidScene(_) => "fix the scene description and reload it",
            Error::ThreadPool(_) => "lower the configured thread count",
            Error::Deserialization(_) => "the file must be a JSON scene or config document",
            Error::Io(_) => "check that the path exists and is readable",
        };
        format!("{self}\n  hint: {hint}")
    }
}
