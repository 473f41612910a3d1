//! Evaluation context and operation callbacks.

use std::any::Any;
use std::sync::Arc;

use crate::graph::{ComponentKind, EntityId, NodeId, OperationCode};

/// Error type returned by operation callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of running one operation callback.
pub type CallbackResult = std::result::Result<(), BoxError>;

/// Body of an operation. Called on a worker thread, at most once per pass.
pub type OperationCallback =
    Arc<dyn Fn(&EvalContext, &OperationInfo<'_>) -> CallbackResult + Send + Sync>;

/// Wrap a closure as an [`OperationCallback`].
pub fn callback<F>(f: F) -> OperationCallback
where
    F: Fn(&EvalContext, &OperationInfo<'_>) -> CallbackResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Identity of the operation being run, handed to its callback.
#[derive(Debug, Clone, Copy)]
pub struct OperationInfo<'a> {
    pub id: NodeId,
    pub entity: &'a EntityId,
    pub component: ComponentKind,
    pub subpath: &'a str,
    pub opcode: OperationCode,
    pub name: &'a str,
}

/// Which consumer the pass evaluates for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvalMode {
    #[default]
    Viewport,
    Render,
}

/// Per-pass context shared by every callback.
#[derive(Clone, Default)]
pub struct EvalContext {
    /// Current frame of the global time source.
    pub frame: f64,
    pub mode: EvalMode,
    data: Option<Arc<dyn Any + Send + Sync>>,
}

impl EvalContext {
    pub fn new(frame: f64) -> Self {
        Self {
            frame,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: EvalMode) -> Self {
        self.mode = mode;
        self
    }

    /// Attach an opaque payload that callbacks can downcast.
    pub fn with_data<T: Any + Send + Sync>(mut self, data: T) -> Self {
        self.data = Some(Arc::new(data));
        self
    }

    /// Borrow the attached payload if it has type `T`.
    pub fn data<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.data.as_ref().and_then(|data| data.downcast_ref::<T>())
    }
}

impl std::fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalContext")
            .field("frame", &self.frame)
            .field("mode", &self.mode)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_payload_downcast() {
        let ctx = EvalContext::new(12.0).with_data(vec![1u32, 2, 3]);
        assert_eq!(ctx.data::<Vec<u32>>().map(|v| v.len()), Some(3));
        assert!(ctx.data::<String>().is_none());
        assert_eq!(ctx.mode, EvalMode::Viewport);
    }
}
