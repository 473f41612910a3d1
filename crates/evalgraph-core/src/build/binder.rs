//! Binding operation callbacks while nodes are created.

use crate::eval::OperationCallback;
use crate::graph::{ComponentKind, EntityId, OperationCode, OperationRole};

/// Identity of an operation that is about to be created.
#[derive(Debug, Clone, Copy)]
pub struct OperationSignature<'a> {
    pub entity: &'a EntityId,
    pub component: ComponentKind,
    pub subpath: &'a str,
    pub opcode: OperationCode,
    pub role: OperationRole,
    pub name: &'a str,
}

/// Supplies the callback for each operation the node builder creates.
///
/// Returning `None` creates the operation without a body: it still orders
/// its neighbours but does no work when scheduled.
pub trait OperationBinder: Send + Sync {
    fn bind(&self, op: &OperationSignature<'_>) -> Option<OperationCallback>;
}

impl<F> OperationBinder for F
where
    F: Fn(&OperationSignature<'_>) -> Option<OperationCallback> + Send + Sync,
{
    fn bind(&self, op: &OperationSignature<'_>) -> Option<OperationCallback> {
        self(op)
    }
}

/// Binds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBinder;

impl OperationBinder for NoopBinder {
    fn bind(&self, _op: &OperationSignature<'_>) -> Option<OperationCallback> {
        None
    }
}
