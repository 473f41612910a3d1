//! What happened during one evaluation pass.

use std::time::Duration;

use crate::graph::NodeId;

/// One operation that ran (or was visited without a callback).
#[derive(Debug, Clone)]
pub struct ExecutedOperation {
    pub id: NodeId,
    /// Pass-wide sequence number taken before the callback started.
    pub started: u64,
    /// Pass-wide sequence number taken after the callback returned.
    pub finished: u64,
    pub duration: Duration,
    /// Index of the worker thread within its pool.
    pub thread: Option<usize>,
}

/// A callback that returned an error or panicked.
#[derive(Debug, Clone)]
pub struct OperationFailure {
    pub id: NodeId,
    pub name: String,
    pub message: String,
    pub panicked: bool,
}

/// Result of an evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct EvalReport {
    /// Executed operations, ordered by start.
    pub executed: Vec<ExecutedOperation>,
    pub failures: Vec<OperationFailure>,
    /// Tagged operations that never became ready.
    pub stalled: Vec<NodeId>,
    pub elapsed: Duration,
}

impl EvalReport {
    /// No failures and nothing stalled.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.stalled.is_empty()
    }

    pub fn executed_count(&self) -> usize {
        self.executed.len()
    }

    pub fn get(&self, id: NodeId) -> Option<&ExecutedOperation> {
        self.executed.iter().find(|e| e.id == id)
    }

    pub fn ran(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// `a` finished before `b` started.
    pub fn ran_before(&self, a: NodeId, b: NodeId) -> bool {
        match (self.get(a), self.get(b)) {
            (Some(a), Some(b)) => a.finished < b.started,
            _ => false,
        }
    }

    /// Operation ids in start order.
    pub fn order(&self) -> Vec<NodeId> {
        self.executed.iter().map(|e| e.id).collect()
    }

    /// Sum of callback durations.
    pub fn busy_time(&self) -> Duration {
        self.executed.iter().map(|e| e.duration).sum()
    }
}
