//! Diagnostics channel for absorbed errors.
//!
//! Building and evaluating never abort on bad input. Everything that gets
//! skipped or worked around is logged through `tracing` and recorded here so
//! callers can inspect it after the fact.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

/// Category of an absorbed error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A key or reference did not resolve; the edge or operation was skipped.
    Lookup,
    /// A structural anomaly that was resolved deterministically.
    Structural,
    /// An operation callback returned an error or panicked.
    Callback,
    /// A dependency cycle was found and its closing relation flagged.
    Cycle,
}

/// One recorded diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Thread-safe diagnostics sink owned by each graph.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and record a diagnostic.
    pub fn report(&self, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        match kind {
            DiagnosticKind::Lookup => tracing::warn!("lookup failed: {}", message),
            DiagnosticKind::Structural => tracing::debug!("structural: {}", message),
            DiagnosticKind::Callback => tracing::error!("operation failed: {}", message),
            DiagnosticKind::Cycle => tracing::warn!("dependency cycle: {}", message),
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Diagnostic { kind, message });
    }

    /// Copy of all recorded diagnostics.
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain all recorded diagnostics.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|d| d.kind == kind)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_and_take() {
        let diagnostics = Diagnostics::new();
        diagnostics.report(DiagnosticKind::Lookup, "missing entity 'Ghost'");
        diagnostics.report(DiagnosticKind::Cycle, "A -> B -> A");

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.count(DiagnosticKind::Lookup), 1);

        let taken = diagnostics.take();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[1].kind, DiagnosticKind::Cycle);
        assert!(diagnostics.is_empty());
    }
}
