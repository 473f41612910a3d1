//! Evaluation: tagging changes and running the affected operations.
//!
//! ```text
//! tag_dirty / tag_time_source      (entry set)
//!         │
//!     flush                        (everything downstream needs_update)
//!         │
//!     pending counts + priorities
//!         │
//!     rayon scope: ready heap ──► run ──► decrement successors ──► ready heap
//!         │
//!     clear tags, counters, scheduled flags
//! ```

mod context;
mod flush;
mod report;
mod scheduler;
mod tag;

pub use context::{
    BoxError, CallbackResult, EvalContext, EvalMode, OperationCallback, OperationInfo, callback,
};
pub use report::{EvalReport, ExecutedOperation, OperationFailure};
pub use scheduler::{Evaluator, evaluate, evaluate_on_framechange};
pub use tag::{TagTarget, tag_dirty};
