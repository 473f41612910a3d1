//! Parallel evaluation of tagged operations.
//!
//! A pass flushes tags downstream, counts for every tagged operation how
//! many tagged predecessors it waits on, and then runs operations on a rayon
//! pool as their counters reach zero. Independent operations run
//! concurrently; an operation never starts before all of its tagged
//! predecessors have finished.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use rayon::{Scope, ThreadPool, ThreadPoolBuilder};

use super::context::{EvalContext, OperationInfo};
use super::flush::flush_updates;
use super::report::{EvalReport, ExecutedOperation, OperationFailure};
use crate::config::EvalConfig;
use crate::diagnostics::DiagnosticKind;
use crate::error::Result;
use crate::graph::{Depsgraph, NodeData, NodeId};

/// Runs evaluation passes on a dedicated worker pool.
pub struct Evaluator {
    pool: ThreadPool,
}

impl Evaluator {
    /// Create a pool sized by `config`.
    pub fn new(config: &EvalConfig) -> Result<Self> {
        let prefix = config.thread_name.clone();
        let mut builder = ThreadPoolBuilder::new().thread_name(move |i| format!("{prefix}-{i}"));
        if config.threads > 0 {
            builder = builder.num_threads(config.threads);
        }
        let pool = builder.build()?;
        tracing::debug!("evaluator pool with {} threads", pool.current_num_threads());
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Evaluate everything tagged in `graph`.
    pub fn evaluate(&self, graph: &mut Depsgraph, ctx: &EvalContext) -> EvalReport {
        self.pool.install(|| evaluate(graph, ctx))
    }

    /// Move to `frame` and evaluate everything that depends on time.
    pub fn evaluate_on_framechange(&self, graph: &mut Depsgraph, ctx: &EvalContext, frame: f64) -> EvalReport {
        self.pool.install(|| evaluate_on_framechange(graph, ctx, frame))
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator").field("threads", &self.threads()).finish()
    }
}

/// Evaluate everything tagged in `graph` on the current rayon pool.
///
/// Blocks until every reachable tagged operation has run. Tags, counters and
/// scheduled flags are cleared afterwards, so evaluating again without new
/// tags does nothing.
pub fn evaluate(graph: &mut Depsgraph, ctx: &EvalContext) -> EvalReport {
    let start = Instant::now();
    if graph.need_update() {
        tracing::warn!("evaluating a graph with invalidated relations; rebuild it first");
    }

    flush_updates(graph);
    let tagged = prepare_pass(graph);

    let mut report = if tagged.is_empty() {
        EvalReport::default()
    } else {
        run_pass(graph, ctx, &tagged)
    };
    report.elapsed = start.elapsed();

    finish_pass(graph);
    tracing::info!(
        "evaluated {} of {} operations in {:?} ({} failed, {} stalled)",
        report.executed.len(),
        tagged.len(),
        report.elapsed,
        report.failures.len(),
        report.stalled.len()
    );
    report
}

/// Set the global frame, tag the time source and evaluate.
///
/// Entity time sources follow the global frame plus their offset.
pub fn evaluate_on_framechange(graph: &mut Depsgraph, ctx: &EvalContext, frame: f64) -> EvalReport {
    for node in graph.node_slice_mut() {
        let is_global = node.owner().is_none();
        if let NodeData::TimeSource(ts) = &mut node.data {
            ts.frame = if is_global { frame } else { frame + ts.offset };
        }
    }
    if !graph.tag_time_source() {
        tracing::debug!("frame change on a graph without a time source");
    }

    let mut ctx = ctx.clone();
    ctx.frame = frame;
    evaluate(graph, &ctx)
}

/// Reset counters, count tagged predecessors and compute priorities.
/// Returns the tagged operations in insertion order.
fn prepare_pass(graph: &mut Depsgraph) -> Vec<NodeId> {
    let ops = graph.operations().to_vec();
    let tagged: Vec<NodeId> = ops
        .iter()
        .copied()
        .filter(|&op| graph.operation(op).is_some_and(|o| o.needs_update))
        .collect();

    let is_tagged = |graph: &Depsgraph, id: NodeId| graph.operation(id).is_some_and(|o| o.needs_update);
    let counts: Vec<u32> = tagged
        .iter()
        .map(|&op| {
            graph
                .predecessors(op)
                .into_iter()
                .filter(|&p| is_tagged(graph, p))
                .count() as u32
        })
        .collect();
    let priorities = compute_priorities(graph, &tagged);

    for &op in &ops {
        if let Some(node) = graph.operation_mut(op) {
            *node.pending.get_mut() = 0;
            *node.scheduled.get_mut() = false;
            node.priority = 0.0;
        }
    }
    for ((&op, count), priority) in tagged.iter().zip(counts).zip(priorities) {
        if let Some(node) = graph.operation_mut(op) {
            *node.pending.get_mut() = count;
            node.priority = priority;
        }
    }
    tagged
}

/// Priority of a tagged operation: its own cost plus the priorities of its
/// tagged successors. Untagged operations weigh nothing.
fn compute_priorities(graph: &mut Depsgraph, tagged: &[NodeId]) -> Vec<f32> {
    let mut priority = vec![0.0f32; graph.node_count()];
    for node in graph.node_slice_mut() {
        node.marks = Default::default();
    }

    for &root in tagged {
        // (node, successors already summed)
        let mut stack = vec![(root, false)];
        while let Some((node, expanded)) = stack.pop() {
            let successors: Vec<NodeId> = graph
                .successors(node)
                .into_iter()
                .filter(|&s| graph.operation(s).is_some_and(|o| o.needs_update))
                .collect();
            if expanded {
                let cost = graph.operation(node).map(|o| o.opcode().cost()).unwrap_or_default();
                priority[node.index()] = cost + successors.iter().map(|s| priority[s.index()]).sum::<f32>();
                continue;
            }
            let nodes = graph.node_slice_mut();
            if nodes[node.index()].marks.visited {
                continue;
            }
            nodes[node.index()].marks.visited = true;
            stack.push((node, true));
            for s in successors {
                if !nodes[s.index()].marks.visited {
                    stack.push((s, false));
                }
            }
        }
    }

    for node in graph.node_slice_mut() {
        node.marks = Default::default();
    }
    tagged.iter().map(|op| priority[op.index()]).collect()
}

/// Clear tags and per-pass state.
fn finish_pass(graph: &mut Depsgraph) {
    let ops = graph.operations().to_vec();
    for op in ops {
        if let Some(node) = graph.operation_mut(op) {
            node.reset();
        }
    }
    graph.entry_tags.clear();
}

/// Entry of the ready heap; higher priority first, then creation order.
struct Ready {
    priority: f32,
    id: NodeId,
}

impl PartialEq for Ready {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Ready {}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ready {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.id.index().cmp(&self.id.index()))
    }
}

/// Shared state of one running pass.
struct Pass<'a> {
    graph: &'a Depsgraph,
    ctx: &'a EvalContext,
    ready: Mutex<BinaryHeap<Ready>>,
    clock: AtomicU64,
    executed: Mutex<Vec<ExecutedOperation>>,
    failures: Mutex<Vec<OperationFailure>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<'a> Pass<'a> {
    /// Queue an operation whose predecessors are done. At most once per pass.
    fn schedule<'s>(&'s self, scope: &Scope<'s>, id: NodeId) {
        let Some(op) = self.graph.operation(id) else {
            return;
        };
        {
            let mut ready = lock(&self.ready);
            if op.scheduled.swap(true, Ordering::AcqRel) {
                return;
            }
            ready.push(Ready {
                priority: op.priority,
                id,
            });
        }
        scope.spawn(move |s| self.run_next(s));
    }

    fn run_next<'s>(&'s self, scope: &Scope<'s>) {
        let next = lock(&self.ready).pop();
        if let Some(Ready { id, .. }) = next {
            self.run(scope, id);
        }
    }

    fn run<'s>(&'s self, scope: &Scope<'s>, id: NodeId) {
        let started = self.clock.fetch_add(1, Ordering::SeqCst);
        let begin = Instant::now();
        self.invoke(id);
        let duration = begin.elapsed();
        let finished = self.clock.fetch_add(1, Ordering::SeqCst);

        lock(&self.executed).push(ExecutedOperation {
            id,
            started,
            finished,
            duration,
            thread: rayon::current_thread_index(),
        });

        for next in self.graph.successors(id) {
            let Some(op) = self.graph.operation(next) else {
                continue;
            };
            if op.needs_update && op.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.schedule(scope, next);
            }
        }
    }

    /// Run the callback of an operation, absorbing errors and panics.
    fn invoke(&self, id: NodeId) {
        let (Some(node), Some(op)) = (self.graph.node(id), self.graph.operation(id)) else {
            return;
        };
        let (Some(callback), Some(entity)) = (op.callback.as_ref(), node.owner()) else {
            return;
        };
        let info = OperationInfo {
            id,
            entity,
            component: op.kind(),
            subpath: node.subpath(),
            opcode: op.opcode(),
            name: node.name(),
        };

        let failure = match catch_unwind(AssertUnwindSafe(|| callback(self.ctx, &info))) {
            Ok(Ok(())) => return,
            Ok(Err(err)) => (err.to_string(), false),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                (message, true)
            }
        };
        let (message, panicked) = failure;
        self.graph.diagnostics().report(
            DiagnosticKind::Callback,
            format!(
                "{}{}: {}",
                self.graph.describe(id),
                if panicked { " panicked" } else { "" },
                message
            ),
        );
        lock(&self.failures).push(OperationFailure {
            id,
            name: node.name().to_string(),
            message,
            panicked,
        });
    }
}

/// Run tagged operations until none is ready.
fn run_pass(graph: &Depsgraph, ctx: &EvalContext, tagged: &[NodeId]) -> EvalReport {
    let pass = Pass {
        graph,
        ctx,
        ready: Mutex::new(BinaryHeap::new()),
        clock: AtomicU64::new(0),
        executed: Mutex::new(Vec::new()),
        failures: Mutex::new(Vec::new()),
    };

    rayon::scope(|s| {
        for &op in tagged {
            if graph.operation(op).is_some_and(|o| o.pending() == 0) {
                pass.schedule(s, op);
            }
        }
    });

    let mut executed = pass.executed.into_inner().unwrap_or_else(PoisonError::into_inner);
    executed.sort_by_key(|e| e.started);
    let failures = pass.failures.into_inner().unwrap_or_else(PoisonError::into_inner);
    let stalled: Vec<NodeId> = tagged
        .iter()
        .copied()
        .filter(|&op| !executed.iter().any(|e| e.id == op))
        .collect();
    for &op in &stalled {
        tracing::warn!("{} never became ready", graph.describe(op));
    }

    EvalReport {
        executed,
        failures,
        stalled,
        elapsed: Default::default(),
    }
}
