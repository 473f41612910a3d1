//! Eval command: run one evaluation pass over a scene.
//!
//! Operations get empty callbacks, so the pass measures scheduling only:
//! which operations a change reaches and in what order they run.

use std::time::Duration;

use evalgraph_core::eval::callback;
use evalgraph_core::{
    EntityId, EvalContext, Evaluator, OperationCallback, OperationSignature, TagTarget, tag_dirty,
};

use crate::colors;
use crate::output::{print_diagnostics, print_report};
use crate::session::Session;

/// What to tag before the pass.
pub struct EvalOptions<'a> {
    pub config: Option<&'a str>,
    pub frame: Option<f64>,
    pub threads: Option<usize>,
    pub tags: &'a [String],
    /// Simulated work per operation, in microseconds.
    pub work_us: u64,
    pub show_order: bool,
}

pub fn execute(scene_path: &str, options: &EvalOptions<'_>) -> anyhow::Result<()> {
    let mut session = Session::load(scene_path, options.config)?;
    if let Some(threads) = options.threads {
        session.config.eval.threads = threads;
    }

    let work = Duration::from_micros(options.work_us);
    let binder = move |_: &OperationSignature<'_>| -> Option<OperationCallback> {
        Some(callback(move |_, _| {
            if !work.is_zero() {
                std::thread::sleep(work);
            }
            Ok(())
        }))
    };
    let mut graph = session.build(&binder);
    let evaluator = Evaluator::new(&session.config.eval)?;

    session.print_header("Evaluating");
    let ctx = EvalContext::new(session.scene.frame);

    let report = match options.frame {
        Some(frame) => {
            for tag in options.tags {
                tag_dirty(&mut graph, &TagTarget::Entity(EntityId::new(tag.as_str())));
            }
            println!("Frame change to {}{frame}{}", colors::CYAN, colors::RESET);
            evaluator.evaluate_on_framechange(&mut graph, &ctx, frame)
        }
        None => {
            let tagged = if options.tags.is_empty() {
                let all: Vec<EntityId> = graph.entities().map(|(id, _)| id.clone()).collect();
                all.into_iter()
                    .map(|id| tag_dirty(&mut graph, &TagTarget::Entity(id)))
                    .sum::<usize>()
            } else {
                options
                    .tags
                    .iter()
                    .map(|tag| tag_dirty(&mut graph, &TagTarget::Entity(EntityId::new(tag.as_str()))))
                    .sum()
            };
            println!("Tagged {tagged} entry operations");
            evaluator.evaluate(&mut graph, &ctx)
        }
    };

    if options.show_order {
        println!("\n{}Order:{}", colors::BOLD, colors::RESET);
        for executed in &report.executed {
            println!(
                "  {}{:>4}{} {}",
                colors::DIM,
                executed.started,
                colors::RESET,
                graph.describe(executed.id)
            );
        }
    }

    print_report(&graph, &report, evaluator.threads());
    print_diagnostics(&graph);

    if !report.is_success() {
        anyhow::bail!(
            "evaluation finished with {} failed and {} stalled operations",
            report.failures.len(),
            report.stalled.len()
        );
    }
    Ok(())
}
