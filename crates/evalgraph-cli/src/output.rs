//! Terminal rendering of graph statistics, diagnostics and reports.

use evalgraph_core::debug::GraphStats;
use evalgraph_core::{Depsgraph, DiagnosticKind, EvalReport};

use crate::colors;

pub fn print_stats(stats: &GraphStats) {
    let rows = [
        ("Entities", stats.entities),
        ("Components", stats.components),
        ("Operations", stats.operations),
        ("  synthetic", stats.synthetic_operations),
        ("  with callback", stats.operations_with_callback),
        ("Relations", stats.relations),
        ("  cyclic", stats.cyclic_relations),
        ("Time sources", stats.time_sources),
        ("Subgraphs", stats.subgraphs),
        ("Longest chain", stats.depth),
    ];
    for (label, value) in rows {
        println!("{label:<16} {value}");
    }
}

/// Print recorded diagnostics, most severe kinds first.
pub fn print_diagnostics(graph: &Depsgraph) {
    let diagnostics = graph.diagnostics().snapshot();
    if diagnostics.is_empty() {
        println!("{}No diagnostics{}", colors::GREEN, colors::RESET);
        return;
    }

    println!("\n{}Diagnostics ({}):{}", colors::BOLD, diagnostics.len(), colors::RESET);
    let order = [
        DiagnosticKind::Cycle,
        DiagnosticKind::Callback,
        DiagnosticKind::Lookup,
        DiagnosticKind::Structural,
    ];
    for kind in order {
        for diagnostic in diagnostics.iter().filter(|d| d.kind == kind) {
            let (color, tag) = match kind {
                DiagnosticKind::Cycle => (colors::RED, "cycle"),
                DiagnosticKind::Callback => (colors::RED, "callback"),
                DiagnosticKind::Lookup => (colors::YELLOW, "lookup"),
                DiagnosticKind::Structural => (colors::DIM, "structural"),
            };
            println!("  {color}[{tag}]{} {}", colors::RESET, diagnostic.message);
        }
    }
}

pub fn print_report(graph: &Depsgraph, report: &EvalReport, threads: usize) {
    for failure in &report.failures {
        println!(
            "  {}✗{} {}{}: {}",
            colors::RED,
            colors::RESET,
            graph.describe(failure.id),
            if failure.panicked { " (panicked)" } else { "" },
            failure.message
        );
    }
    for &stalled in &report.stalled {
        println!(
            "  {}…{} {} never became ready",
            colors::YELLOW,
            colors::RESET,
            graph.describe(stalled)
        );
    }

    println!("{}", "─".repeat(50));
    let (color, status) = if report.is_success() {
        (colors::GREEN, "Completed")
    } else {
        (colors::RED, "Finished with errors:")
    };
    println!(
        "{color}{status}{} {} operations on {} threads in {:.2}ms (busy {:.2}ms)",
        colors::RESET,
        report.executed_count(),
        threads,
        report.elapsed.as_secs_f64() * 1000.0,
        report.busy_time().as_secs_f64() * 1000.0
    );
}
