//! Check command: fail when a scene's graph contains dependency cycles.

use evalgraph_core::{DiagnosticKind, NoopBinder};

use crate::colors;
use crate::session::Session;

pub fn execute(scene_path: &str, config_path: Option<&str>) -> anyhow::Result<()> {
    let session = Session::load(scene_path, config_path)?;
    let graph = session.build(&NoopBinder);

    let lookups = graph.diagnostics().count(DiagnosticKind::Lookup);
    if lookups > 0 {
        println!(
            "{}warning:{} {} unresolved references (run `evalgraph inspect` for details)",
            colors::YELLOW,
            colors::RESET,
            lookups
        );
    }

    graph.check_acyclic()?;
    println!(
        "{}OK{} {}: {} operations, {} relations, no cycles",
        colors::GREEN,
        colors::RESET,
        session.scene_name(),
        graph.operations().len(),
        graph.relation_count()
    );
    Ok(())
}
