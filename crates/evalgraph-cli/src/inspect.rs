//! Inspect command: build a scene and summarize its graph.

use evalgraph_core::NoopBinder;
use evalgraph_core::debug::GraphStats;

use crate::output::{print_diagnostics, print_stats};
use crate::session::Session;

/// Build the graph and print its statistics and diagnostics.
pub fn execute(scene_path: &str, config_path: Option<&str>, json: bool) -> anyhow::Result<()> {
    let session = Session::load(scene_path, config_path)?;
    let graph = session.build(&NoopBinder);
    let stats = GraphStats::collect(&graph);

    if json {
        let document = serde_json::json!({
            "scene": session.scene_name(),
            "stats": stats,
            "diagnostics": graph.diagnostics().snapshot(),
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    session.print_header("Inspecting");
    print_stats(&stats);
    print_diagnostics(&graph);
    Ok(())
}
