//! Dot command: export the graph for Graphviz.

use std::fs;

use evalgraph_core::NoopBinder;
use evalgraph_core::debug::to_dot;

use crate::colors;
use crate::session::Session;

/// Write the graph in `dot` syntax to `output`, or stdout without one.
pub fn execute(scene_path: &str, config_path: Option<&str>, output: Option<&str>) -> anyhow::Result<()> {
    let session = Session::load(scene_path, config_path)?;
    let graph = session.build(&NoopBinder);
    let dot = to_dot(&graph);

    match output {
        Some(path) => {
            fs::write(path, dot)?;
            println!(
                "{}Wrote{} {} nodes, {} relations to {}",
                colors::GREEN,
                colors::RESET,
                graph.node_count(),
                graph.relation_count(),
                path
            );
        }
        None => print!("{dot}"),
    }
    Ok(())
}
