//! evalgraph CLI - build, inspect and evaluate scene dependency graphs.

mod check;
mod colors;
mod dot;
mod eval;
mod inspect;
mod output;
mod session;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "evalgraph")]
#[command(about = "Scene dependency graph builder and evaluation scheduler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON config file with build and eval settings
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a scene and print graph statistics and diagnostics
    Inspect {
        /// Path to the scene (.json file)
        scene: String,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Export the graph in Graphviz dot format
    Dot {
        /// Path to the scene (.json file)
        scene: String,

        /// Output path (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Tag entities (or change frame) and run one evaluation pass
    Eval {
        /// Path to the scene (.json file)
        scene: String,

        /// Change to this frame and evaluate everything time dependent
        #[arg(short, long)]
        frame: Option<f64>,

        /// Entity to tag; repeatable. Tags every entity when omitted
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Worker threads (overrides the config file)
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Simulated work per operation in microseconds
        #[arg(long, default_value = "0")]
        work_us: u64,

        /// Print operations in the order they started
        #[arg(long)]
        order: bool,
    },

    /// Fail if the scene's graph contains dependency cycles
    Check {
        /// Path to the scene (.json file)
        scene: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Helper to format evalgraph-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(core_err) = err.downcast_ref::<evalgraph_core::Error>() {
            anyhow::anyhow!("{}", core_err.with_hint())
        } else {
            err
        }
    };

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Inspect { scene, json } => {
            inspect::execute(&scene, config, json).map_err(format_error)?;
        }

        Commands::Dot { scene, output } => {
            dot::execute(&scene, config, output.as_deref()).map_err(format_error)?;
        }

        Commands::Eval {
            scene,
            frame,
            tags,
            threads,
            work_us,
            order,
        } => {
            let options = eval::EvalOptions {
                config,
                frame,
                threads,
                tags: &tags,
                work_us,
                show_order: order,
            };
            eval::execute(&scene, &options).map_err(format_error)?;
        }

        Commands::Check { scene } => {
            check::execute(&scene, config).map_err(format_error)?;
        }
    }

    Ok(())
}
