//! CLI runner: build a graph from a topology file and supervise it to
//! completion. Exits zero on end of stream, non-zero on failure.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mediagraph::core::{signals, Result, StageRegistry, Supervisor, TerminalCondition, TopologySpec};

#[derive(Parser)]
#[command(
    name = "mediagraph",
    version,
    about = "Run a media-processing graph described by a topology file"
)]
struct Cli {
    /// Topology file (YAML; `.json` files are parsed as JSON)
    topology: PathBuf,

    /// Default log filter when RUST_LOG is unset, e.g. "debug" or
    /// "mediagraph=trace"
    #[arg(long, default_value = "info")]
    log: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log)),
        )
        .init();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let spec = TopologySpec::from_path(&cli.topology)?;
    let graph = spec.build(&StageRegistry::with_builtins())?;

    let stop = signals::shutdown_flag()?;
    let terminal = Supervisor::new(graph).with_stop_flag(stop).run()?;
    match &terminal {
        TerminalCondition::Success => tracing::info!("end of stream"),
        TerminalCondition::Failure(reason) => tracing::error!(%reason, "graph failed"),
    }
    Ok(ExitCode::from(terminal.exit_code() as u8))
}
