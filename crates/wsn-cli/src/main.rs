use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use wsn_routing::Role;
use wsn_types::{NodeKind, ScenarioFile};

#[derive(Parser, Debug)]
#[command(author, version, about = "Wireless sensor network routing simulator")]
struct Args {
    /// TOML scenario file describing the topology and run parameters.
    #[arg(long)]
    scenario: PathBuf,

    /// Override the scenario's `run_until` (virtual seconds).
    #[arg(long)]
    run_until: Option<f64>,

    /// Override the scenario's RNG seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Write the performance report as JSON to this path instead of stdout.
    #[arg(long)]
    report_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    info!(scenario = %args.scenario.display(), "wsn starting");

    let content = fs::read_to_string(&args.scenario)
        .with_context(|| format!("failed to read scenario file {}", args.scenario.display()))?;
    let scenario: ScenarioFile = toml::from_str(&content).context("failed to parse scenario file")?;
    let (network, mut config) = scenario.build().context("failed to build network from scenario")?;
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    let run_until = args.run_until.unwrap_or(scenario.run_until);

    let deadline = config.deadline;
    let protocol_kind = config.routing_protocol;
    let simulation = wsn_sim::Simulation::new(network, &config, move |node| {
        let role = if matches!(node.kind, NodeKind::Sink) { Role::Sink } else { Role::Sensing };
        wsn_routing::build(protocol_kind, role, deadline)
    });

    simulation.run(run_until);

    let sink_shared = simulation
        .sink_shared()
        .context("scenario has no sink node")?;
    let received = sink_shared.borrow().received_messages.clone();
    let report = wsn_routing::compute_performance(&received, deadline);

    match &args.report_out {
        Some(path) => {
            let data = serde_json::to_vec_pretty(&report).context("failed to serialize performance report")?;
            fs::write(path, &data)
                .with_context(|| format!("failed to write report file {}", path.display()))?;
            info!(path = %path.display(), "performance report written");
        }
        None => {
            let data = serde_json::to_string_pretty(&report).context("failed to serialize performance report")?;
            println!("{data}");
        }
    }

    Ok(())
}
