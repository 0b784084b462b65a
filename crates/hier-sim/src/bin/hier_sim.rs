use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hier_sched::SchedulerConfig;
use hier_sim::{ScenarioConfig, Simulation};

/// Run a traffic scenario through the scheduler and report the allocation.
#[derive(Parser, Debug)]
#[command(name = "hier-sim", about = "Per-flow scheduler traffic simulation")]
struct Cli {
    /// Scheduler configuration (TOML). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Traffic scenario (TOML).
    #[arg(long)]
    scenario: PathBuf,

    /// Print the report as JSON instead of a table.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hier_sim=info,hier_sched=warn")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            SchedulerConfig::from_toml_str(&raw)
                .with_context(|| format!("loading {}", path.display()))?
        }
        None => SchedulerConfig::default(),
    };

    let raw = fs::read_to_string(&cli.scenario)
        .with_context(|| format!("reading {}", cli.scenario.display()))?;
    let scenario = ScenarioConfig::from_toml_str(&raw)
        .with_context(|| format!("loading {}", cli.scenario.display()))?;

    let report = Simulation::new(&config, scenario)?.run();
    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{report}");
    }
    Ok(())
}
