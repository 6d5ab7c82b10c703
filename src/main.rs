use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use env_logger::Builder;
use log::{LevelFilter, info, warn};

use mote_topology::common::config::{PersistenceMode, TopologySettings};
use mote_topology::common::summary::format_topology_report;
use mote_topology::simulation::types::{MoteRegistry, RadioParameters};
use mote_topology::simulation::{build_topology, rng_from_settings};

const DEFAULT_MOTE_COUNT: u32 = 10;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Generate,
    Read,
    Write,
}

impl From<ModeArg> for PersistenceMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Generate => PersistenceMode::Generate,
            ModeArg::Read => PersistenceMode::Read,
            ModeArg::Write => PersistenceMode::Write,
        }
    }
}

#[derive(Parser)]
#[command(name = "mote-topology")]
#[command(version, about = "Build the layout and link table of a mote network", long_about = None)]
struct Cli {
    /// TOML settings file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of motes, mote 0 is the root
    #[arg(short, long, default_value_t = DEFAULT_MOTE_COUNT)]
    motes: u32,

    /// Seed overriding the configured one
    #[arg(short, long)]
    seed: Option<u64>,

    /// Persistence mode overriding the configured one
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Topology file overriding the configured one
    #[arg(long)]
    topology_file: Option<PathBuf>,

    /// Run number printed in the report
    #[arg(long, default_value_t = 0)]
    run: u32,
}

fn main() -> Result<()> {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("mote_topology"), LevelFilter::Debug)
        .init();

    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => TopologySettings::load(path).with_context(|| format!("Failed to load settings: {}", path.display()))?,
        None => TopologySettings::default(),
    };
    if let Some(seed) = cli.seed {
        settings.seed = Some(seed);
    }
    if let Some(mode) = cli.mode {
        settings.persistence = mode.into();
    }
    if let Some(path) = cli.topology_file {
        settings.topology_file = Some(path);
    }
    settings.validate().context("Invalid settings")?;

    if cli.motes == 0 {
        anyhow::bail!("At least one mote (the root) is required");
    }

    let mut registry = MoteRegistry::with_motes(cli.motes, RadioParameters::default());
    let mut rng = rng_from_settings(&settings);
    let summary = build_topology(&mut registry, &settings, &mut rng).context("Topology construction failed")?;

    info!(
        "Run {}: {} placement attempts, {} restored and {} completed links",
        cli.run,
        summary.placement.total_attempts(),
        summary.restored_links,
        summary.completed_links
    );
    let under_connected = summary.placement.under_connected();
    if !under_connected.is_empty() {
        warn!("{} replayed motes are below the stable neighbor requirement: {:?}", under_connected.len(), under_connected);
    }

    println!("{}", format_topology_report(cli.run, &registry));
    Ok(())
}
