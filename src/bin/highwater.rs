//! highwater: operator CLI for node registration, sequence numbers and
//! high water marks.
//!
//! Configuration comes from `--config <file.json>` if given, otherwise from
//! `HIGHWATER_*` environment variables. `--database` overrides the store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use highwater::config::MEMORY_DATABASE;
use highwater::{Engine, EngineConfig, HighWaterMarkSet, StoreConfig};

#[derive(Parser)]
#[command(name = "highwater")]
#[command(about = "Node identity, sequence numbers and replication gap detection")]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database path, or ":memory:" (overrides the configuration)
    #[arg(short, long)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a node and print its id
    Register {
        url: String,
        #[arg(default_value = "")]
        metadata: String,
    },
    /// Show a registered node
    Lookup { node_id: String },
    /// List registered nodes
    Nodes,
    /// Issue the next sequence number (local node's clock if none is given)
    Next { clock_id: Option<String> },
    /// Record an observed high water mark
    Record {
        node_id: String,
        clock_id: String,
        tsn: u64,
    },
    /// Print the local high water mark snapshot as JSON
    Snapshot,
    /// Highest observed sequence number for a clock
    CheckHigh { clock_id: String },
    /// Compare a peer's snapshot (JSON file) with ours and print the gaps
    Gaps { remote: PathBuf },
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::from_env().context("reading HIGHWATER_* environment")?,
    };

    if let Some(database) = &cli.database {
        config.store = if database == MEMORY_DATABASE {
            StoreConfig::Memory
        } else {
            StoreConfig::sqlite(database)
        };
    }

    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let engine = Engine::open(&config).context("opening engine")?;

    match cli.command {
        Command::Register { url, metadata } => {
            let id = engine.registry().register(&url, &metadata)?;
            println!("{}", id);
        }
        Command::Lookup { node_id } => {
            let node = engine.registry().lookup(&node_id)?;
            println!("{}", serde_json::to_string_pretty(&node)?);
        }
        Command::Nodes => {
            for node in engine.registry().nodes()? {
                println!("{}\t{}\t{}", node.id, node.url, node.metadata);
            }
        }
        Command::Next { clock_id } => {
            let tsn = match clock_id {
                Some(clock_id) => engine.sequences().next(&clock_id)?,
                None => engine.next_local()?,
            };
            println!("{}", tsn);
        }
        Command::Record {
            node_id,
            clock_id,
            tsn,
        } => {
            let advanced = engine.marks().record_observed(&node_id, &clock_id, tsn)?;
            if !advanced {
                log::info!("({}, {}) already at {}", node_id, clock_id, tsn);
            }
        }
        Command::Snapshot => {
            let snapshot = engine.marks().get_remote_highs()?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::CheckHigh { clock_id } => {
            println!("{}", engine.marks().check_high(&clock_id)?);
        }
        Command::Gaps { remote } => {
            let data = std::fs::read(&remote)
                .with_context(|| format!("reading {}", remote.display()))?;
            let remote: HighWaterMarkSet =
                serde_json::from_slice(&data).context("parsing remote snapshot")?;
            let gaps = engine.coordinator().pending(&remote)?;
            println!("{}", serde_json::to_string_pretty(&gaps)?);
        }
    }

    Ok(())
}
