//! Dining philosophers demo.
//!
//! Seats a ring of Chandy-Misra philosophers, lets them dine and prints who ate how much.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use philosophers::{sync::think::Think, Table, TableConfig};

#[derive(Parser)]
#[command(name = "philosophers")]
#[command(about = "Chandy-Misra dining philosophers over per-philosopher mailboxes")]
struct Cli {
    /// JSON table configuration, the flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of philosophers
    #[arg(short, long)]
    philosophers: Option<usize>,

    /// How long dinner lasts, in seconds
    #[arg(short, long, default_value = "5")]
    seconds: u64,

    /// Think procedure: idle, nap, primes
    #[arg(short, long)]
    think: Option<String>,

    /// Time spent eating per meal, in milliseconds
    #[arg(long)]
    eat_ms: Option<u64>,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

fn parse_think(s: &str) -> Option<Think> {
    match s.to_lowercase().as_str() {
        "idle" => Some(Think::Idle),
        "nap" => Some(Think::default()),
        "primes" => Some(Think::Primes {
            limit: Think::PRIMES_LIMIT,
        }),
        _ => None,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &cli.config {
        Some(path) => TableConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TableConfig::default(),
    };
    if let Some(philosophers) = cli.philosophers {
        config.philosophers = philosophers;
    }
    if let Some(think) = &cli.think {
        match parse_think(think) {
            Some(think) => config.think = think,
            None => warn!(think = %think, "unknown think procedure, keeping {:?}", config.think),
        }
    }
    if let Some(eat_ms) = cli.eat_ms {
        config.eat_ms = eat_ms;
    }

    info!(?config, seconds = cli.seconds, "starting");
    let table = Table::new(config)?;
    let report = table.run(Duration::from_secs(cli.seconds))?;
    println!("{report}");
    Ok(())
}
