//! defect-scan CLI - surface defect inspection tool

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::batch::BatchArgs;
use commands::inspect::InspectArgs;
use commands::train::TrainArgs;

/// Surface defect inspection and severity classification tool.
#[derive(Parser)]
#[command(name = "defect-scan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a single image for surface defects
    Inspect(InspectArgs),

    /// Inspect every supported image in a directory
    Batch(BatchArgs),

    /// Train a severity model on synthetic labeled data and save it
    Train(TrainArgs),

    /// Show aggregate statistics over a defect store
    Stats {
        /// JSONL defect store
        store: PathBuf,
    },

    /// List recent defect records
    Recent {
        /// JSONL defect store
        store: PathBuf,

        /// Maximum number of records to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Inspect(args) => commands::inspect::run(args),
        Commands::Batch(args) => commands::batch::run(args),
        Commands::Train(args) => commands::train::run(args),
        Commands::Stats { store } => commands::stats::run_stats(&store),
        Commands::Recent { store, limit } => commands::stats::run_recent(&store, limit),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
