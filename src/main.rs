use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ibhealth::config::{CommandLineArgs, Config};
use ibhealth::{csv_generic, orchestrator, payload};

#[derive(Parser, Debug)]
#[command(name = "ibhealth")]
#[command(version, about = "InfiniBand fabric health check")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    config_args: CommandLineArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full analysis pipeline over an extracted ibdiagnet dump
    /// directory (spec.md §6 `analyze_ibdiagnet`).
    Analyze {
        /// Directory the dump archive was extracted into
        dataset_root: PathBuf,
    },
    /// Parse a generic CSV file in streaming chunks and print a preview
    /// (spec.md §6 `analyze_csv`).
    Csv {
        file_path: PathBuf,
        #[arg(long, default_value_t = 10_000)]
        chunk_size: usize,
        #[arg(long, default_value_t = 1_000)]
        preview_rows: usize,
    },
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_args(&cli.config_args).unwrap_or_default();
    init_tracing(&config.logging.level);

    match cli.command {
        Command::Analyze { dataset_root } => {
            let result = orchestrator::analyze(&dataset_root, config.worker.pool_size).await?;
            let built = payload::build(&result, config.worker.preview_row_limit);
            println!("{}", serde_json::to_string_pretty(&built)?);
        },
        Command::Csv { file_path, chunk_size, preview_rows } => {
            let preview = csv_generic::analyze_csv(&file_path, chunk_size, preview_rows)?;
            println!("{}", serde_json::to_string_pretty(&preview)?);
        },
    }

    Ok(())
}
