use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "siga")]
#[command(about = "Social ingestion and graph aggregation command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one ingestion cycle over a delivered batch file.
    Ingest {
        /// Path to a JSON batch as delivered by a source provider.
        #[arg(long)]
        batch: PathBuf,
        /// Query-rotation cursor for this cycle.
        #[arg(long, default_value_t = 0)]
        cursor: usize,
    },
    /// Print a digest of the most recent cycle reports.
    Report {
        #[arg(long, default_value_t = 3)]
        runs: usize,
    },
}

/// Default filter: info for every workspace crate, env overrides on top.
/// Directives name module-path targets, so each crate needs its own.
fn log_filter() -> Result<EnvFilter> {
    let mut filter = EnvFilter::from_default_env();
    for target in ["siga_sync", "siga_storage", "siga_graph", "siga_core"] {
        filter = filter.add_directive(format!("{target}=info").parse()?);
    }
    Ok(filter)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(log_filter()?).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest { batch, cursor } => {
            let summary = siga_sync::run_cycle_from_env(batch, cursor).await?;
            println!(
                "cycle complete: run_id={} platform={} new_records={} superseded={} new_edges={} next_cursor={} reports={}",
                summary.run_id,
                summary.platform,
                summary.new_records,
                summary.superseded,
                summary.new_edges,
                summary.next_cursor,
                summary.reports_dir
            );
        }
        Commands::Report { runs } => {
            let digest = siga_sync::report_recent(runs, None)?;
            println!("{digest}");
        }
    }

    Ok(())
}
