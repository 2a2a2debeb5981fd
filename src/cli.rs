use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "activitylog")]
#[command(about = "Activity log ingestion service", long_about = None)]
pub struct Cli {
    /// Configuration file (overrides ACTIVITYLOG_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Consume activity events and serve the ops endpoints
    Serve,
    /// Print dead-lettered events of the configured durable as JSON lines
    DeadLetters(DeadLettersArgs),
}

#[derive(clap::Args, Debug)]
pub struct DeadLettersArgs {
    /// Maximum number of entries to print
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Durable name (defaults to stream.durable from config)
    #[arg(long)]
    pub durable: Option<String>,
}
