mod cli;

use activitylog::config::Config;
use activitylog::messaging::{FjallStream, MessageStream, StreamSettings};
use activitylog::observability::init_tracing;
use activitylog::server;
use clap::Parser;
use cli::{Cli, Commands, DeadLettersArgs};
use serde_json::json;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve => server::serve(config).await?,
        Commands::DeadLetters(args) => print_dead_letters(&config, args).await?,
    }

    Ok(())
}

async fn print_dead_letters(config: &Config, args: DeadLettersArgs) -> Result<(), AnyError> {
    let durable = args.durable.unwrap_or_else(|| config.stream.durable.clone());
    let stream = FjallStream::open(&config.stream.path, StreamSettings::from(&config.stream))?;

    for letter in stream.dead_letters(&durable, args.limit).await? {
        let line = json!({
            "seq": letter.seq,
            "durable": letter.durable,
            "subject": letter.subject,
            "reason": letter.reason,
            "attempts": letter.attempts,
            "failed_at": letter.failed_at,
            "payload": String::from_utf8_lossy(&letter.payload),
        });
        println!("{line}");
    }

    stream.close().await?;
    Ok(())
}
