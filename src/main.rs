mod config;
mod error;
mod fetch;
mod log_entry;
mod output;
mod poller;
mod session;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = config::Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    // Load configuration
    let config = config::load_config(&cli)?;
    info!("Configuration loaded successfully");

    let mut client = session::FritzClient::new(
        &config.base_url,
        &config.username,
        &config.password,
        Duration::from_secs(config.timeout),
    )?;

    if cli.agent {
        info!("Starting agent mode with interval {} seconds", config.interval);
        poller::run(client, &config).await?;
        return Ok(());
    }

    // One-shot mode: a single fetch, hard failure on error.
    let (mut entries, payload) = client.fetch_log_with_retry().await?;
    if cli.print_payload {
        output::emit_payload(&payload, &config.output)?;
        return Ok(());
    }
    entries.sort_by_key(|entry| entry.timestamp);
    output::emit_entries(&entries, config.output_format, &config.output)?;
    Ok(())
}
