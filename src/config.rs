use crate::output::OutputFormat;
use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "fritz-log-agent", version, about)]
pub struct Cli {
    /// Path to an optional TOML configuration file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Fritz!Box base URL
    #[clap(long)]
    pub base_url: Option<String>,

    /// Fritz!Box username
    #[clap(long, env = "FRITZBOX_USERNAME")]
    pub username: Option<String>,

    /// Fritz!Box password
    #[clap(long, env = "FRITZBOX_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Emit entries in this format
    #[clap(long, value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Write output to a file path or stdout ("-" or "stdout")
    #[clap(long)]
    pub output: Option<String>,

    /// Print the full JSON response once (one-shot mode only)
    #[clap(long, conflicts_with = "agent")]
    pub print_payload: bool,

    /// Run continuously, emitting only entries not seen before
    #[clap(long)]
    pub agent: bool,

    /// Polling interval in seconds for agent mode
    #[clap(long)]
    pub interval: Option<u64>,

    /// HTTP timeout in seconds
    #[clap(long)]
    pub timeout: Option<u64>,

    /// Persist dedup state to this file between runs (agent mode)
    #[clap(long)]
    pub state_file: Option<PathBuf>,

    /// Enable debug logging
    #[clap(long)]
    pub debug: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub output_format: Option<OutputFormat>,
    pub output: Option<String>,
    pub interval: Option<u64>,
    pub timeout: Option<u64>,
    pub state_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub output_format: OutputFormat,
    pub output: String,
    pub interval: u64,
    pub timeout: u64,
    pub state_file: Option<PathBuf>,
}

/// Merges CLI flags (and their env-var fallbacks) over the optional config
/// file. Credentials are resolved in that same order: flag, environment,
/// config file; running without any source is a startup error.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let file = match &cli.config {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse config file")?
        }
        None => FileConfig::default(),
    };

    let username = cli.username.clone().or(file.username);
    let password = cli.password.clone().or(file.password);
    let (Some(username), Some(password)) = (username, password) else {
        bail!(
            "Missing username or password (use --username/--password, \
             FRITZBOX_USERNAME/FRITZBOX_PASSWORD, or the config file)"
        );
    };

    Ok(Config {
        base_url: cli
            .base_url
            .clone()
            .or(file.base_url)
            .unwrap_or_else(|| "http://fritz.box".to_string()),
        username,
        password,
        output_format: cli
            .output_format
            .or(file.output_format)
            .unwrap_or(OutputFormat::Jsonl),
        output: cli
            .output
            .clone()
            .or(file.output)
            .unwrap_or_else(|| "-".to_string()),
        interval: cli.interval.or(file.interval).unwrap_or(60),
        timeout: cli.timeout.or(file.timeout).unwrap_or(10),
        state_file: cli.state_file.clone().or(file.state_file),
    })
}
