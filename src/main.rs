mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use pipeline_services::{ClientMetadata, Config, Error as ServicesError, Parser as ConfigParser};
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(err) = e.downcast_ref::<ServicesError>() {
            eprintln!("Error: {}", err.with_suggestion());
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    match cli.command {
        // Validate reports its own progress, including a missing config file
        Commands::Validate => commands::run_validate(cli.config, &output::CliOutput),
        Commands::Start { services, attach } => {
            let (config_path, config) = load_config(cli.config)?;
            let client = match cli.client_id {
                Some(id) => ClientMetadata::new(id)?,
                None => config.client_metadata()?,
            };
            tracing::info!(
                client_id = %client.client_id,
                config = %config_path.display(),
                "Starting services"
            );
            commands::run_start(&config, client, services, attach, &output::CliOutput).await
        }
        Commands::Digest { services } => {
            let (_, config) = load_config(cli.config)?;
            commands::run_digest(&config, services, &output::CliOutput)
        }
    }
}

/// Load and validate the config at `path`, or the nearest one found upward.
fn load_config(path: Option<PathBuf>) -> anyhow::Result<(PathBuf, Config)> {
    let parser = ConfigParser::new();
    let config_path = match path {
        Some(path) => path,
        None => parser.find_config_file()?,
    };
    let config = parser.load_config(&config_path)?;
    config.validate()?;
    Ok((config_path, config))
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
