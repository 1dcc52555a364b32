use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "psvc")]
#[command(about = "Pipeline Services - Start and share the services pipeline steps depend on")]
pub struct Cli {
    /// Config file path (defaults to pipeline-services.yaml, searched upward)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Client the services are started for (overrides client_id in the config)
    #[arg(long, env = "PSVC_CLIENT_ID")]
    pub client_id: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start services and keep them running until Ctrl-C
    Start {
        /// Services to start (defaults to all)
        services: Vec<String>,

        /// Attach service stdout/stderr to this terminal
        #[arg(short, long)]
        attach: bool,
    },
    /// Print the identity digest of services
    Digest {
        /// Services to describe (defaults to all)
        services: Vec<String>,
    },
    /// Validate the configuration file
    Validate,
}
