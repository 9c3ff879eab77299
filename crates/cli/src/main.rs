//! agentloom CLI: the main entry point.
//!
//! Commands:
//! - `serve`  : Start the HTTP gateway
//! - `run`    : Run one query against a configured agent, printing events
//! - `agents` : List configured agents
//! - `tools`  : List built-in tools

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "agentloom",
    about = "agentloom: LLM agents with tools, plans and chains",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ~/.agentloom/config.toml)
    #[arg(short, long, global = true, env = "AGENTLOOM_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run a single query and stream the agent's events
    Run {
        /// Agent id
        #[arg(short, long)]
        agent: String,

        /// Override the agent's model for this run
        #[arg(short, long)]
        model: Option<String>,

        /// Override the agent's step budget for this run
        #[arg(long)]
        max_steps: Option<usize>,

        /// The query
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// List configured agents
    Agents,

    /// List built-in tools
    Tools,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Run {
            agent,
            model,
            max_steps,
            query,
        } => commands::run::run(config_path, agent, query.join(" "), model, max_steps).await?,
        Commands::Agents => commands::agents::run(config_path)?,
        Commands::Tools => commands::tools::run()?,
    }

    Ok(())
}
