//! Shapwell CLI: sample a background, train the signal classifier, and
//! serve Shapley attributions for it.

mod commands;

use clap::Parser;
use std::path::PathBuf;

/// Shapwell: explain a recurrent signal classifier over HTTP
#[derive(Parser, Debug)]
#[command(name = "shapwell", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (relative artifact paths and shapwell.toml resolve here)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (replaces the workspace shapwell.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Generate and save the background sample
    Background {
        /// Number of sequences
        #[arg(short = 'n', long)]
        count: Option<usize>,
        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Train the classifier on synthetic data and save it
    Train {
        #[arg(long)]
        epochs: Option<usize>,
        /// Number of synthetic sequences
        #[arg(long)]
        samples: Option<usize>,
        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,
        /// Do not write the background sample from the training data
        #[arg(long)]
        no_background: bool,
    },
    /// Load the artifacts and serve POST /shap
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default shapwell.toml in the workspace
    Init,
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());

    if let Commands::Config {
        action: ConfigAction::Init,
    } = cli.command
    {
        return commands::init_config(&workspace);
    }

    let config = shapwell_core::load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let _guard = shapwell_core::logging::init_tracing(cli.verbose, cli.quiet, &config.logging);

    commands::handle_command(cli.command, config, &workspace).await
}
