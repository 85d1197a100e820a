use clap::{Parser, Subcommand};
use pypsa_helper_bot::Result;
use pypsa_helper_bot::commands::{check_updates, fetch_index, ingest, serve, show_status};
use pypsa_helper_bot::config::{Config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pypsa-helper-bot")]
#[command(about = "Discord bot answering PyPSA ecosystem questions from a retrieval index")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, the index and cloned repositories
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone the source repositories and build the index locally
    Ingest,
    /// Download the latest published index
    FetchIndex {
        /// Download even if the local index is fresh
        #[arg(long)]
        force: bool,
    },
    /// Check whether a newer published index exists
    CheckUpdates,
    /// Show index and backend status
    Status,
    /// Run the Discord bot
    Serve,
    /// Show or write the configuration file
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => Config::default_base_dir()
            .map_err(|e| pypsa_helper_bot::HelperError::Config(e.to_string()))?,
    };
    let config = Config::load(&base_dir)?;

    match cli.command {
        Commands::Ingest => ingest(&config).await?,
        Commands::FetchIndex { force } => fetch_index(&config, force).await?,
        Commands::CheckUpdates => check_updates(&config).await?,
        Commands::Status => show_status(&config).await?,
        Commands::Serve => serve(&config).await?,
        Commands::Config { show } => {
            if show {
                show_config(&config)?;
            } else {
                config.save()?;
                println!("Configuration written to {}", config.config_file_path().display());
            }
        }
    }

    Ok(())
}
