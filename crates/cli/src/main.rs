//! Letarette CLI - indexer daemon and index maintenance.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logging;

use commands::{cmd_index_check, cmd_index_force_stemmer, cmd_index_stats, cmd_search, cmd_serve};
use letarette_core::Config;
use logging::{init_cli_logging, init_serve_logging};

#[derive(Parser)]
#[command(name = "letarette")]
#[command(about = "Cluster-oriented full-text search - indexer node")]
struct Cli {
  /// Path to the config file
  #[arg(short, long, default_value = "letarette.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the indexer until interrupted
  Serve,
  /// Search the local index
  Search {
    /// Space to search in
    space: String,
    /// Search phrase
    #[arg(required = true)]
    phrase: Vec<String>,
    /// Result limit
    #[arg(short, long, default_value = "10")]
    limit: u16,
    /// Result offset
    #[arg(short, long, default_value = "0")]
    offset: u16,
  },
  /// Index maintenance
  Index {
    #[command(subcommand)]
    command: IndexCommands,
  },
}

#[derive(Subcommand)]
enum IndexCommands {
  /// Show index statistics
  Stats,
  /// Verify stored stemmer settings against the config
  Check,
  /// Overwrite stored stemmer settings with the config
  ForceStemmer,
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let config = Config::load(&cli.config)?;

  // serve logs to file as well; one-shot commands log to the console
  let _guard = match &cli.command {
    Commands::Serve => {
      let log_dir = config
        .db
        .path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
      init_serve_logging(&log_dir)
    }
    _ => {
      init_cli_logging();
      None
    }
  };

  match cli.command {
    Commands::Serve => cmd_serve(config).await,
    Commands::Search {
      space,
      phrase,
      limit,
      offset,
    } => cmd_search(config, space, phrase, limit, offset).await,
    Commands::Index { command } => match command {
      IndexCommands::Stats => cmd_index_stats(config).await,
      IndexCommands::Check => cmd_index_check(config).await,
      IndexCommands::ForceStemmer => cmd_index_force_stemmer(config).await,
    },
  }
}
