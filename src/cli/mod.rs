pub mod commands;

use clap::{Parser, Subcommand};
use crate::config::LoggingConfig;
use crate::error::Result;
use crate::news::{ArticleQuery, InteractionType};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "edushorts-news")]
#[command(about = "Offline-aware client for the Edushorts news backend")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Treat the backend as unreachable
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a configuration file
    Init {
        /// Backend project URL
        #[arg(long)]
        backend_url: Option<String>,

        /// Public API key
        #[arg(long)]
        api_key: Option<String>,

        /// Directory for the article cache and offline queue
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// List published articles
    Articles {
        /// Only articles in this category
        #[arg(long)]
        category: Option<String>,

        /// Case-insensitive title search
        #[arg(short, long)]
        search: Option<String>,

        /// Maximum number of articles
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Print JSON instead of a listing
        #[arg(long)]
        json: bool,
    },

    /// Show a single article
    Article {
        /// Article id
        id: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Record an article view
    View {
        /// Article id
        article_id: String,
    },

    /// Record an interaction (view, share, bookmark, click)
    Interact {
        /// Article id
        article_id: String,

        /// Interaction type
        kind: InteractionType,

        /// Time spent, in seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Extra JSON metadata
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Replay actions recorded while offline
    Sync,

    /// Show connectivity, cache and queue status
    Status,

    /// Remove the cached article snapshot
    ClearCache,

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init { backend_url, api_key, data_dir, force } => {
                let _guard = commands::init_logging(self.debug, self.verbose, &LoggingConfig::default())?;
                commands::init(self.config, backend_url, api_key, data_dir, force).await
            }
            Commands::Completions { shell } => {
                commands::generate_completions(shell);
                Ok(())
            }
            command => {
                let config = commands::load_config(self.config, self.offline)?;

                // Initialize logging
                let _guard = commands::init_logging(self.debug, self.verbose, &config.logging)?;

                let service = commands::build_service(&config).await?;

                let result = match command {
                    Commands::Articles { category, search, limit, json } => {
                        let query = ArticleQuery { category_id: category, search, limit };
                        commands::list_articles(&service, &query, json).await
                    }
                    Commands::Article { id, json } => {
                        commands::show_article(&service, &id, json).await
                    }
                    Commands::View { article_id } => {
                        commands::track_view(&service, &article_id).await
                    }
                    Commands::Interact { article_id, kind, duration, metadata } => {
                        commands::track_interaction(&service, article_id, kind, duration, metadata).await
                    }
                    Commands::Sync => commands::sync(&service).await,
                    Commands::Status => commands::status(&service, &config).await,
                    Commands::ClearCache => commands::clear_cache(&service).await,
                    Commands::Init { .. } | Commands::Completions { .. } => Ok(()),
                };

                commands::flush_monitor(&service).await;
                result
            }
        }
    }
}
