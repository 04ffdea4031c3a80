use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use clap::CommandFactory;
use clap_complete::{generate, Shell};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::cli::Cli;
use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use crate::monitoring::TracingSink;
use crate::network::{ConnectivityProbe, HttpProbe, StaticProbe};
use crate::news::{ArticleQuery, Interaction, InteractionType};
use crate::remote::RestClient;
use crate::service::{Fetched, NewsService, SyncOutcome, Tracked};
use crate::storage::FileStore;

/// Write a configuration file and create the data directory
pub async fn init(
    config_path: Option<PathBuf>,
    backend_url: Option<String>,
    api_key: Option<String>,
    data_dir: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    info!("Initializing edushorts-news configuration");

    let config_file = get_config_file(config_path)?;
    if config_file.exists() && !force {
        warn!("Configuration file already exists: {}", config_file.display());
        println!("⚠️  Configuration already exists at {}", config_file.display());
        println!("   Use --force to overwrite it.");
        return Ok(());
    }

    if let Some(parent) = config_file.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut config = Config::default();
    if let Some(url) = backend_url {
        config.backend.url = url;
    }
    if let Some(key) = api_key {
        config.backend.api_key = key;
    }
    config.storage.data_dir = data_dir;
    config.validate()?;
    config.save(&config_file)?;
    info!("Created configuration: {}", config_file.display());

    let data_dir = config.data_dir()?;
    FileStore::new(&data_dir)?;

    println!("✅ edushorts-news initialized successfully!");
    println!("   Config file: {}", config_file.display());
    println!("   Data directory: {}", data_dir.display());
    println!();
    println!("Next steps:");
    println!("   1. List articles: edushorts-news articles");
    println!("   2. Check status: edushorts-news status");

    Ok(())
}

/// Load the configuration file if there is one, otherwise defaults, then
/// apply environment overrides
pub fn load_config(config_path: Option<PathBuf>, offline: bool) -> Result<Config> {
    let mut config = match config_path {
        Some(path) => Config::load_with_env(path)?,
        None => {
            let default_file = get_config_file(None)?;
            if default_file.exists() {
                Config::load_with_env(default_file)?
            } else {
                Config::from_env()?
            }
        }
    };

    if offline {
        config.connectivity.force_offline = true;
    }

    Ok(config)
}

/// Wire the service to the on-disk store, the REST backend and a probe
pub async fn build_service(config: &Config) -> Result<NewsService> {
    let store = FileStore::new(config.data_dir()?)?;
    let removed = store.cleanup()?;
    if removed > 0 {
        debug!("Removed {} leftover temporary files", removed);
    }

    let remote = RestClient::new(config.rest_client_config())?;

    let probe: Arc<dyn ConnectivityProbe> = if config.connectivity.force_offline {
        info!("Offline mode forced by configuration");
        Arc::new(StaticProbe::offline())
    } else {
        Arc::new(HttpProbe::new(config.probe_url(), config.probe_timeout())?)
    };

    Ok(NewsService::with_config(
        Arc::new(remote),
        probe,
        Arc::new(store),
        config.service_config(),
    )
    .await)
}

pub async fn list_articles(service: &NewsService, query: &ArticleQuery, json: bool) -> Result<()> {
    let fetched = service.get_articles(query).await;

    if json {
        println!("{}", serde_json::to_string_pretty(fetched.articles())?);
        return Ok(());
    }

    match &fetched {
        Fetched::Fresh(articles) => {
            println!("📰 Latest articles ({})", articles.len());
        }
        Fetched::Cached(articles) => {
            println!("📦 Showing {} cached articles (backend unavailable, filters not applied)", articles.len());
        }
        Fetched::Empty => {
            println!("📭 No articles available.");
            return Ok(());
        }
    }
    println!("========================");

    for article in fetched.articles() {
        println!("\n• {}", article.headline());
        println!("  id: {}  views: {}", article.id, article.view_count);
        if let Some(summary) = &article.summary {
            println!("  {}", summary);
        }
    }

    Ok(())
}

pub async fn show_article(service: &NewsService, id: &str, json: bool) -> Result<()> {
    let article = service
        .get_article_by_id(id)
        .await
        .ok_or_else(|| Error::NotFound(format!("Article '{}' is not available", id)))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&article)?);
    } else {
        println!("{}", article.to_text());
    }

    Ok(())
}

pub async fn track_view(service: &NewsService, article_id: &str) -> Result<()> {
    report_tracked(service.track_view(article_id).await, "View", article_id);
    Ok(())
}

pub async fn track_interaction(
    service: &NewsService,
    article_id: String,
    kind: InteractionType,
    duration: Option<u64>,
    metadata: Option<String>,
) -> Result<()> {
    let mut interaction = Interaction::new(article_id, kind);
    interaction.duration = duration;

    if let Some(raw) = metadata {
        let value = serde_json::from_str(&raw)
            .map_err(|e| Error::Invalid(format!("Metadata must be valid JSON: {}", e)))?;
        interaction.metadata = Some(value);
    }

    let article_id = interaction.article_id.clone();
    report_tracked(service.track_interaction(interaction).await, "Interaction", &article_id);
    Ok(())
}

fn report_tracked(tracked: Tracked, what: &str, article_id: &str) {
    match tracked {
        Tracked::Sent => println!("✅ {} recorded for {}", what, article_id),
        Tracked::Queued => println!("📥 Offline: {} for {} queued for the next sync", what.to_lowercase(), article_id),
        Tracked::Failed => println!("❌ {} for {} could not be recorded (see logs)", what, article_id),
    }
}

pub async fn sync(service: &NewsService) -> Result<()> {
    match service.sync_offline_actions().await {
        SyncOutcome::Offline => {
            let pending = service.queue().len().await;
            println!("📴 Backend unreachable; {} actions remain queued.", pending);
        }
        SyncOutcome::Synced(report) if report.attempted == 0 => {
            println!("✅ Nothing to sync.");
        }
        SyncOutcome::Synced(report) => {
            println!("🔄 Synced offline actions:");
            println!("   Delivered: {}", report.delivered);
            println!("   Kept for retry: {}", report.retained);
            println!("   Dropped: {}", report.dropped);
        }
    }

    Ok(())
}

pub async fn status(service: &NewsService, config: &Config) -> Result<()> {
    let status = service.status().await;

    println!("📊 edushorts-news status");
    println!("========================");
    println!("Backend: {}", config.backend.url);
    println!("Connectivity: {}", if status.online { "🟢 online" } else { "🔴 offline" });
    println!("Data directory: {}", config.data_dir()?.display());

    match status.cache_age {
        Some(age) => println!(
            "Cached articles: {} (updated {} min ago)",
            status.cached_articles,
            age.as_secs() / 60
        ),
        None => println!("Cached articles: none"),
    }

    println!("Pending offline actions: {}", status.pending_actions);

    match status.last_sync {
        Some(at) => println!("Last sync: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("Last sync: never"),
    }

    let stats = service.cache().stats();
    debug!(
        "Cache stats: {} hits, {} misses, {} expirations, {:.1}% hit rate",
        stats.hits, stats.misses, stats.expirations, stats.hit_rate() * 100.0
    );

    Ok(())
}

pub async fn clear_cache(service: &NewsService) -> Result<()> {
    service.clear_cache().await;
    println!("🧹 Article cache cleared.");
    Ok(())
}

/// Hand buffered monitoring events to the log before exiting
pub async fn flush_monitor(service: &NewsService) {
    if let Err(e) = service.monitor().flush_all(&TracingSink).await {
        warn!("Failed to flush monitoring events: {}", e);
    }
}

pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

/// Initialize logging. Console output goes to stderr; with `log_to_file`
/// events are written to the configured file instead and the returned guard
/// must be held until exit.
pub fn init_logging(debug: bool, verbose: bool, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = log_level(debug, verbose, logging);
    let filter = EnvFilter::try_new(level)
        .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", level, e)))?;

    if logging.log_to_file {
        let path = Path::new(&logging.log_file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .ok_or_else(|| Error::Config(format!("Invalid log file '{}'", logging.log_file)))?;

        fs::create_dir_all(dir)?;
        let (writer, guard) = tracing_appender::non_blocking(
            tracing_appender::rolling::never(dir, file_name)
        );

        let builder = fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false);

        let result = if logging.json_format {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        result.map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

        debug!("Logging to {}", path.display());
        return Ok(Some(guard));
    }

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(debug)
        .with_line_number(debug)
        .with_writer(io::stderr);

    let result = if logging.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

    debug!("Logging initialized");
    Ok(None)
}

/// `--debug` and `--verbose` win over the configured level
fn log_level(debug: bool, verbose: bool, logging: &LoggingConfig) -> &str {
    if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        logging.level.as_str()
    }
}

/// Get the configuration file path
fn get_config_file(config_path: Option<PathBuf>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path),
        None => Config::default_config_file(),
    }
}
