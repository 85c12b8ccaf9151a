use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use newswire::config::Config;
use newswire::feed::{import_opml, FeedPoller};
use newswire::ingest::{Ingestor, Scheduler};
use newswire::storage::{Database, DatabaseError, FeedSource, DEFAULT_PAGE_SIZE};
use newswire::util::validate_url;

/// Get the config directory path (~/.config/newswire/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newswire"))
}

/// Create the config directory if needed, restricted to the current user
fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    Ok(())
}

#[derive(Parser, Debug)]
#[command(
    name = "newswire",
    version,
    about = "Headless RSS/Atom ingester backed by SQLite"
)]
struct Args {
    /// Config file (default: ~/.config/newswire/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding `database_path` from the config
    #[arg(long, value_name = "FILE", global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest on the configured schedule until interrupted (Ctrl-C)
    Run,
    /// Run one ingestion pass now and print its report
    Refresh,
    /// Register a feed source
    AddSource {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
    },
    /// Register every feed listed in an OPML file
    ImportOpml {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// List configured sources
    Sources,
    /// Print one page of items, newest first
    List {
        /// Zero-based page number
        #[arg(long, default_value_t = 0)]
        page: u32,
        /// Items per page (capped at 100)
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        size: u32,
    },
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

async fn open_database(path: &Path) -> Result<Database> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    match Database::open(path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::Locked) => {
            eprintln!(
                "Error: The database at {} is locked by another process. Please try again.",
                path.display()
            );
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

fn build_ingestor(db: Database, config: &Config) -> Result<Arc<Ingestor>> {
    let poller = FeedPoller::new(&config.fetch_options()).context("Failed to build HTTP client")?;
    Ok(Arc::new(Ingestor::new(db, poller, config.normalizer())))
}

/// Validate and store one source. The URL is trimmed once so the stored
/// value is the one that passed validation.
async fn register_source(db: &Database, name: &str, url: &str) -> Result<FeedSource> {
    let url = url.trim();
    validate_url(url).with_context(|| format!("Rejected feed URL: {}", url))?;
    db.add_source(name.trim(), url)
        .await
        .context("Failed to add source")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output on stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = match args.database.clone().or_else(|| config.database_path.clone()) {
        Some(path) => path,
        None => {
            ensure_config_dir(&config_dir)?;
            config_dir.join("newswire.db")
        }
    };
    let db = open_database(&db_path).await?;

    match args.command {
        Command::Run => {
            let ingestor = build_ingestor(db, &config)?;
            let scheduler = Scheduler::start(ingestor, &config.schedule)
                .context("Failed to start scheduler")?;
            if let Some(next) = scheduler.next_fire() {
                tracing::info!(next = %next, "Waiting for first scheduled pass");
            }

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            scheduler.shutdown();
        }
        Command::Refresh => {
            let ingestor = build_ingestor(db, &config)?;
            let report = ingestor.run_pass().await.context("Ingestion pass failed")?;
            print_json(&report)?;
        }
        Command::AddSource { name, url } => {
            let source = register_source(&db, &name, &url).await?;
            print_json(&source)?;
        }
        Command::ImportOpml { file } => {
            let sources = import_opml(&file)
                .await
                .with_context(|| format!("Failed to import OPML file: {}", file.display()))?;
            if sources.is_empty() {
                eprintln!("Warning: No valid feeds found in OPML file");
                eprintln!("The file may be empty or contain only invalid URLs");
            }
            let count = db
                .add_sources(&sources)
                .await
                .context("Failed to register sources")?;
            println!("Imported {} feed sources from {}", count, file.display());
        }
        Command::Sources => {
            let sources = db.list_sources().await.context("Failed to list sources")?;
            print_json(&sources)?;
        }
        Command::List { page, size } => {
            let page = db
                .list_items_paged(page, size)
                .await
                .context("Failed to list items")?;
            print_json(&page)?;
        }
    }

    Ok(())
}
