//! Saga - a serialized story engine on the command line.
//!
//! With no subcommand, runs an interactive menu:
//!
//! ```bash
//! cargo run -p saga
//! ```
//!
//! Scripted use:
//!
//! ```bash
//! cargo run -p saga -- init
//! cargo run -p saga -- generate --count 3
//! cargo run -p saga -- search "the warship"
//! ```

mod menu;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use saga_core::config::{Settings, WorldSeed};
use saga_core::memory::JsonStore;
use saga_core::StoryEngine;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "saga")]
#[command(version)]
#[command(about = "Plans, writes, checks and remembers the chapters of a serialized story")]
struct Cli {
    /// Directory for story memory and chapter files
    #[arg(long, env = "SAGA_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Directory holding llm_config.yaml, style_guide.yaml and world_seed.yaml
    #[arg(long, env = "SAGA_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new story from world_seed.yaml
    Init {
        /// Replace an existing story (it is backed up first)
        #[arg(long)]
        force: bool,
    },

    /// Generate the next chapters
    Generate {
        /// Number of chapters to generate
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },

    /// Show story statistics
    Stats,

    /// List memory backups, newest first
    Backups,

    /// Restore story memory from a backup
    Restore {
        /// Backup file name as shown by `saga backups`
        name: String,
    },

    /// Search past events (or chapters) by meaning
    Search {
        query: String,

        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 5)]
        limit: usize,

        /// Search chapter summaries instead of events
        #[arg(long)]
        chapters: bool,
    },

    /// Show how a plot thread has developed
    Thread {
        /// Thread name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("saga={log_level},saga_core={log_level},llm={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let settings = Settings::from_env()
        .with_data_dir(cli.data_dir)
        .with_config_dir(cli.config_dir);

    match cli.command {
        None => menu::run(&settings).await,
        Some(Commands::Init { force }) => init(&settings, force).await,
        Some(Commands::Generate { count }) => generate(&settings, count).await,
        Some(Commands::Stats) => {
            let engine = open_engine(&settings).await?;
            println!("{}", engine.stats()?);
            Ok(())
        }
        Some(Commands::Backups) => list_backups(&settings).await,
        Some(Commands::Restore { name }) => {
            store(&settings).await?.restore_backup(&name).await?;
            println!("Restored {name}");
            Ok(())
        }
        Some(Commands::Search { query, limit, chapters }) => {
            search(&settings, &query, limit, chapters).await
        }
        Some(Commands::Thread { name }) => thread(&settings, &name).await,
    }
}

pub(crate) async fn open_engine(settings: &Settings) -> Result<StoryEngine> {
    StoryEngine::from_settings(settings)
        .await
        .context("Failed to start the story engine")
}

// Backups need no API key.
async fn store(settings: &Settings) -> Result<JsonStore> {
    Ok(JsonStore::open(settings.memory_dir(), settings.chapters_dir()).await?)
}

pub(crate) fn load_seed(settings: &Settings) -> Result<WorldSeed> {
    WorldSeed::load(&settings.config_dir).context("Failed to load the world seed")
}

async fn init(settings: &Settings, force: bool) -> Result<()> {
    let mut engine = open_engine(settings).await?;
    if engine.has_story() && !force {
        anyhow::bail!("A story already exists; pass --force to replace it");
    }
    let seed = load_seed(settings)?;
    let memory = engine.initialize_new_story(&seed).await?;
    menu::print_initialized(memory);
    Ok(())
}

async fn generate(settings: &Settings, count: u32) -> Result<()> {
    let mut engine = open_engine(settings).await?;
    for i in 0..count {
        let report = engine
            .generate_chapter()
            .await
            .with_context(|| format!("Chapter {} of {count} failed", i + 1))?;
        menu::print_report(&report);
    }
    Ok(())
}

async fn list_backups(settings: &Settings) -> Result<()> {
    let backups = store(settings).await?.list_backups().await?;
    if backups.is_empty() {
        println!("No backups yet");
    }
    for backup in backups {
        println!("{}", backup.name);
    }
    Ok(())
}

async fn search(settings: &Settings, query: &str, limit: usize, chapters: bool) -> Result<()> {
    let engine = open_engine(settings).await?;
    let hits = if chapters {
        engine.search_chapters(query, limit).await?
    } else {
        engine.search_events(query, limit).await?
    };
    if hits.is_empty() {
        println!("No matches");
    }
    for hit in hits {
        let chapter = hit.meta_u64("chapter_number").unwrap_or_default();
        println!("[{:.2}] ch {chapter}: {}", hit.relevance(), preview(&hit.document, 100));
    }
    Ok(())
}

async fn thread(settings: &Settings, name: &str) -> Result<()> {
    let engine = open_engine(settings).await?;
    let history = engine.thread_history(name)?;
    if history.is_empty() {
        println!("No developments recorded for '{name}'");
    }
    for entry in history {
        let title = entry
            .chapter
            .as_ref()
            .map(|c| format!(" ({})", c.title))
            .unwrap_or_default();
        println!("{}{title}: {}", entry.chapter_id, entry.description);
    }
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}
