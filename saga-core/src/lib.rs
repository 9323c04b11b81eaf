//! Serialized story engine with LLM-driven planning and writing.
//!
//! This crate provides:
//! - A typed story memory (characters, arcs, plot threads, relationships, timeline)
//! - JSON persistence with timestamped backups and a small embedded vector index
//! - The chapter pipeline: plan, write, check, revise, update state, persist
//!
//! # Quick Start
//!
//! ```ignore
//! use saga_core::{config, StoryEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = config::Settings::from_env();
//!     let mut engine = StoryEngine::from_settings(&settings).await?;
//!
//!     if !engine.has_story() {
//!         let seed = config::WorldSeed::load(&settings.config_dir)?;
//!         engine.initialize_new_story(&seed).await?;
//!     }
//!
//!     let report = engine.generate_chapter().await?;
//!     println!("Wrote {} ({} words)", report.title, report.word_count);
//!     Ok(())
//! }
//! ```

pub mod checker;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod models;
pub mod names;
pub mod planner;
pub mod reviser;
pub mod testing;
pub mod updater;
pub mod writer;

// Primary public API
pub use checker::{ContinuityChecker, QualityChecker};
pub use config::{ConfigError, LlmConfig, PipelineConfig, Settings, StyleGuide, WorldSeed};
pub use engine::{ChapterReport, EngineError, StoryEngine, StoryStats};
pub use error::GenerationError;
pub use memory::{JsonStore, SmartRetriever, StoreError, VectorError, VectorStore};
pub use models::StoryMemory;
pub use planner::ChapterPlanner;
pub use reviser::ChapterReviser;
pub use testing::ScriptedLlm;
pub use updater::{StateUpdater, UpdateSummary};
pub use writer::ChapterWriter;
