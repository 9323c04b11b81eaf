//! StoryEngine - the primary public API for generating a serialized story.
//!
//! The engine owns the story memory, the persistence layers and one instance
//! of every pipeline stage. Generating a chapter runs the stages strictly in
//! order: retrieve, plan, write, review and revise, save the text, update
//! memory, save memory.

use llm::LlmClient;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::checker::{ContinuityChecker, QualityChecker};
use crate::config::{
    create_client, create_embedder, ConfigError, LlmConfig, Settings, StyleGuide, WorldSeed,
};
use crate::error::GenerationError;
use crate::memory::{
    BackupInfo, JsonStore, SearchResult, SmartRetriever, StoreError, ThreadHistoryEntry,
    VectorError, VectorStats, VectorStore,
};
use crate::models::{
    Arc as StoryArc, ArcPhase, ArcStatus, Character, CharacterRole, ContinuityViolation,
    Importance, PlotThread, QualityReport, SeverityCounts, StoryMemory, WorldLocation,
};
use crate::planner::ChapterPlanner;
use crate::reviser::ChapterReviser;
use crate::updater::{StateUpdater, UpdateSummary};
use crate::writer::ChapterWriter;

/// Chapter id used for everything set up before the first chapter.
pub const PROLOGUE_CHAPTER_ID: &str = "ch_000";

const FIRST_ARC_CHAPTERS: u32 = 5;
const DEFAULT_THEMES: [&str; 2] = ["adventure", "friendship"];

/// Errors from StoryEngine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Vector store error: {0}")]
    Vector(#[from] VectorError),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("No story found - initialize one first")]
    NoStory,

    #[error("Vector store is disabled")]
    VectorStoreDisabled,
}

/// Outcome of generating one chapter.
#[derive(Debug, Clone)]
pub struct ChapterReport {
    pub chapter_id: String,
    pub chapter_number: u32,
    pub title: String,
    pub word_count: usize,
    /// Markdown file the chapter was written to.
    pub path: PathBuf,
    /// Final quality score, when quality checks are enabled.
    pub quality_score: Option<u8>,
    pub revisions: u32,
    /// Continuity violations found in the chapter's outline.
    pub violations: SeverityCounts,
    pub updates: UpdateSummary,
    /// Phase of the current arc after this chapter.
    pub arc_phase: Option<ArcPhase>,
}

/// Summary numbers for a story.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryStats {
    pub story_title: String,
    pub world_name: String,
    pub chapters: usize,
    pub total_words: usize,
    pub characters: usize,
    pub active_characters: usize,
    pub arcs: usize,
    pub current_arc: Option<String>,
    pub current_phase: Option<ArcPhase>,
    pub open_threads: usize,
    pub resolved_threads: usize,
    pub relationships: usize,
    pub timeline_events: usize,
    pub theme_counts: BTreeMap<String, u32>,
    /// Indexed record counts, when the vector store is enabled.
    pub vectors: Option<VectorStats>,
}

impl fmt::Display for StoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Title: {}", self.story_title)?;
        writeln!(f, "World: {}", self.world_name)?;
        writeln!(f, "Chapters written: {} ({} words)", self.chapters, self.total_words)?;
        writeln!(f, "Characters: {}", self.characters)?;
        writeln!(f, "  - Active: {}", self.active_characters)?;
        write!(f, "Arcs: {}", self.arcs)?;
        match (&self.current_arc, self.current_phase) {
            (Some(arc), Some(phase)) => writeln!(f, " (current: {arc}, {phase})")?,
            _ => writeln!(f)?,
        }
        writeln!(f, "Plot threads:")?;
        writeln!(f, "  - Open: {}", self.open_threads)?;
        writeln!(f, "  - Resolved: {}", self.resolved_threads)?;
        writeln!(f, "Relationships: {}", self.relationships)?;
        writeln!(f, "Timeline events: {}", self.timeline_events)?;
        let themes: Vec<String> = self
            .theme_counts
            .iter()
            .map(|(theme, count)| format!("{theme}: {count}"))
            .collect();
        write!(f, "Themes used: {}", if themes.is_empty() { "none".to_string() } else { themes.join(", ") })?;
        if let Some(v) = &self.vectors {
            write!(
                f,
                "\nVector index: {} chapters, {} events, {} threads",
                v.chapters, v.events, v.threads
            )?;
        }
        Ok(())
    }
}

/// A serialized story and the pipeline that extends it.
pub struct StoryEngine {
    config: LlmConfig,
    store: JsonStore,
    vectors: Option<VectorStore>,
    memory: Option<StoryMemory>,
    rng: StdRng,

    planner: ChapterPlanner,
    writer: ChapterWriter,
    continuity: ContinuityChecker,
    quality: QualityChecker,
    reviser: ChapterReviser,
    updater: StateUpdater,
}

impl StoryEngine {
    /// Build an engine from the config directory and environment.
    ///
    /// Missing `llm_config.yaml` or `style_guide.yaml` fall back to defaults.
    pub async fn from_settings(settings: &Settings) -> Result<Self, EngineError> {
        let config = or_default(LlmConfig::load(&settings.config_dir))?;
        let style = or_default(StyleGuide::load(&settings.config_dir))?;
        let client = create_client(settings, &config)?;
        Self::with_client(settings, config, style, client).await
    }

    /// Build an engine around an existing client.
    ///
    /// Loads the saved story, if any. A vector index that cannot be opened
    /// disables semantic retrieval instead of failing.
    pub async fn with_client(
        settings: &Settings,
        config: LlmConfig,
        style: StyleGuide,
        client: Arc<dyn LlmClient>,
    ) -> Result<Self, EngineError> {
        let store = JsonStore::open(settings.memory_dir(), settings.chapters_dir()).await?;

        let vectors = if config.pipeline.enable_vector_store {
            let embedder = create_embedder(settings, &config.embeddings);
            match VectorStore::open(store.memory_dir(), embedder).await {
                Ok(vectors) => Some(vectors),
                Err(e) => {
                    warn!(error = %e, "Could not open vector store, continuing without it");
                    None
                }
            }
        } else {
            None
        };

        let memory = store.load().await?;
        if let Some(m) = &memory {
            info!(title = %m.story_title, chapters = m.chapters.len(), "Loaded story");
        }

        Ok(Self {
            planner: ChapterPlanner::new(client.clone(), style.clone()),
            writer: ChapterWriter::new(client.clone(), style.clone()),
            continuity: ContinuityChecker::new(),
            quality: QualityChecker::new(client.clone(), style.clone())
                .with_threshold(config.pipeline.quality_threshold),
            reviser: ChapterReviser::new(client.clone(), style),
            updater: StateUpdater::new(client),
            config,
            store,
            vectors,
            memory,
            rng: StdRng::from_entropy(),
        })
    }

    /// Make surprise callbacks reproducible.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn has_story(&self) -> bool {
        self.memory.is_some()
    }

    pub fn memory(&self) -> Option<&StoryMemory> {
        self.memory.as_ref()
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn store(&self) -> &JsonStore {
        &self.store
    }

    // ========================================================================
    // Story lifecycle
    // ========================================================================

    /// Start a new story from a world seed, replacing any existing one.
    ///
    /// A replaced story is backed up first and the vector index is cleared.
    pub async fn initialize_new_story(&mut self, seed: &WorldSeed) -> Result<&StoryMemory, EngineError> {
        let replacing = self.memory.is_some();
        let mut memory = story_from_seed(seed);
        info!(
            title = %memory.story_title,
            characters = memory.characters.len(),
            threads = memory.plot_threads.len(),
            "Initializing new story"
        );

        self.store.save(&mut memory, replacing).await?;

        if let Some(vectors) = self.vectors.as_mut() {
            if let Err(e) = vectors.reset().await {
                warn!(error = %e, "Failed to clear vector index");
            }
            for thread in memory.plot_threads.values() {
                if let Err(e) = vectors.add_thread(thread).await {
                    warn!(error = %e, thread = %thread.thread_id, "Failed to index thread");
                }
            }
        }

        let memory: &StoryMemory = self.memory.insert(memory);
        Ok(memory)
    }

    /// Generate, review, persist and remember the next chapter.
    pub async fn generate_chapter(&mut self) -> Result<ChapterReport, EngineError> {
        let memory = self.memory.as_mut().ok_or(EngineError::NoStory)?;
        let pipeline = &self.config.pipeline;
        info!(chapter = memory.next_chapter_number(), "Generating chapter");

        // Retrieve
        let context = SmartRetriever::new(self.vectors.as_ref())
            .with_limits(pipeline.retrieval)
            .retrieve_for_planning(memory, memory.current_arc_id.as_deref(), &mut self.rng)
            .await;

        // Plan and write
        let outline = self.planner.plan_chapter(memory, Some(&context)).await?;
        let mut chapter = self.writer.write_chapter(&outline, memory).await?;

        // Review and revise. Continuity rules read the outline, which revising
        // never changes, so they feed the first revision only.
        let violations = self.continuity.check_chapter(&chapter, memory);
        let mut report = if pipeline.enable_quality_checks {
            Some(self.quality.check_chapter(&chapter, memory).await?)
        } else {
            None
        };

        let mut pending: &[ContinuityViolation] = &violations;
        while chapter.revision_count < pipeline.max_revisions && needs_revision(pending, report.as_ref()) {
            let attempt = chapter.revision_count + 1;
            let basis = report.clone().unwrap_or_else(unassessed);
            let revision = self
                .reviser
                .revise_chapter(&chapter, pending, &basis, attempt)
                .await?;
            chapter.set_content(revision.revised_text);
            chapter.revision_count = attempt;
            pending = &[];

            if pipeline.enable_quality_checks {
                let revised = self.quality.check_chapter(&chapter, memory).await?;
                info!(
                    attempt,
                    before = basis.overall_score,
                    after = revised.overall_score,
                    "Revision assessed"
                );
                report = Some(revised);
            }
        }
        chapter.quality_score = report.as_ref().map(|r| r.overall_score);

        // Persist text, then memory
        let path = self
            .store
            .save_chapter_text(&chapter.chapter_id, &chapter.to_markdown())
            .await?;

        let mut chapter_report = ChapterReport {
            chapter_id: chapter.chapter_id.clone(),
            chapter_number: chapter.chapter_number,
            title: chapter.title.clone(),
            word_count: chapter.word_count,
            path,
            quality_score: chapter.quality_score,
            revisions: chapter.revision_count,
            violations: SeverityCounts::from_violations(&violations),
            updates: UpdateSummary::default(),
            arc_phase: None,
        };

        chapter_report.updates = self
            .updater
            .update_from_chapter(chapter, memory, self.vectors.as_mut())
            .await?;
        chapter_report.arc_phase = memory.current_arc().map(|arc| arc.current_phase);

        self.store.save(memory, true).await?;
        info!(
            chapter = chapter_report.chapter_number,
            title = %chapter_report.title,
            words = chapter_report.word_count,
            revisions = chapter_report.revisions,
            "Chapter complete"
        );
        Ok(chapter_report)
    }

    pub fn stats(&self) -> Result<StoryStats, EngineError> {
        let memory = self.memory.as_ref().ok_or(EngineError::NoStory)?;
        let current_arc = memory.current_arc();
        Ok(StoryStats {
            story_title: memory.story_title.clone(),
            world_name: memory.world_name.clone(),
            chapters: memory.chapters.len(),
            total_words: memory.chapters.values().map(|c| c.word_count).sum(),
            characters: memory.characters.len(),
            active_characters: memory.active_characters().len(),
            arcs: memory.arcs.len(),
            current_arc: current_arc.map(|arc| arc.name.clone()),
            current_phase: current_arc.map(|arc| arc.current_phase),
            open_threads: memory.open_threads().len(),
            resolved_threads: memory.resolved_thread_count(),
            relationships: memory.relationships.len(),
            timeline_events: memory.world_timeline.len(),
            theme_counts: memory.theme_counts.clone(),
            vectors: self.vectors.as_ref().map(VectorStore::stats),
        })
    }

    // ========================================================================
    // Backups and search
    // ========================================================================

    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>, EngineError> {
        Ok(self.store.list_backups().await?)
    }

    /// Replace the current story with a backup and reload it.
    pub async fn restore_backup(&mut self, name: &str) -> Result<(), EngineError> {
        self.store.restore_backup(name).await?;
        self.memory = self.store.load().await?;
        info!(backup = name, "Restored story from backup");
        Ok(())
    }

    /// Past events resembling `query`, most similar first.
    pub async fn search_events(&self, query: &str, n: usize) -> Result<Vec<SearchResult>, EngineError> {
        let vectors = self.vectors.as_ref().ok_or(EngineError::VectorStoreDisabled)?;
        Ok(SmartRetriever::new(Some(vectors)).find_similar_situations(query, n).await?)
    }

    /// Past chapters resembling `query`, most similar first.
    pub async fn search_chapters(&self, query: &str, n: usize) -> Result<Vec<SearchResult>, EngineError> {
        let vectors = self.vectors.as_ref().ok_or(EngineError::VectorStoreDisabled)?;
        Ok(vectors.search_chapters(query, n, None).await?)
    }

    /// Developments of the thread named `name`.
    pub fn thread_history(&self, name: &str) -> Result<Vec<ThreadHistoryEntry>, EngineError> {
        let memory = self.memory.as_ref().ok_or(EngineError::NoStory)?;
        Ok(SmartRetriever::new(self.vectors.as_ref()).get_thread_history(memory, name))
    }
}

fn or_default<T: Default>(loaded: Result<T, ConfigError>) -> Result<T, ConfigError> {
    match loaded {
        Err(ConfigError::NotFound(path)) => {
            warn!(path = %path.display(), "Config file not found, using defaults");
            Ok(T::default())
        }
        other => other,
    }
}

fn needs_revision(violations: &[ContinuityViolation], report: Option<&QualityReport>) -> bool {
    violations.iter().any(|v| v.severity.needs_fix()) || report.is_some_and(|r| r.needs_revision)
}

/// Stand-in report when quality checks are disabled.
fn unassessed() -> QualityReport {
    QualityReport {
        strengths: Vec::new(),
        suggestions: Vec::new(),
        needs_revision: false,
        ..QualityReport::fallback()
    }
}

/// Initial story state for a world seed.
pub fn story_from_seed(seed: &WorldSeed) -> StoryMemory {
    let start = &seed.starting_location;
    let mut memory = StoryMemory::new(
        format!("Chronicles of {}", seed.world_name),
        &seed.world_name,
        &seed.central_conflict,
    );

    let hero = &seed.protagonist;
    let mut protagonist = Character::new("char_001", &hero.name, &hero.personality)
        .with_role(CharacterRole::Protagonist)
        .with_background(&hero.background)
        .with_location(&start.name);
    protagonist.age = hero.age;
    protagonist.dream = hero.dream.clone();
    protagonist.quirks = hero.quirks.clone();
    protagonist.abilities = hero.abilities.clone();
    protagonist.speech_pattern = hero.speech_pattern.clone();
    memory.characters.insert(protagonist.character_id.clone(), protagonist);

    for (i, member) in seed.initial_crew.iter().enumerate() {
        let id = format!("char_{:03}", i + 2);
        let role = member
            .role
            .as_deref()
            .map(CharacterRole::from_label)
            .unwrap_or(CharacterRole::Ally);
        let character = Character::new(&id, &member.name, &member.personality)
            .with_role(role)
            .with_background(&member.background)
            .with_location(&start.name);
        memory.characters.insert(id, character);
    }

    for (i, seeded) in seed.initial_threads.iter().enumerate() {
        let id = format!("thread_{:03}", i + 1);
        let thread = PlotThread::new(&id, &seeded.thread, &seeded.thread_type, PROLOGUE_CHAPTER_ID, &seeded.thread)
            .with_importance(Importance::Major);
        memory.plot_threads.insert(id, thread);
    }

    let mut location = WorldLocation::new("loc_001", &start.name, &start.description)
        .first_seen_in(PROLOGUE_CHAPTER_ID);
    location.importance = "major".to_string();
    memory.locations.insert(location.location_id.clone(), location);

    let mut arc = StoryArc::new(
        "arc_001",
        1,
        "Arrival",
        "exploration",
        &start.name,
        &seed.central_conflict,
    );
    arc.status = ArcStatus::Active;
    arc.expected_chapters = FIRST_ARC_CHAPTERS;
    arc.summary = format!("The adventure begins at {}", start.name);
    arc.environment_description = start.description.clone();
    arc.themes = if seed.themes.is_empty() {
        DEFAULT_THEMES.iter().map(|t| t.to_string()).collect()
    } else {
        seed.themes.clone()
    };
    arc.main_characters = memory.characters.keys().cloned().collect();
    memory.arc_type_history.push(arc.arc_type.clone());
    memory.current_arc_id = Some(arc.arc_id.clone());
    memory.arcs.insert(arc.arc_id.clone(), arc);

    memory
}
