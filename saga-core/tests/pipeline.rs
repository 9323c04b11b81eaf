//! End-to-end tests of the chapter pipeline against scripted model output.
//!
//! Every test runs in its own temp directory with the hashing embedder, so no
//! network access or API key is needed.

use saga_core::config::{LlmConfig, Settings, StyleGuide};
use saga_core::models::{ArcPhase, CharacterStatus, ThreadStatus};
use saga_core::testing::{sample_seed, ScriptedLlm};
use saga_core::{EngineError, StoreError, StoryEngine};
use std::sync::Arc;
use tempfile::TempDir;

const OUTLINE: &str = r#"```json
{
  "title": "Sails Over Drift Port",
  "summary": "Kael and Mira steal a skiff and flee the harbor.",
  "scenes": [
    {"location": "Drift Port", "characters": ["Kael", "Mira"], "purpose": "the escape", "tone": "frantic"}
  ],
  "key_events": ["Kael steals a skiff", "Mira reads the storm"],
  "character_moments": {"Kael": "chooses the crew over the map"},
  "cliffhanger": "A Council warship rises from the clouds",
  "cliffhanger_type": "danger",
  "themes_present": ["freedom"],
  "foreshadowing": ["The compass spins near the Edge"]
}
```"#;

const PROSE: &str = "Kael ran along the dock. Mira shouted the wind's direction.\n\nThe skiff lurched free.";

const GOOD_REVIEW: &str = r#"{"overall_score": 86, "style_score": 84, "voice_consistency_score": 88, "pacing_score": 80, "has_cliffhanger": true, "strengths": ["Kinetic escape"], "suggestions": []}"#;

const STATE_CHANGES: &str = r#"{
  "new_characters": [{"name": "Captain Voss", "role": "villain", "personality": "cold", "first_description": "Commands the warship"}],
  "character_updates": [{"character_name": "Kael", "updates": {"status": "wounded", "items_gained": ["skiff key"]}}],
  "location_updates": [],
  "thread_updates": [{"action": "progress", "thread_name": "what lies at the edge?", "description": "The compass points outward"}],
  "relationships": [{"character_a": "Kael", "character_b": "Mira", "type": "friend", "description": "Escaped together"}],
  "major_events": [{"description": "Kael and Mira escape Drift Port", "type": "discovery", "impact": "moderate", "characters": ["Kael", "Mira"]}]
}"#;

fn settings(dir: &TempDir) -> Settings {
    Settings::default()
        .with_data_dir(dir.path().join("data"))
        .with_config_dir(dir.path().join("config"))
}

async fn engine(dir: &TempDir, llm: &Arc<ScriptedLlm>) -> StoryEngine {
    StoryEngine::with_client(&settings(dir), LlmConfig::default(), StyleGuide::default(), llm.clone())
        .await
        .expect("engine should open")
        .with_rng_seed(7)
}

#[tokio::test]
async fn test_initialize_and_reload() {
    let dir = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()));

    let mut first = engine(&dir, &llm).await;
    assert!(!first.has_story());
    first.initialize_new_story(&sample_seed()).await.unwrap();
    assert!(first.store().memory_path().exists());
    assert!(first.list_backups().await.unwrap().is_empty());

    let second = engine(&dir, &llm).await;
    let stats = second.stats().unwrap();
    assert_eq!(stats.characters, 3);
    assert_eq!(stats.open_threads, 2);
    assert_eq!(stats.chapters, 0);
    assert_eq!(stats.vectors.map(|v| v.threads), Some(2));
    assert!(llm.requests().is_empty());
}

#[tokio::test]
async fn test_generate_chapter_end_to_end() {
    let dir = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedLlm::new([OUTLINE, PROSE, GOOD_REVIEW, STATE_CHANGES]));
    let mut engine = engine(&dir, &llm).await;
    engine.initialize_new_story(&sample_seed()).await.unwrap();

    let report = engine.generate_chapter().await.unwrap();

    assert_eq!(report.chapter_id, "ch_001");
    assert_eq!(report.title, "Sails Over Drift Port");
    assert_eq!(report.revisions, 0);
    assert_eq!(report.quality_score, Some(86));
    assert_eq!(report.violations.blocking(), 0);
    assert_eq!(report.updates.characters_added, 1);
    assert_eq!(report.updates.threads_progressed, 1);
    assert_eq!(report.arc_phase, Some(ArcPhase::Discovery));
    assert_eq!(llm.remaining(), 0);

    let markdown = std::fs::read_to_string(&report.path).unwrap();
    assert!(markdown.starts_with("# Chapter 1: Sails Over Drift Port"));
    assert!(markdown.contains("The skiff lurched free."));

    let memory = engine.memory().unwrap();
    assert_eq!(memory.current_chapter_number, 1);
    assert_eq!(memory.chapters["ch_001"].quality_score, Some(86));
    assert_eq!(memory.characters["char_004"].name, "Captain Voss");
    assert_eq!(memory.characters["char_001"].status, CharacterStatus::Injured);
    assert_eq!(memory.plot_threads["thread_001"].status, ThreadStatus::Progressing);
    assert_eq!(memory.relationships.len(), 1);
    assert_eq!(memory.world_timeline[0].event_id, "event_ch_001_1");
    assert_eq!(memory.theme_counts["freedom"], 1);

    // Saving after the chapter backs up the initial state.
    assert_eq!(engine.list_backups().await.unwrap().len(), 1);

    let stats = engine.stats().unwrap();
    assert_eq!(stats.vectors.map(|v| v.chapters), Some(1));
    assert_eq!(stats.vectors.map(|v| v.events), Some(2));
    let hits = engine.search_events("skiff escape", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn test_low_quality_triggers_revision() {
    let dir = TempDir::new().unwrap();
    let weak = r#"{"overall_score": 55, "suggestions": ["Raise the stakes"], "needs_revision": true}"#;
    let revised = "Kael ran. The warship's shadow swallowed the dock.";
    let llm = Arc::new(ScriptedLlm::new([OUTLINE, PROSE, weak, revised, GOOD_REVIEW, "{}"]));
    let mut engine = engine(&dir, &llm).await;
    engine.initialize_new_story(&sample_seed()).await.unwrap();

    let report = engine.generate_chapter().await.unwrap();

    assert_eq!(report.revisions, 1);
    assert_eq!(report.quality_score, Some(86));
    let markdown = std::fs::read_to_string(&report.path).unwrap();
    assert!(markdown.contains("swallowed the dock"));

    let requests = llm.requests();
    assert_eq!(requests.len(), 6);
    assert!(requests[3].prompt.contains("Raise the stakes"));
    assert_eq!(engine.memory().unwrap().chapters["ch_001"].revision_count, 1);
}

#[tokio::test]
async fn test_revisions_are_capped() {
    let dir = TempDir::new().unwrap();
    let weak = r#"{"overall_score": 40}"#;
    let llm = Arc::new(ScriptedLlm::new([
        OUTLINE, PROSE, weak, "Try one.", weak, "Try two.", weak, "{}",
    ]));
    let mut engine = engine(&dir, &llm).await;
    engine.initialize_new_story(&sample_seed()).await.unwrap();

    let report = engine.generate_chapter().await.unwrap();

    assert_eq!(report.revisions, 2);
    assert_eq!(report.quality_score, Some(40));
    assert_eq!(llm.remaining(), 0);
}

#[tokio::test]
async fn test_outline_violation_costs_one_revision() {
    let dir = TempDir::new().unwrap();
    let outline = OUTLINE.replace(
        r#""Kael": "chooses the crew over the map""#,
        r#""Zephyr": "reveals a hidden chart""#,
    );
    let strong = r#"{"overall_score": 95, "has_cliffhanger": true}"#;
    let llm = Arc::new(ScriptedLlm::new([
        outline.as_str(),
        PROSE,
        strong,
        "Kael ran. A stranger called Zephyr unrolled a chart.",
        strong,
        "{}",
    ]));
    let mut engine = engine(&dir, &llm).await;
    engine.initialize_new_story(&sample_seed()).await.unwrap();

    let report = engine.generate_chapter().await.unwrap();

    assert_eq!(report.revisions, 1);
    assert_eq!(report.quality_score, Some(95));
    assert_eq!(report.violations.major, 1);
    assert_eq!(llm.requests().len(), 6);
    assert!(llm.requests()[3].prompt.contains("Zephyr"));
}

#[tokio::test]
async fn test_unparsable_outline_leaves_story_untouched() {
    let dir = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedLlm::new(["I would rather write a poem."]));
    let mut engine = engine(&dir, &llm).await;
    engine.initialize_new_story(&sample_seed()).await.unwrap();

    let err = engine.generate_chapter().await.unwrap_err();

    assert!(matches!(err, EngineError::Generation(_)));
    assert_eq!(engine.memory().unwrap().current_chapter_number, 0);
    assert!(!engine.store().chapter_path("ch_001").exists());
}

#[tokio::test]
async fn test_generate_without_story() {
    let dir = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedLlm::new([OUTLINE]));
    let mut engine = engine(&dir, &llm).await;

    assert!(matches!(engine.generate_chapter().await, Err(EngineError::NoStory)));
    assert!(matches!(engine.stats(), Err(EngineError::NoStory)));
    assert_eq!(llm.remaining(), 1);
}

#[tokio::test]
async fn test_restore_backup_rolls_back_chapter() {
    let dir = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedLlm::new([OUTLINE, PROSE, GOOD_REVIEW, STATE_CHANGES]));
    let mut engine = engine(&dir, &llm).await;
    engine.initialize_new_story(&sample_seed()).await.unwrap();
    engine.generate_chapter().await.unwrap();

    let backups = engine.list_backups().await.unwrap();
    engine.restore_backup(&backups[0].name).await.unwrap();
    assert_eq!(engine.memory().unwrap().current_chapter_number, 0);

    let err = engine.restore_backup("../story_memory.json").await.unwrap_err();
    assert!(matches!(err, EngineError::Store(StoreError::InvalidBackupName(_))));
}
