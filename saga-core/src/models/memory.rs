//! The aggregate story state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::arc::Arc;
use super::chapter::Chapter;
use super::character::Character;
use super::thread::{Importance, PlotThread, ThreadStatus};
use super::tracker::{CharacterAlias, Relationship, WorldEvent};
use super::world::{Artifact, Faction, WorldLocation};
use crate::names::{normalize_character_name, normalize_location_name, normalize_thread_name};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete story state and memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryMemory {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    pub story_title: String,
    pub world_name: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,

    #[serde(default)]
    pub current_chapter_number: u32,
    #[serde(default)]
    pub current_arc_id: Option<String>,

    #[serde(default)]
    pub characters: BTreeMap<String, Character>,
    #[serde(default)]
    pub locations: BTreeMap<String, WorldLocation>,
    #[serde(default)]
    pub factions: BTreeMap<String, Faction>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, Artifact>,

    #[serde(default)]
    pub arcs: BTreeMap<String, Arc>,
    #[serde(default)]
    pub chapters: BTreeMap<String, Chapter>,
    #[serde(default)]
    pub plot_threads: BTreeMap<String, PlotThread>,

    /// Keyed `rel_<id a>_<id b>` with ids sorted.
    #[serde(default)]
    pub relationships: BTreeMap<String, Relationship>,
    #[serde(default)]
    pub world_timeline: Vec<WorldEvent>,
    /// Character id -> known alternative names.
    #[serde(default)]
    pub character_aliases: BTreeMap<String, CharacterAlias>,

    /// Ultimate destination of the story.
    #[serde(default)]
    pub saga_goal: String,
    #[serde(default)]
    pub saga_milestones: Vec<String>,

    /// Arc types used so far, oldest first.
    #[serde(default)]
    pub arc_type_history: Vec<String>,
    /// Theme -> number of chapters featuring it.
    #[serde(default)]
    pub theme_counts: BTreeMap<String, u32>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl StoryMemory {
    /// Create an empty story.
    pub fn new(
        story_title: impl Into<String>,
        world_name: impl Into<String>,
        saga_goal: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION,
            story_title: story_title.into(),
            world_name: world_name.into(),
            created_at: now,
            last_updated: now,
            current_chapter_number: 0,
            current_arc_id: None,
            characters: BTreeMap::new(),
            locations: BTreeMap::new(),
            factions: BTreeMap::new(),
            artifacts: BTreeMap::new(),
            arcs: BTreeMap::new(),
            chapters: BTreeMap::new(),
            plot_threads: BTreeMap::new(),
            relationships: BTreeMap::new(),
            world_timeline: Vec::new(),
            character_aliases: BTreeMap::new(),
            saga_goal: saga_goal.into(),
            saga_milestones: Vec::new(),
            arc_type_history: Vec::new(),
            theme_counts: BTreeMap::new(),
        }
    }

    // ========================================================================
    // Arcs and chapters
    // ========================================================================

    pub fn current_arc(&self) -> Option<&Arc> {
        self.current_arc_id.as_ref().and_then(|id| self.arcs.get(id))
    }

    pub fn current_arc_mut(&mut self) -> Option<&mut Arc> {
        match &self.current_arc_id {
            Some(id) => self.arcs.get_mut(id),
            None => None,
        }
    }

    /// The `n` most recent chapters, newest first.
    pub fn recent_chapters(&self, n: usize) -> Vec<&Chapter> {
        let mut chapters: Vec<&Chapter> = self.chapters.values().collect();
        chapters.sort_by(|a, b| b.chapter_number.cmp(&a.chapter_number));
        chapters.truncate(n);
        chapters
    }

    pub fn latest_chapter(&self) -> Option<&Chapter> {
        self.chapters.values().max_by_key(|c| c.chapter_number)
    }

    pub fn next_chapter_number(&self) -> u32 {
        self.current_chapter_number + 1
    }

    // ========================================================================
    // Threads
    // ========================================================================

    /// Open and progressing threads.
    pub fn open_threads(&self) -> Vec<&PlotThread> {
        self.plot_threads
            .values()
            .filter(|t| t.status.is_active())
            .collect()
    }

    pub fn major_open_threads(&self) -> Vec<&PlotThread> {
        self.open_threads()
            .into_iter()
            .filter(|t| t.importance == Importance::Major)
            .collect()
    }

    pub fn resolved_thread_count(&self) -> usize {
        self.plot_threads
            .values()
            .filter(|t| t.status == ThreadStatus::Resolved)
            .count()
    }

    /// Find a thread by normalized name.
    pub fn find_thread_id(&self, name: &str) -> Option<String> {
        let key = normalize_thread_name(name);
        if key.is_empty() {
            return None;
        }
        self.plot_threads
            .values()
            .find(|t| normalize_thread_name(&t.name) == key)
            .map(|t| t.thread_id.clone())
    }

    // ========================================================================
    // Characters
    // ========================================================================

    pub fn active_characters(&self) -> Vec<&Character> {
        self.characters.values().filter(|c| c.is_active()).collect()
    }

    /// Find a character by normalized name or recorded alias.
    pub fn find_character_id(&self, name: &str) -> Option<String> {
        let key = normalize_character_name(name);
        if key.is_empty() {
            return None;
        }
        if let Some(c) = self
            .characters
            .values()
            .find(|c| normalize_character_name(&c.name) == key)
        {
            return Some(c.character_id.clone());
        }
        self.character_aliases
            .values()
            .find(|a| a.aliases.iter().any(|alias| normalize_character_name(alias) == key))
            .map(|a| a.character_id.clone())
    }

    pub fn find_character(&self, name: &str) -> Option<&Character> {
        self.find_character_id(name)
            .and_then(|id| self.characters.get(&id))
    }

    /// Remember `alias` as another name for a character.
    ///
    /// Ignored when it normalizes to the primary name or is already known.
    pub fn record_alias(&mut self, character_id: &str, alias: &str) {
        let Some(character) = self.characters.get(character_id) else {
            return;
        };
        let key = normalize_character_name(alias);
        if key.is_empty() || key == normalize_character_name(&character.name) {
            return;
        }
        let primary_name = character.name.clone();
        let entry = self
            .character_aliases
            .entry(character_id.to_string())
            .or_insert_with(|| CharacterAlias {
                character_id: character_id.to_string(),
                primary_name,
                aliases: Vec::new(),
            });
        if !entry
            .aliases
            .iter()
            .any(|a| normalize_character_name(a) == key)
        {
            entry.aliases.push(alias.trim().to_string());
        }
    }

    // ========================================================================
    // Locations
    // ========================================================================

    pub fn find_location_id(&self, name: &str) -> Option<String> {
        let key = normalize_location_name(name);
        if key.is_empty() {
            return None;
        }
        self.locations
            .values()
            .find(|l| normalize_location_name(&l.name) == key)
            .map(|l| l.location_id.clone())
    }

    /// Whether a location name was registered or used in any earlier chapter.
    pub fn knows_location(&self, name: &str) -> bool {
        let key = normalize_location_name(name);
        self.find_location_id(name).is_some()
            || self.chapters.values().any(|c| {
                c.scene_locations()
                    .iter()
                    .any(|l| normalize_location_name(l) == key)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chapter, ChapterOutline, CharacterStatus};

    fn memory() -> StoryMemory {
        let mut m = StoryMemory::new("Chronicles of Aether", "Aether", "Reach the Edge");
        m.characters.insert(
            "char_001".to_string(),
            Character::new("char_001", "Kael", "reckless"),
        );
        let mut hurt = Character::new("char_002", "The Navigator", "calm");
        hurt.status = CharacterStatus::Injured;
        m.characters.insert("char_002".to_string(), hurt);
        m
    }

    fn chapter(n: u32, location: &str) -> Chapter {
        let outline = ChapterOutline {
            chapter_number: n,
            arc_id: "arc_001".to_string(),
            title: format!("Chapter {n}"),
            summary: String::new(),
            scenes: vec![crate::models::Scene {
                location: location.to_string(),
                ..Default::default()
            }],
            key_events: Vec::new(),
            character_moments: BTreeMap::new(),
            cliffhanger: String::new(),
            cliffhanger_type: "mystery".to_string(),
            themes_present: Vec::new(),
            foreshadowing: Vec::new(),
            expected_word_count: 1500,
        };
        Chapter::from_outline(&outline, "text".to_string())
    }

    #[test]
    fn test_find_character_normalized() {
        let m = memory();
        assert_eq!(m.find_character_id("navigator").as_deref(), Some("char_002"));
        assert_eq!(m.find_character_id("  KAEL ").as_deref(), Some("char_001"));
        assert!(m.find_character_id("Zephyr").is_none());
        assert!(m.find_character_id("").is_none());
    }

    #[test]
    fn test_aliases_resolve() {
        let mut m = memory();
        m.record_alias("char_001", "The Sky Kid");
        m.record_alias("char_001", "sky kid");
        m.record_alias("char_001", "Kael");
        assert_eq!(m.character_aliases["char_001"].aliases, vec!["The Sky Kid"]);
        assert_eq!(m.find_character_id("Sky Kid").as_deref(), Some("char_001"));
    }

    #[test]
    fn test_active_characters() {
        let m = memory();
        assert_eq!(m.active_characters().len(), 1);
    }

    #[test]
    fn test_recent_chapters_newest_first() {
        let mut m = memory();
        for n in 1..=4 {
            let ch = chapter(n, "Port");
            m.chapters.insert(ch.chapter_id.clone(), ch);
        }
        let recent: Vec<u32> = m.recent_chapters(3).iter().map(|c| c.chapter_number).collect();
        assert_eq!(recent, vec![4, 3, 2]);
        assert_eq!(m.latest_chapter().map(|c| c.chapter_number), Some(4));
    }

    #[test]
    fn test_knows_location_from_chapters() {
        let mut m = memory();
        let ch = chapter(1, "The Sunken Market");
        m.chapters.insert(ch.chapter_id.clone(), ch);
        assert!(m.knows_location("sunken market"));
        assert!(!m.knows_location("Sky Fortress"));
    }

    #[test]
    fn test_thread_queries() {
        let mut m = memory();
        m.plot_threads.insert(
            "thread_001".to_string(),
            PlotThread::new("thread_001", "The Wind Walker prophecy", "prophecy", "ch_000", "")
                .with_importance(Importance::Major),
        );
        let mut done = PlotThread::new("thread_002", "Lost cargo", "quest", "ch_000", "");
        done.resolve("ch_002", "found");
        m.plot_threads.insert("thread_002".to_string(), done);

        assert_eq!(m.open_threads().len(), 1);
        assert_eq!(m.major_open_threads().len(), 1);
        assert_eq!(m.resolved_thread_count(), 1);
        assert_eq!(
            m.find_thread_id("wind walker Prophecy").as_deref(),
            Some("thread_001")
        );
    }
}
