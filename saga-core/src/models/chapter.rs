//! Chapter outlines and finished chapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::string_list;
use super::tracker::StateChanges;

/// Words a chapter aims for unless the style guide says otherwise.
pub const DEFAULT_WORD_COUNT: usize = 1500;

/// One scene in a chapter outline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub location: String,
    #[serde(default, deserialize_with = "string_list")]
    pub characters: Vec<String>,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub tone: String,
}

/// Structured plan for a chapter before it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterOutline {
    pub chapter_number: u32,
    pub arc_id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub key_events: Vec<String>,
    /// Character name -> development moment.
    #[serde(default)]
    pub character_moments: BTreeMap<String, String>,
    pub cliffhanger: String,
    /// revelation, danger, mystery, character_arrival, emotional_peak, twist
    pub cliffhanger_type: String,
    #[serde(default)]
    pub themes_present: Vec<String>,
    #[serde(default)]
    pub foreshadowing: Vec<String>,
    #[serde(default = "default_word_count")]
    pub expected_word_count: usize,
}

fn default_word_count() -> usize {
    DEFAULT_WORD_COUNT
}

impl ChapterOutline {
    /// Character names across all scenes, deduplicated in first-seen order.
    pub fn scene_characters(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for name in self.scenes.iter().flat_map(|s| s.characters.iter()) {
            if !seen.contains(name) {
                seen.push(name.clone());
            }
        }
        seen
    }

    /// Non-empty scene locations, deduplicated in first-seen order.
    pub fn scene_locations(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for location in self.scenes.iter().map(|s| &s.location) {
            if !location.is_empty() && !seen.contains(location) {
                seen.push(location.clone());
            }
        }
        seen
    }
}

/// A written chapter with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// `ch_NNN`
    pub chapter_id: String,
    pub chapter_number: u32,
    pub arc_id: String,

    pub title: String,
    pub content: String,
    pub word_count: usize,

    /// Brief summary kept in memory for later planning.
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_events: Vec<String>,
    #[serde(default)]
    pub characters_present: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,

    pub cliffhanger: String,
    pub cliffhanger_type: String,

    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default = "default_tone")]
    pub tone: String,

    #[serde(default)]
    pub outline: Option<ChapterOutline>,

    pub created_at: DateTime<Utc>,

    /// Changes to world and character state extracted from this chapter.
    #[serde(default)]
    pub state_changes: StateChanges,

    #[serde(default)]
    pub quality_score: Option<u8>,
    #[serde(default)]
    pub revision_count: u32,
}

fn default_tone() -> String {
    "balanced".to_string()
}

impl Chapter {
    /// Id for the given chapter number.
    pub fn id_for(chapter_number: u32) -> String {
        format!("ch_{chapter_number:03}")
    }

    /// Build a chapter from its outline and generated prose.
    pub fn from_outline(outline: &ChapterOutline, content: String) -> Self {
        let word_count = count_words(&content);
        Self {
            chapter_id: Self::id_for(outline.chapter_number),
            chapter_number: outline.chapter_number,
            arc_id: outline.arc_id.clone(),
            title: outline.title.clone(),
            content,
            word_count,
            summary: outline.summary.clone(),
            key_events: outline.key_events.clone(),
            characters_present: outline.scene_characters(),
            locations: outline.scene_locations(),
            cliffhanger: outline.cliffhanger.clone(),
            cliffhanger_type: outline.cliffhanger_type.clone(),
            themes: outline.themes_present.clone(),
            tone: default_tone(),
            outline: Some(outline.clone()),
            created_at: Utc::now(),
            state_changes: StateChanges::default(),
            quality_score: None,
            revision_count: 0,
        }
    }

    /// Replace the prose, keeping word count in sync.
    pub fn set_content(&mut self, content: String) {
        self.word_count = count_words(&content);
        self.content = content;
    }

    /// Scene locations from the outline this chapter came from.
    pub fn scene_locations(&self) -> Vec<String> {
        match &self.outline {
            Some(outline) => outline.scene_locations(),
            None => self.locations.clone(),
        }
    }

    /// Markdown document written to the chapters directory.
    pub fn to_markdown(&self) -> String {
        format!(
            "# Chapter {}: {}\n\n{}\n",
            self.chapter_number,
            self.title,
            self.content.trim_end()
        )
    }
}

/// Whitespace-delimited word count.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outline() -> ChapterOutline {
        ChapterOutline {
            chapter_number: 7,
            arc_id: "arc_001".to_string(),
            title: "Storm Front".to_string(),
            summary: "The crew braces.".to_string(),
            scenes: vec![
                Scene {
                    location: "Deck".to_string(),
                    characters: vec!["Kael".to_string(), "Mira".to_string()],
                    purpose: "setup".to_string(),
                    tone: "tense".to_string(),
                },
                Scene {
                    location: "Hold".to_string(),
                    characters: vec!["Mira".to_string(), "Old Tam".to_string()],
                    ..Default::default()
                },
                Scene {
                    location: "Deck".to_string(),
                    characters: vec!["Kael".to_string()],
                    ..Default::default()
                },
            ],
            key_events: vec!["The mast cracks".to_string()],
            character_moments: BTreeMap::new(),
            cliffhanger: "A shape in the clouds".to_string(),
            cliffhanger_type: "mystery".to_string(),
            themes_present: vec!["courage".to_string()],
            foreshadowing: Vec::new(),
            expected_word_count: DEFAULT_WORD_COUNT,
        }
    }

    #[test]
    fn test_chapter_from_outline() {
        let chapter = Chapter::from_outline(&outline(), "Wind howls over the deck.".to_string());
        assert_eq!(chapter.chapter_id, "ch_007");
        assert_eq!(chapter.word_count, 5);
        assert_eq!(chapter.characters_present, vec!["Kael", "Mira", "Old Tam"]);
        assert_eq!(chapter.locations, vec!["Deck", "Hold"]);
        assert_eq!(chapter.tone, "balanced");
        assert!(chapter.outline.is_some());
    }

    #[test]
    fn test_set_content_updates_word_count() {
        let mut chapter = Chapter::from_outline(&outline(), "one two".to_string());
        chapter.set_content("one two three four".to_string());
        assert_eq!(chapter.word_count, 4);
    }

    #[test]
    fn test_scene_accepts_comma_string() {
        let scene: Scene =
            serde_json::from_str(r#"{"location": "Dock", "characters": "Kael, Mira"}"#).unwrap();
        assert_eq!(scene.characters, vec!["Kael", "Mira"]);
        assert!(scene.purpose.is_empty());
    }

    #[test]
    fn test_markdown_has_heading() {
        let chapter = Chapter::from_outline(&outline(), "Text.\n\n".to_string());
        assert_eq!(chapter.to_markdown(), "# Chapter 7: Storm Front\n\nText.\n");
    }
}
