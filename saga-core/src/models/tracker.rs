//! Relationship, timeline and alias tracking, plus the state deltas
//! extracted from each chapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::string_list;

/// Types of relationships between characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipType {
    Ally,
    Friend,
    Rival,
    Enemy,
    Mentor,
    Family,
    Romantic,
    #[default]
    Neutral,
}

impl RelationshipType {
    /// Map a free-text label from model output onto a relationship type.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "ally" | "allies" | "allied" | "crewmate" | "crew" | "partner" => {
                RelationshipType::Ally
            }
            "friend" | "friends" | "friendship" | "companion" => RelationshipType::Friend,
            "rival" | "rivals" | "rivalry" | "competitor" => RelationshipType::Rival,
            "enemy" | "enemies" | "foe" | "nemesis" | "hostile" => RelationshipType::Enemy,
            "mentor" | "student" | "teacher" | "apprentice" | "mentorship" => {
                RelationshipType::Mentor
            }
            "family" | "sibling" | "siblings" | "parent" | "child" | "father" | "mother"
            | "brother" | "sister" => RelationshipType::Family,
            "romantic" | "romance" | "lover" | "lovers" | "love interest" => {
                RelationshipType::Romantic
            }
            _ => RelationshipType::Neutral,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RelationshipType::Ally => "ally",
            RelationshipType::Friend => "friend",
            RelationshipType::Rival => "rival",
            RelationshipType::Enemy => "enemy",
            RelationshipType::Mentor => "mentor",
            RelationshipType::Family => "family",
            RelationshipType::Romantic => "romantic",
            RelationshipType::Neutral => "neutral",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A relationship between two characters, stored once per unordered pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub character_a: String,
    pub character_b: String,
    pub relationship_type: RelationshipType,
    /// Depth of the relationship, 0 to 100.
    #[serde(default = "default_strength")]
    pub strength: u8,
    pub established_chapter: String,
    pub last_updated: String,
    #[serde(default)]
    pub notes: String,
}

fn default_strength() -> u8 {
    50
}

impl Relationship {
    /// Create a relationship with ids stored in sorted order.
    pub fn new(
        a: &str,
        b: &str,
        relationship_type: RelationshipType,
        chapter_id: &str,
    ) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self {
            character_a: first.to_string(),
            character_b: second.to_string(),
            relationship_type,
            strength: default_strength(),
            established_chapter: chapter_id.to_string(),
            last_updated: chapter_id.to_string(),
            notes: String::new(),
        }
    }

    /// Map key for a pair of character ids, independent of order.
    pub fn key(a: &str, b: &str) -> String {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        format!("rel_{first}_{second}")
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn involves(&self, character_id: &str) -> bool {
        self.character_a == character_id || self.character_b == character_id
    }
}

/// How much an event changes the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    #[default]
    Minor,
    Moderate,
    Major,
    Critical,
}

impl Impact {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "critical" | "catastrophic" | "world-changing" => Impact::Critical,
            "major" | "high" | "significant" => Impact::Major,
            "moderate" | "medium" => Impact::Moderate,
            _ => Impact::Minor,
        }
    }
}

/// A major event on the world timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEvent {
    /// `event_<chapter id>_<n>`
    pub event_id: String,
    pub chapter_id: String,
    pub chapter_number: u32,
    pub description: String,
    /// battle, discovery, death, alliance, betrayal, revelation, destruction
    pub event_type: String,
    /// Character ids.
    #[serde(default)]
    pub characters_involved: Vec<String>,
    /// Location names.
    #[serde(default)]
    pub locations_involved: Vec<String>,
    /// Faction ids.
    #[serde(default)]
    pub factions_involved: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub impact: Impact,
}

/// Alternative names seen for a character during deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterAlias {
    pub character_id: String,
    pub primary_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

// ============================================================================
// Extracted state changes
// ============================================================================

/// Structured deltas the state updater extracts from a chapter.
///
/// Every field is lenient: missing keys default to empty, and free-text
/// labels are kept as strings until they are mapped onto typed values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateChanges {
    #[serde(default)]
    pub new_characters: Vec<NewCharacter>,
    #[serde(default)]
    pub character_updates: Vec<CharacterUpdate>,
    #[serde(default)]
    pub location_updates: Vec<LocationUpdate>,
    #[serde(default)]
    pub thread_updates: Vec<ThreadUpdate>,
    #[serde(default)]
    pub relationships: Vec<RelationshipUpdate>,
    #[serde(default)]
    pub major_events: Vec<MajorEvent>,
}

impl StateChanges {
    pub fn is_empty(&self) -> bool {
        self.new_characters.is_empty()
            && self.character_updates.is_empty()
            && self.location_updates.is_empty()
            && self.thread_updates.is_empty()
            && self.relationships.is_empty()
            && self.major_events.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewCharacter {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub first_description: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CharacterUpdate {
    #[serde(default)]
    pub character_name: String,
    #[serde(default)]
    pub updates: CharacterUpdateFields,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CharacterUpdateFields {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub items_gained: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub items_lost: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LocationUpdate {
    #[serde(default)]
    pub location_name: String,
    #[serde(default)]
    pub change: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThreadUpdate {
    /// introduce, progress or resolve
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub thread_name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RelationshipUpdate {
    #[serde(default)]
    pub character_a: String,
    #[serde(default)]
    pub character_b: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MajorEvent {
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub impact: String,
    /// Character names as written in the chapter.
    #[serde(default, deserialize_with = "string_list")]
    pub characters: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub locations: Vec<String>,
}
