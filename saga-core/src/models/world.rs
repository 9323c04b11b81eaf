//! Locations, factions and artifacts.

use serde::{Deserialize, Serialize};

/// A location in the story world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldLocation {
    pub location_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub geography: String,
    #[serde(default)]
    pub climate: String,
    #[serde(default)]
    pub culture: String,
    #[serde(default)]
    pub government: String,
    #[serde(default)]
    pub ruler: Option<String>,
    #[serde(default)]
    pub economy: String,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub history: String,
    #[serde(default)]
    pub myths: Vec<String>,

    /// active, destroyed, inaccessible, ...
    #[serde(default = "default_location_status")]
    pub status: String,
    /// Connected location ids.
    #[serde(default)]
    pub connected_to: Vec<String>,
    /// Faction ids present here.
    #[serde(default)]
    pub factions: Vec<String>,

    #[serde(default)]
    pub first_appearance: Option<String>,
    /// major, minor, background
    #[serde(default = "default_minor")]
    pub importance: String,
    #[serde(default)]
    pub notes: String,
}

fn default_location_status() -> String {
    "active".to_string()
}

fn default_minor() -> String {
    "minor".to_string()
}

impl WorldLocation {
    pub fn new(
        location_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            location_id: location_id.into(),
            name: name.into(),
            description: description.into(),
            geography: String::new(),
            climate: String::new(),
            culture: String::new(),
            government: String::new(),
            ruler: None,
            economy: String::new(),
            resources: Vec::new(),
            history: String::new(),
            myths: Vec::new(),
            status: default_location_status(),
            connected_to: Vec::new(),
            factions: Vec::new(),
            first_appearance: None,
            importance: default_minor(),
            notes: String::new(),
        }
    }

    pub fn first_seen_in(mut self, chapter_id: impl Into<String>) -> Self {
        self.first_appearance = Some(chapter_id.into());
        self
    }
}

/// An organization or group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faction {
    pub faction_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// protagonist, antagonist, neutral, ...
    #[serde(default)]
    pub alignment: String,

    /// Leader character id.
    #[serde(default)]
    pub leader: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub ideology: String,
    /// Location ids controlled.
    #[serde(default)]
    pub territory: Vec<String>,
    #[serde(default)]
    pub allies: Vec<String>,
    #[serde(default)]
    pub enemies: Vec<String>,

    #[serde(default = "default_location_status")]
    pub status: String,
    #[serde(default)]
    pub first_appearance: Option<String>,
    #[serde(default)]
    pub notes: String,
}

/// A significant item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub powers: Vec<String>,
    #[serde(default)]
    pub limitations: Vec<String>,
    #[serde(default)]
    pub origin: String,

    /// Owner character id.
    #[serde(default)]
    pub current_owner: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// possessed, lost, destroyed, unknown
    #[serde(default = "default_artifact_status")]
    pub status: String,

    #[serde(default)]
    pub first_mentioned: Option<String>,
    #[serde(default = "default_minor")]
    pub importance: String,
    #[serde(default)]
    pub notes: String,
}

fn default_artifact_status() -> String {
    "unknown".to_string()
}
