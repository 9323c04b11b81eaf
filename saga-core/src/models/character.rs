//! Character profiles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::string_list;

/// Where a character stands in the story right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterStatus {
    #[default]
    Active,
    Injured,
    Captured,
    Missing,
    Dead,
    Unknown,
}

const DEATH_WORDS: &[&str] = &["dead", "deceased", "killed", "died", "slain", "perished"];
const DEATH_PHRASES: &[&str] = &[" no longer alive ", " not alive "];
const RECOVERY_WORDS: &[&str] = &["rescued", "freed", "released", "escaped", "recovered", "healed"];
const RECOVERY_PHRASES: &[&str] = &[" no longer "];
const INJURY_PHRASES: &[&str] = &[" lost consciousness ", " knocked out "];

// Injured is tried before Missing so "injured, lost an arm" stays an injury.
const STATUS_WORDS: &[(CharacterStatus, &[&str])] = &[
    (
        CharacterStatus::Captured,
        &["captured", "captive", "imprisoned", "kidnapped", "detained", "jailed"],
    ),
    (
        CharacterStatus::Injured,
        &["injured", "wounded", "hurt", "unconscious", "poisoned", "weakened"],
    ),
    (
        CharacterStatus::Missing,
        &["missing", "lost", "disappeared", "vanished"],
    ),
    (
        CharacterStatus::Active,
        &["active", "alive", "healthy", "free", "fine", "unhurt"],
    ),
    (CharacterStatus::Dead, DEATH_WORDS),
];

impl CharacterStatus {
    /// Map a free-text label from model output onto a status.
    ///
    /// Labels are matched on whole words. Recovery wording ("rescued after
    /// being captured", "no longer captive") wins over the state it ends,
    /// and death wins over everything else.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        let words: Vec<&str> = label
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let phrase = format!(" {} ", words.join(" "));
        let has_word = |candidates: &[&str]| words.iter().any(|w| candidates.iter().any(|c| c == w));

        if let Some((status, _)) = STATUS_WORDS.iter().find(|(_, ws)| ws.iter().any(|w| *w == label)) {
            return *status;
        }
        if DEATH_PHRASES.iter().any(|p| phrase.contains(p)) || has_word(DEATH_WORDS) {
            return CharacterStatus::Dead;
        }
        if RECOVERY_PHRASES.iter().any(|p| phrase.contains(p)) || has_word(RECOVERY_WORDS) {
            return CharacterStatus::Active;
        }
        if INJURY_PHRASES.iter().any(|p| phrase.contains(p)) {
            return CharacterStatus::Injured;
        }

        STATUS_WORDS
            .iter()
            .find(|(_, ws)| has_word(*ws))
            .map(|(status, _)| *status)
            .unwrap_or(CharacterStatus::Unknown)
    }

    pub fn name(&self) -> &'static str {
        match self {
            CharacterStatus::Active => "active",
            CharacterStatus::Injured => "injured",
            CharacterStatus::Captured => "captured",
            CharacterStatus::Missing => "missing",
            CharacterStatus::Dead => "dead",
            CharacterStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CharacterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Narrative function of a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterRole {
    Protagonist,
    Antagonist,
    Ally,
    Mentor,
    #[default]
    Supporting,
    Neutral,
}

impl CharacterRole {
    /// Map a free-text label from model output onto a role.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        match label.as_str() {
            "protagonist" | "hero" | "heroine" | "main character" | "lead" => {
                CharacterRole::Protagonist
            }
            "antagonist" | "villain" | "enemy" | "rival" | "nemesis" => CharacterRole::Antagonist,
            "ally" | "friend" | "companion" | "crew" | "crewmate" | "crew member" => {
                CharacterRole::Ally
            }
            "mentor" | "teacher" | "guide" | "master" => CharacterRole::Mentor,
            "supporting" | "support" | "side character" => CharacterRole::Supporting,
            _ => CharacterRole::Neutral,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CharacterRole::Protagonist => "protagonist",
            CharacterRole::Antagonist => "antagonist",
            CharacterRole::Ally => "ally",
            CharacterRole::Mentor => "mentor",
            CharacterRole::Supporting => "supporting",
            CharacterRole::Neutral => "neutral",
        }
    }
}

impl fmt::Display for CharacterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Complete character profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub character_id: String,
    pub name: String,

    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub appearance: String,

    /// Core personality traits.
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub speech_pattern: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub quirks: Vec<String>,

    #[serde(default)]
    pub dream: Option<String>,
    #[serde(default)]
    pub ambitions: Vec<String>,
    #[serde(default)]
    pub fears: Vec<String>,

    #[serde(default)]
    pub background: String,
    #[serde(default, deserialize_with = "string_list")]
    pub abilities: Vec<String>,

    /// Other character id -> relationship description.
    #[serde(default)]
    pub relationships: BTreeMap<String, String>,

    #[serde(default)]
    pub status: CharacterStatus,
    #[serde(default)]
    pub current_location: Option<String>,
    #[serde(default)]
    pub items: Vec<String>,

    /// Chapter id of the first appearance.
    #[serde(default)]
    pub first_appearance: Option<String>,
    /// Chapter id of the latest appearance.
    #[serde(default)]
    pub last_appearance: Option<String>,

    #[serde(default)]
    pub role: CharacterRole,
    #[serde(default)]
    pub faction: Option<String>,
    #[serde(default)]
    pub notes: String,
}

impl Character {
    /// Create an active character with the given id, name and personality.
    pub fn new(
        character_id: impl Into<String>,
        name: impl Into<String>,
        personality: impl Into<String>,
    ) -> Self {
        Self {
            character_id: character_id.into(),
            name: name.into(),
            age: None,
            appearance: String::new(),
            personality: personality.into(),
            speech_pattern: None,
            quirks: Vec::new(),
            dream: None,
            ambitions: Vec::new(),
            fears: Vec::new(),
            background: String::new(),
            abilities: Vec::new(),
            relationships: BTreeMap::new(),
            status: CharacterStatus::Active,
            current_location: None,
            items: Vec::new(),
            first_appearance: None,
            last_appearance: None,
            role: CharacterRole::default(),
            faction: None,
            notes: String::new(),
        }
    }

    pub fn with_role(mut self, role: CharacterRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = background.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.current_location = Some(location.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == CharacterStatus::Active
    }

    /// Add an item unless already held. Returns true if it was added.
    pub fn gain_item(&mut self, item: &str) -> bool {
        if self.items.iter().any(|i| i == item) {
            return false;
        }
        self.items.push(item.to_string());
        true
    }

    /// Remove an item if held. Returns true if it was removed.
    pub fn lose_item(&mut self, item: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i != item);
        self.items.len() != before
    }

    /// Record an appearance in the given chapter.
    pub fn mark_appearance(&mut self, chapter_id: &str) {
        if self.first_appearance.is_none() {
            self.first_appearance = Some(chapter_id.to_string());
        }
        self.last_appearance = Some(chapter_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_synonyms() {
        assert_eq!(CharacterStatus::from_label("Wounded"), CharacterStatus::Injured);
        assert_eq!(CharacterStatus::from_label("imprisoned"), CharacterStatus::Captured);
        assert_eq!(CharacterStatus::from_label("killed in battle"), CharacterStatus::Dead);
        assert_eq!(CharacterStatus::from_label("vanished"), CharacterStatus::Missing);
        assert_eq!(CharacterStatus::from_label("healthy"), CharacterStatus::Active);
        assert_eq!(CharacterStatus::from_label("transformed"), CharacterStatus::Unknown);
    }

    #[test]
    fn test_status_label_wording() {
        let cases = [
            ("rescued after being captured", CharacterStatus::Active),
            ("no longer captive", CharacterStatus::Active),
            ("freed from the brig", CharacterStatus::Active),
            ("lost consciousness", CharacterStatus::Injured),
            ("injured, lost an arm", CharacterStatus::Injured),
            ("captured but unhurt", CharacterStatus::Captured),
            ("lost at sea", CharacterStatus::Missing),
            ("no longer alive", CharacterStatus::Dead),
            ("wounded, then killed", CharacterStatus::Dead),
            ("Dead", CharacterStatus::Dead),
            ("unfreeze", CharacterStatus::Unknown),
        ];
        for (label, expected) in cases {
            assert_eq!(CharacterStatus::from_label(label), expected, "label {label:?}");
        }
    }

    #[test]
    fn test_role_synonyms() {
        assert_eq!(CharacterRole::from_label("Villain"), CharacterRole::Antagonist);
        assert_eq!(CharacterRole::from_label("crew member"), CharacterRole::Ally);
        assert_eq!(CharacterRole::from_label("bartender"), CharacterRole::Neutral);
    }

    #[test]
    fn test_items() {
        let mut c = Character::new("char_001", "Kael", "reckless");
        assert!(c.gain_item("compass"));
        assert!(!c.gain_item("compass"));
        assert!(c.lose_item("compass"));
        assert!(!c.lose_item("compass"));
        assert!(c.items.is_empty());
    }

    #[test]
    fn test_appearance_tracking() {
        let mut c = Character::new("char_001", "Kael", "reckless");
        c.mark_appearance("ch_001");
        c.mark_appearance("ch_003");
        assert_eq!(c.first_appearance.as_deref(), Some("ch_001"));
        assert_eq!(c.last_appearance.as_deref(), Some("ch_003"));
    }

    #[test]
    fn test_deserialize_minimal() {
        let c: Character =
            serde_json::from_str(r#"{"character_id": "char_009", "name": "Mira"}"#).unwrap();
        assert_eq!(c.status, CharacterStatus::Active);
        assert_eq!(c.role, CharacterRole::Supporting);
    }
}
