//! Story data model.
//!
//! Everything here is plain serializable data. The aggregate root is
//! [`StoryMemory`], which owns every entity map keyed by string id.

pub mod arc;
pub mod chapter;
pub mod character;
pub mod checker;
pub mod memory;
pub mod thread;
pub mod tracker;
pub mod world;

pub use arc::{Arc, ArcPhase, ArcStatus};
pub use chapter::{Chapter, ChapterOutline, Scene};
pub use character::{Character, CharacterRole, CharacterStatus};
pub use checker::{
    ContinuityViolation, QualityReport, RevisionResult, Severity, SeverityCounts, ViolationKind,
};
pub use memory::{StoryMemory, SCHEMA_VERSION};
pub use thread::{Development, Importance, PlotThread, ThreadStatus};
pub use tracker::{
    CharacterAlias, Impact, Relationship, RelationshipType, StateChanges, WorldEvent,
};
pub use world::{Artifact, Faction, WorldLocation};

use serde::{Deserialize, Deserializer};

/// Accept either a list of strings or a single comma-separated string.
///
/// Model output and hand-written YAML both use each form.
pub(crate) fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrString {
        List(Vec<String>),
        Single(String),
        Missing(Option<()>),
    }

    Ok(match ListOrString::deserialize(deserializer)? {
        ListOrString::List(items) => items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        ListOrString::Single(s) => split_list(&s),
        ListOrString::Missing(_) => Vec::new(),
    })
}

/// Split a comma-separated string into trimmed, non-empty items.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Accept a number or a numeric string such as `"85"`, `"85/100"` or `"85%"`.
///
/// Text that is not a number reads as missing.
pub(crate) fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
        Missing(Option<()>),
    }

    Ok(match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Some(n),
        NumberOrString::Text(s) => s
            .split('/')
            .next()
            .and_then(|n| n.trim().trim_end_matches('%').trim().parse().ok()),
        NumberOrString::Missing(_) => None,
    })
}

/// Accept a bool or a yes/no string.
pub(crate) fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Text(String),
        Missing(Option<()>),
    }

    Ok(match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => b,
        BoolOrString::Text(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "y"),
        BoolOrString::Missing(_) => false,
    })
}

/// Next id of the form `{prefix}_{NNN}` not already used as a key.
///
/// Takes one past the highest numeric suffix in use, so ids stay unique even
/// when the map has gaps.
pub fn next_id<'a, I>(prefix: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let lead = format!("{prefix}_");
    let max = existing
        .into_iter()
        .filter_map(|id| id.strip_prefix(&lead))
        .filter_map(|suffix| suffix.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("{prefix}_{:03}", max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Lenient {
        #[serde(default, deserialize_with = "lenient_number")]
        score: Option<f64>,
        #[serde(default, deserialize_with = "lenient_bool")]
        flag: bool,
    }

    #[test]
    fn test_lenient_number_and_bool() {
        let quoted: Lenient = serde_json::from_str(r#"{"score": "85", "flag": "Yes"}"#).unwrap();
        assert_eq!(quoted.score, Some(85.0));
        assert!(quoted.flag);

        let out_of: Lenient = serde_json::from_str(r#"{"score": "72/100", "flag": "no"}"#).unwrap();
        assert_eq!(out_of.score, Some(72.0));
        assert!(!out_of.flag);

        let plain: Lenient = serde_json::from_str(r#"{"score": 90, "flag": true}"#).unwrap();
        assert_eq!(plain.score, Some(90.0));
        assert!(plain.flag);

        let vague: Lenient = serde_json::from_str(r#"{"score": "high"}"#).unwrap();
        assert_eq!(vague.score, None);
        assert!(!vague.flag);
    }

    #[derive(Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "string_list")]
        items: Vec<String>,
    }

    #[test]
    fn test_string_list_accepts_both_forms() {
        let list: Holder = serde_json::from_str(r#"{"items": ["a", " b "]}"#).unwrap();
        assert_eq!(list.items, vec!["a", "b"]);

        let single: Holder = serde_json::from_str(r#"{"items": "loud, hungry,,brave"}"#).unwrap();
        assert_eq!(single.items, vec!["loud", "hungry", "brave"]);

        let null: Holder = serde_json::from_str(r#"{"items": null}"#).unwrap();
        assert!(null.items.is_empty());

        let missing: Holder = serde_json::from_str("{}").unwrap();
        assert!(missing.items.is_empty());
    }

    #[test]
    fn test_next_id_skips_gaps() {
        let ids = ["char_001".to_string(), "char_004".to_string(), "other".to_string()];
        assert_eq!(next_id("char", ids.iter()), "char_005");
        assert_eq!(next_id("thread", std::iter::empty()), "thread_001");
    }
}
