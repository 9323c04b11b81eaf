use tracing::{info, warn};

use crate::models::{
    Chapter, CharacterStatus, ContinuityViolation, Severity, SeverityCounts, StoryMemory,
    ViolationKind,
};

/// Rule-based continuity checks.
///
/// Rules:
/// - the chapter number follows the last written chapter
/// - characters marked dead do not appear in key events or scene rosters
/// - new scene locations are flagged for awareness
/// - character moments only name characters the story knows
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuityChecker;

impl ContinuityChecker {
    pub fn new() -> Self {
        Self
    }

    /// All violations found in `chapter` against `memory`.
    ///
    /// `memory` must not yet contain the chapter's own state changes.
    pub fn check_chapter(&self, chapter: &Chapter, memory: &StoryMemory) -> Vec<ContinuityViolation> {
        let mut violations = Vec::new();
        violations.extend(check_timeline(chapter, memory));
        violations.extend(check_character_status(chapter, memory));
        violations.extend(check_locations(chapter, memory));
        violations.extend(check_character_moments(chapter, memory));

        if violations.is_empty() {
            info!(chapter = chapter.chapter_number, "No continuity violations");
        } else {
            for v in &violations {
                warn!(severity = %v.severity, "{}", v.description);
            }
        }
        violations
    }

    pub fn severity_counts(&self, violations: &[ContinuityViolation]) -> SeverityCounts {
        SeverityCounts::from_violations(violations)
    }
}

fn check_timeline(chapter: &Chapter, memory: &StoryMemory) -> Option<ContinuityViolation> {
    let expected = memory.next_chapter_number();
    (chapter.chapter_number != expected).then(|| ContinuityViolation {
        kind: ViolationKind::Timeline,
        severity: Severity::Major,
        description: format!(
            "Chapter number {} does not follow chapter {}",
            chapter.chapter_number, memory.current_chapter_number
        ),
        chapter_reference: chapter.chapter_id.clone(),
        conflicting_info: format!("Expected chapter {expected}"),
        suggested_fix: format!("Renumber the chapter as {expected}"),
    })
}

fn check_character_status(chapter: &Chapter, memory: &StoryMemory) -> Vec<ContinuityViolation> {
    let events: Vec<String> = chapter.key_events.iter().map(|e| e.to_lowercase()).collect();
    let roster: Vec<String> = chapter
        .characters_present
        .iter()
        .filter_map(|name| memory.find_character_id(name))
        .collect();

    memory
        .characters
        .values()
        .filter(|c| c.status == CharacterStatus::Dead)
        .filter(|c| {
            let name = c.name.to_lowercase();
            roster.contains(&c.character_id)
                || (!name.is_empty() && events.iter().any(|e| e.contains(&name)))
        })
        .map(|c| ContinuityViolation {
            kind: ViolationKind::CharacterStatus,
            severity: Severity::Critical,
            description: format!("{} appears but is marked as dead", c.name),
            chapter_reference: chapter.chapter_id.clone(),
            conflicting_info: match &c.last_appearance {
                Some(ch) => format!("Last seen alive in {ch}"),
                None => "Character died in an earlier chapter".to_string(),
            },
            suggested_fix: format!("Either revive {} explicitly or remove the references", c.name),
        })
        .collect()
}

fn check_locations(chapter: &Chapter, memory: &StoryMemory) -> Vec<ContinuityViolation> {
    chapter
        .scene_locations()
        .into_iter()
        .filter(|location| !memory.knows_location(location))
        .map(|location| ContinuityViolation {
            kind: ViolationKind::Location,
            severity: Severity::Minor,
            description: format!("New location introduced: {location}"),
            chapter_reference: chapter.chapter_id.clone(),
            conflicting_info: String::new(),
            suggested_fix: format!("Consider adding {location} to world locations if it is significant"),
        })
        .collect()
}

fn check_character_moments(chapter: &Chapter, memory: &StoryMemory) -> Vec<ContinuityViolation> {
    let Some(outline) = &chapter.outline else {
        return Vec::new();
    };
    outline
        .character_moments
        .keys()
        .filter(|name| memory.find_character_id(name).is_none())
        .map(|name| ContinuityViolation {
            kind: ViolationKind::UnknownCharacter,
            severity: Severity::Major,
            description: format!("Character '{name}' has a development moment but is not in memory"),
            chapter_reference: chapter.chapter_id.clone(),
            conflicting_info: "Character not found in story memory".to_string(),
            suggested_fix: format!("Introduce {name} properly or fix the character name"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChapterOutline, Character, Scene, WorldLocation};
    use std::collections::BTreeMap;

    fn memory() -> StoryMemory {
        let mut m = StoryMemory::new("Chronicles", "Aether", "");
        m.characters.insert("char_001".to_string(), Character::new("char_001", "Kael", "reckless"));
        let mut bram = Character::new("char_002", "Old Bram", "gruff");
        bram.status = CharacterStatus::Dead;
        bram.last_appearance = Some("ch_002".to_string());
        m.characters.insert("char_002".to_string(), bram);
        m.locations.insert(
            "loc_001".to_string(),
            WorldLocation::new("loc_001", "Drift Port", "harbor"),
        );
        m.current_chapter_number = 2;
        m
    }

    fn chapter(n: u32, scenes: Vec<Scene>, events: &[&str], moments: &[(&str, &str)]) -> Chapter {
        let outline = ChapterOutline {
            chapter_number: n,
            arc_id: "arc_001".to_string(),
            title: "T".to_string(),
            summary: String::new(),
            scenes,
            key_events: events.iter().map(|e| e.to_string()).collect(),
            character_moments: moments
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            cliffhanger: String::new(),
            cliffhanger_type: "mystery".to_string(),
            themes_present: Vec::new(),
            foreshadowing: Vec::new(),
            expected_word_count: 1500,
        };
        Chapter::from_outline(&outline, "text".to_string())
    }

    fn scene(location: &str, characters: &[&str]) -> Scene {
        Scene {
            location: location.to_string(),
            characters: characters.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_chapter() {
        let ch = chapter(3, vec![scene("drift port", &["Kael"])], &["Kael finds a map"], &[("Kael", "grows")]);
        assert!(ContinuityChecker::new().check_chapter(&ch, &memory()).is_empty());
    }

    #[test]
    fn test_dead_character_in_roster_or_events() {
        let checker = ContinuityChecker::new();
        let in_roster = chapter(3, vec![scene("Drift Port", &["old bram"])], &[], &[]);
        let in_events = chapter(3, vec![], &["Old Bram's ghost speaks"], &[]);

        for ch in [in_roster, in_events] {
            let violations = checker.check_chapter(&ch, &memory());
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].kind, ViolationKind::CharacterStatus);
            assert_eq!(violations[0].severity, Severity::Critical);
            assert!(violations[0].conflicting_info.contains("ch_002"));
        }
    }

    #[test]
    fn test_new_location_is_minor() {
        let ch = chapter(3, vec![scene("Sky Fortress", &[])], &[], &[]);
        let violations = ContinuityChecker::new().check_chapter(&ch, &memory());
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Minor);
        assert_eq!(ContinuityChecker::new().severity_counts(&violations).blocking(), 0);
    }

    #[test]
    fn test_unknown_character_moment_is_major() {
        let ch = chapter(3, vec![], &[], &[("Zephyr", "arrives")]);
        let violations = ContinuityChecker::new().check_chapter(&ch, &memory());
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::UnknownCharacter);
        assert_eq!(violations[0].severity, Severity::Major);
    }

    #[test]
    fn test_timeline_gap() {
        let ch = chapter(5, vec![], &[], &[]);
        let violations = ContinuityChecker::new().check_chapter(&ch, &memory());
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Timeline);
    }
}
