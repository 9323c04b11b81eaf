//! Story arcs spanning multiple chapters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArcStatus {
    #[default]
    Planned,
    Active,
    Completed,
}

/// Narrative phase within an arc, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArcPhase {
    #[default]
    Arrival,
    Discovery,
    Escalation,
    Climax,
    Resolution,
    Departure,
}

impl ArcPhase {
    pub const ALL: [ArcPhase; 6] = [
        ArcPhase::Arrival,
        ArcPhase::Discovery,
        ArcPhase::Escalation,
        ArcPhase::Climax,
        ArcPhase::Resolution,
        ArcPhase::Departure,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ArcPhase::Arrival => "arrival",
            ArcPhase::Discovery => "discovery",
            ArcPhase::Escalation => "escalation",
            ArcPhase::Climax => "climax",
            ArcPhase::Resolution => "resolution",
            ArcPhase::Departure => "departure",
        }
    }

    /// What this phase is for, used in planning prompts.
    pub fn description(&self) -> &'static str {
        match self {
            ArcPhase::Arrival => "Protagonists arrive, setup begins",
            ArcPhase::Discovery => "Conflict and stakes are revealed",
            ArcPhase::Escalation => "Tension builds, complications arise",
            ArcPhase::Climax => "Major confrontation or revelation",
            ArcPhase::Resolution => "Arc concludes, threads resolve",
            ArcPhase::Departure => "Setup for next arc",
        }
    }

    /// Phase for the next chapter after `completed` of `expected` chapters.
    pub fn for_progress(completed: u32, expected: u32) -> ArcPhase {
        let expected = expected.max(1) as usize;
        let index = (completed as usize * Self::ALL.len()) / expected;
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }
}

impl fmt::Display for ArcPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A multi-chapter narrative segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    /// `arc_NNN`
    pub arc_id: String,
    pub arc_number: u32,
    pub name: String,

    /// heist, rebellion, tournament, rescue, mystery, exploration, ...
    pub arc_type: String,
    #[serde(default)]
    pub status: ArcStatus,

    pub primary_location: String,
    #[serde(default)]
    pub environment_description: String,

    /// Character ids.
    #[serde(default)]
    pub main_characters: Vec<String>,
    #[serde(default)]
    pub antagonists: Vec<String>,
    #[serde(default)]
    pub allies: Vec<String>,
    #[serde(default)]
    pub new_characters: Vec<String>,

    #[serde(default)]
    pub summary: String,
    pub central_conflict: String,
    #[serde(default)]
    pub themes: Vec<String>,

    #[serde(default = "default_expected_chapters")]
    pub expected_chapters: u32,
    #[serde(default)]
    pub current_chapter: u32,
    #[serde(default)]
    pub current_phase: ArcPhase,

    /// Thread ids.
    #[serde(default)]
    pub threads_introduced: Vec<String>,
    #[serde(default)]
    pub threads_advanced: Vec<String>,
    #[serde(default)]
    pub threads_resolved: Vec<String>,

    #[serde(default)]
    pub factions_involved: Vec<String>,
    #[serde(default)]
    pub major_revelations: Vec<String>,
    /// Character id -> growth description.
    #[serde(default)]
    pub character_growth: BTreeMap<String, String>,
    #[serde(default)]
    pub world_changes: Vec<String>,

    #[serde(default)]
    pub notes: String,
}

fn default_expected_chapters() -> u32 {
    10
}

impl Arc {
    pub fn new(
        arc_id: impl Into<String>,
        arc_number: u32,
        name: impl Into<String>,
        arc_type: impl Into<String>,
        primary_location: impl Into<String>,
        central_conflict: impl Into<String>,
    ) -> Self {
        Self {
            arc_id: arc_id.into(),
            arc_number,
            name: name.into(),
            arc_type: arc_type.into(),
            status: ArcStatus::Planned,
            primary_location: primary_location.into(),
            environment_description: String::new(),
            main_characters: Vec::new(),
            antagonists: Vec::new(),
            allies: Vec::new(),
            new_characters: Vec::new(),
            summary: String::new(),
            central_conflict: central_conflict.into(),
            themes: Vec::new(),
            expected_chapters: default_expected_chapters(),
            current_chapter: 0,
            current_phase: ArcPhase::Arrival,
            threads_introduced: Vec::new(),
            threads_advanced: Vec::new(),
            threads_resolved: Vec::new(),
            factions_involved: Vec::new(),
            major_revelations: Vec::new(),
            character_growth: BTreeMap::new(),
            world_changes: Vec::new(),
            notes: String::new(),
        }
    }

    /// Count a finished chapter and move the phase forward if due.
    ///
    /// The phase never moves backwards, even if `expected_chapters` grows.
    pub fn record_chapter(&mut self) {
        self.current_chapter += 1;
        let due = ArcPhase::for_progress(self.current_chapter, self.expected_chapters);
        if due > self.current_phase {
            self.current_phase = due;
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ArcStatus::Active
    }
}

/// Push `id` unless already present.
pub(crate) fn push_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|existing| existing == id) {
        list.push(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_progression_over_five_chapters() {
        let mut arc = Arc::new("arc_001", 1, "Arrival", "exploration", "Port", "Find the map");
        arc.expected_chapters = 5;

        let mut phases = Vec::new();
        for _ in 0..5 {
            arc.record_chapter();
            phases.push(arc.current_phase);
        }
        assert_eq!(
            phases,
            vec![
                ArcPhase::Discovery,
                ArcPhase::Escalation,
                ArcPhase::Climax,
                ArcPhase::Resolution,
                ArcPhase::Departure,
            ]
        );
        assert_eq!(arc.current_chapter, 5);
    }

    #[test]
    fn test_phase_never_regresses() {
        let mut arc = Arc::new("arc_001", 1, "A", "mystery", "B", "C");
        arc.expected_chapters = 2;
        arc.record_chapter();
        assert_eq!(arc.current_phase, ArcPhase::Climax);
        arc.expected_chapters = 50;
        arc.record_chapter();
        assert_eq!(arc.current_phase, ArcPhase::Climax);
    }

    #[test]
    fn test_push_unique() {
        let mut ids = vec!["thread_001".to_string()];
        push_unique(&mut ids, "thread_001");
        push_unique(&mut ids, "thread_002");
        assert_eq!(ids.len(), 2);
    }
}
