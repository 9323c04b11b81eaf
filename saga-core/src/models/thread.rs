//! Plot threads: open narrative questions tracked until resolved.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    #[default]
    Open,
    Progressing,
    Resolved,
    Abandoned,
}

impl ThreadStatus {
    /// Open or progressing.
    pub fn is_active(&self) -> bool {
        matches!(self, ThreadStatus::Open | ThreadStatus::Progressing)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ThreadStatus::Open => "open",
            ThreadStatus::Progressing => "progressing",
            ThreadStatus::Resolved => "resolved",
            ThreadStatus::Abandoned => "abandoned",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "open" => Some(ThreadStatus::Open),
            "progressing" | "in_progress" | "in progress" | "active" => {
                Some(ThreadStatus::Progressing)
            }
            "resolved" | "closed" | "done" => Some(ThreadStatus::Resolved),
            "abandoned" | "dropped" => Some(ThreadStatus::Abandoned),
            _ => None,
        }
    }
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Major,
    #[default]
    Medium,
    Minor,
}

impl Importance {
    /// Sort key with major threads first.
    pub fn rank(&self) -> u8 {
        match self {
            Importance::Major => 0,
            Importance::Medium => 1,
            Importance::Minor => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Importance::Major => "major",
            Importance::Medium => "medium",
            Importance::Minor => "minor",
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One step of progress on a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Development {
    pub chapter_id: String,
    pub description: String,
}

/// An ongoing plot thread (mystery, prophecy, promise, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotThread {
    /// `thread_NNN`
    pub thread_id: String,
    pub name: String,
    /// mystery, prophecy, promise, quest, danger, rivalry, romance, ...
    pub thread_type: String,

    /// Chapter id where the thread began (`ch_000` for seeded threads).
    pub setup_chapter: String,
    #[serde(default)]
    pub setup_description: String,

    #[serde(default)]
    pub status: ThreadStatus,
    #[serde(default)]
    pub importance: Importance,
    /// short_term, medium_term or long_term
    #[serde(default = "default_expected_resolution")]
    pub expected_resolution: String,

    #[serde(default)]
    pub developments: Vec<Development>,

    #[serde(default)]
    pub resolution_chapter: Option<String>,
    #[serde(default)]
    pub resolution_description: Option<String>,

    #[serde(default)]
    pub characters_involved: Vec<String>,
    #[serde(default)]
    pub locations_involved: Vec<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

fn default_expected_resolution() -> String {
    "medium_term".to_string()
}

impl PlotThread {
    pub fn new(
        thread_id: impl Into<String>,
        name: impl Into<String>,
        thread_type: impl Into<String>,
        setup_chapter: impl Into<String>,
        setup_description: impl Into<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            name: name.into(),
            thread_type: thread_type.into(),
            setup_chapter: setup_chapter.into(),
            setup_description: setup_description.into(),
            status: ThreadStatus::Open,
            importance: Importance::default(),
            expected_resolution: default_expected_resolution(),
            developments: Vec::new(),
            resolution_chapter: None,
            resolution_description: None,
            characters_involved: Vec::new(),
            locations_involved: Vec::new(),
            themes: Vec::new(),
            notes: String::new(),
        }
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    /// Record progress made in a chapter.
    pub fn progress(&mut self, chapter_id: &str, description: impl Into<String>) {
        self.status = ThreadStatus::Progressing;
        self.developments.push(Development {
            chapter_id: chapter_id.to_string(),
            description: description.into(),
        });
    }

    /// Close the thread in a chapter.
    pub fn resolve(&mut self, chapter_id: &str, description: impl Into<String>) {
        self.status = ThreadStatus::Resolved;
        self.resolution_chapter = Some(chapter_id.to_string());
        self.resolution_description = Some(description.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_lifecycle() {
        let mut thread = PlotThread::new("thread_001", "The lost map", "mystery", "ch_000", "");
        assert!(thread.status.is_active());

        thread.progress("ch_002", "A torn corner surfaces");
        assert_eq!(thread.status, ThreadStatus::Progressing);
        assert_eq!(thread.developments.len(), 1);

        thread.resolve("ch_005", "The map is whole");
        assert_eq!(thread.status, ThreadStatus::Resolved);
        assert!(!thread.status.is_active());
        assert_eq!(thread.resolution_chapter.as_deref(), Some("ch_005"));
    }

    #[test]
    fn test_importance_rank_orders_major_first() {
        let mut levels = vec![Importance::Minor, Importance::Major, Importance::Medium];
        levels.sort_by_key(|i| i.rank());
        assert_eq!(levels, vec![Importance::Major, Importance::Medium, Importance::Minor]);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(ThreadStatus::from_label("In Progress"), Some(ThreadStatus::Progressing));
        assert_eq!(ThreadStatus::from_label("whatever"), None);
    }
}
