//! Continuity and quality review results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a continuity violation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

impl Severity {
    /// Critical and major violations are worth a revision pass.
    pub fn needs_fix(&self) -> bool {
        matches!(self, Severity::Critical | Severity::Major)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Major => "major",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which rule a violation broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    CharacterStatus,
    UnknownCharacter,
    Possession,
    Location,
    Timeline,
}

/// A continuity error found in a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuityViolation {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub severity: Severity,
    pub description: String,
    /// Chapter id the violation relates to.
    pub chapter_reference: String,
    #[serde(default)]
    pub conflicting_info: String,
    pub suggested_fix: String,
}

/// Count of violations per severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeverityCounts {
    pub critical: usize,
    pub major: usize,
    pub minor: usize,
}

impl SeverityCounts {
    pub fn from_violations(violations: &[ContinuityViolation]) -> Self {
        let mut counts = Self::default();
        for v in violations {
            match v.severity {
                Severity::Critical => counts.critical += 1,
                Severity::Major => counts.major += 1,
                Severity::Minor => counts.minor += 1,
            }
        }
        counts
    }

    /// Number of critical plus major violations.
    pub fn blocking(&self) -> usize {
        self.critical + self.major
    }
}

/// LLM assessment of a chapter's craft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub overall_score: u8,
    /// Adherence to the configured house style.
    pub style_score: u8,
    pub voice_consistency_score: u8,
    pub pacing_score: u8,
    pub has_cliffhanger: bool,
    pub has_foreshadowing: bool,
    pub has_callbacks: bool,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub needs_revision: bool,
}

impl QualityReport {
    /// Neutral report used when the assessment cannot be read.
    pub fn fallback() -> Self {
        Self {
            overall_score: 50,
            style_score: 50,
            voice_consistency_score: 50,
            pacing_score: 50,
            has_cliffhanger: false,
            has_foreshadowing: false,
            has_callbacks: false,
            strengths: vec!["Could not assess - unreadable assessment".to_string()],
            suggestions: vec!["Manual review required".to_string()],
            needs_revision: true,
        }
    }
}

/// Output of one revision pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionResult {
    pub revised_text: String,
    /// What was asked for, human readable.
    pub revision_notes: String,
    /// Descriptions of the violations the revision targeted.
    #[serde(default)]
    pub violations_fixed: Vec<String>,
    /// Set once the revised chapter has been re-assessed.
    #[serde(default)]
    pub quality_improved: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(severity: Severity) -> ContinuityViolation {
        ContinuityViolation {
            kind: ViolationKind::Location,
            severity,
            description: "x".to_string(),
            chapter_reference: "ch_001".to_string(),
            conflicting_info: String::new(),
            suggested_fix: "y".to_string(),
        }
    }

    #[test]
    fn test_severity_counts() {
        let violations = vec![
            violation(Severity::Critical),
            violation(Severity::Minor),
            violation(Severity::Minor),
            violation(Severity::Major),
        ];
        let counts = SeverityCounts::from_violations(&violations);
        assert_eq!(counts.critical, 1);
        assert_eq!(counts.major, 1);
        assert_eq!(counts.minor, 2);
        assert_eq!(counts.blocking(), 2);
    }

    #[test]
    fn test_violation_serializes_kind_as_type() {
        let json = serde_json::to_value(violation(Severity::Major)).unwrap();
        assert_eq!(json["type"], "location");
        assert_eq!(json["severity"], "major");
    }

    #[test]
    fn test_fallback_needs_revision() {
        let report = QualityReport::fallback();
        assert_eq!(report.overall_score, 50);
        assert!(report.needs_revision);
    }
}
