//! Targeted chapter revision from continuity and quality feedback.

use llm::{GenerationRequest, LlmClient};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::StyleGuide;
use crate::error::GenerationError;
use crate::models::{Chapter, ContinuityViolation, QualityReport, RevisionResult};

const TEMPERATURE: f32 = 0.75;

/// Revises chapters while keeping their story intact.
pub struct ChapterReviser {
    client: Arc<dyn LlmClient>,
    style: StyleGuide,
}

impl ChapterReviser {
    pub fn new(client: Arc<dyn LlmClient>, style: StyleGuide) -> Self {
        Self { client, style }
    }

    /// Revise `chapter` to address blocking violations and quality suggestions.
    ///
    /// `attempt` starts at 1. An empty response keeps the original text.
    pub async fn revise_chapter(
        &self,
        chapter: &Chapter,
        violations: &[ContinuityViolation],
        report: &QualityReport,
        attempt: u32,
    ) -> Result<RevisionResult, GenerationError> {
        info!(chapter = chapter.chapter_number, attempt, "Revising chapter");

        let blocking: Vec<&ContinuityViolation> =
            violations.iter().filter(|v| v.severity.needs_fix()).collect();

        let response = self
            .client
            .generate(
                GenerationRequest::new(self.revision_prompt(chapter, &blocking, report))
                    .with_system(self.system_prompt())
                    .with_temperature(TEMPERATURE),
            )
            .await?;

        let revised_text = match response.trim() {
            "" => {
                warn!("Revision came back empty, keeping the original text");
                chapter.content.clone()
            }
            text => text.to_string(),
        };

        let result = RevisionResult {
            revised_text,
            revision_notes: revision_notes(&blocking, report, attempt),
            violations_fixed: blocking.iter().map(|v| v.description.clone()).collect(),
            quality_improved: None,
        };
        info!(
            violations = result.violations_fixed.len(),
            suggestions = report.suggestions.len().min(3),
            "Revision complete"
        );
        Ok(result)
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a skilled chapter editor for a {} serial.\n\n\
             Revise chapters while:\n\
             - Fixing continuity errors and inconsistencies\n\
             - Improving quality based on specific feedback\n\
             - PRESERVING the core story, characters, and plot progression\n\
             - KEEPING successful elements intact\n\n\
             Tone: {}\n\
             Core themes: {}\n\n\
             Make targeted improvements, not wholesale rewrites.\n\
             Return the complete revised chapter text.",
            self.style.name,
            self.style.tone,
            self.style.themes_line()
        )
    }

    fn revision_prompt(
        &self,
        chapter: &Chapter,
        blocking: &[&ContinuityViolation],
        report: &QualityReport,
    ) -> String {
        let mut prompt = format!(
            "Revise this chapter based on specific feedback.\n\n\
             CHAPTER INFO:\nTitle: {}\nNumber: {}\n\n\
             ORIGINAL TEXT:\n{}\n\n---\n\nREVISION REQUIREMENTS:\n\n",
            chapter.title, chapter.chapter_number, chapter.content
        );

        if !blocking.is_empty() {
            prompt.push_str("CONTINUITY ISSUES TO FIX:\n");
            for (i, v) in blocking.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n   Fix: {}\n\n", i + 1, v.description, v.suggested_fix));
            }
        }

        if !report.suggestions.is_empty() {
            prompt.push_str("QUALITY IMPROVEMENTS:\n");
            for (i, s) in report.suggestions.iter().take(3).enumerate() {
                prompt.push_str(&format!("{}. {s}\n", i + 1));
            }
            prompt.push('\n');
        }

        if !report.strengths.is_empty() {
            prompt.push_str("PRESERVE THESE STRENGTHS:\n");
            for s in report.strengths.iter().take(2) {
                prompt.push_str(&format!("- {s}\n"));
            }
            prompt.push('\n');
        }

        let target = self.style.chapter.target_word_count;
        prompt.push_str(&format!(
            "GUIDELINES:\n\
             - Make TARGETED fixes, not a complete rewrite\n\
             - Keep the core plot, characters, and story progression\n\
             - Ensure natural dialogue and authentic character voices\n\
             - Preserve the cliffhanger ending\n\
             - Keep the chapter length similar ({}-{} words)\n\n\
             Return only the complete revised chapter text.",
            target * 4 / 5,
            target * 6 / 5
        ));
        prompt
    }
}

fn revision_notes(blocking: &[&ContinuityViolation], report: &QualityReport, attempt: u32) -> String {
    let mut notes = format!("Revision attempt {attempt}\n\n");
    if !blocking.is_empty() {
        notes.push_str(&format!("Continuity fixes ({}):\n", blocking.len()));
        for v in blocking {
            notes.push_str(&format!(
                "  - [{}] {}\n",
                v.severity.name().to_uppercase(),
                v.description
            ));
        }
        notes.push('\n');
    }
    if !report.suggestions.is_empty() {
        notes.push_str("Quality improvements:\n");
        for s in report.suggestions.iter().take(3) {
            notes.push_str(&format!("  - {s}\n"));
        }
        notes.push('\n');
    }
    notes.push_str(&format!("Original quality score: {}/100\n", report.overall_score));
    notes
}
