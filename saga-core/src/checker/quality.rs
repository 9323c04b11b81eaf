use llm::{extract_json, GenerationRequest, LlmClient};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::StyleGuide;
use crate::error::GenerationError;
use crate::models::{lenient_bool, lenient_number, string_list, Chapter, QualityReport, StoryMemory};

const TEMPERATURE: f32 = 0.3;
const NEUTRAL_SCORE: f64 = 50.0;

const REPORT_FORMAT: &str = r#"Return ONLY valid JSON in this format:
{
  "overall_score": 85,
  "style_score": 90,
  "voice_consistency_score": 85,
  "pacing_score": 80,
  "has_cliffhanger": true,
  "has_foreshadowing": true,
  "has_callbacks": true,
  "strengths": ["Specific strength with example"],
  "suggestions": ["Specific suggestion"],
  "needs_revision": false
}"#;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReportResponse {
    #[serde(deserialize_with = "lenient_number")]
    overall_score: Option<f64>,
    #[serde(alias = "oda_style_score", deserialize_with = "lenient_number")]
    style_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    voice_consistency_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pacing_score: Option<f64>,
    #[serde(deserialize_with = "lenient_bool")]
    has_cliffhanger: bool,
    #[serde(deserialize_with = "lenient_bool")]
    has_foreshadowing: bool,
    #[serde(deserialize_with = "lenient_bool")]
    has_callbacks: bool,
    #[serde(deserialize_with = "string_list")]
    strengths: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    suggestions: Vec<String>,
    #[serde(deserialize_with = "lenient_bool")]
    needs_revision: bool,
}

/// Model-based assessment of a chapter's craft.
pub struct QualityChecker {
    client: Arc<dyn LlmClient>,
    style: StyleGuide,
    threshold: u8,
}

impl QualityChecker {
    pub fn new(client: Arc<dyn LlmClient>, style: StyleGuide) -> Self {
        Self {
            client,
            style,
            threshold: 70,
        }
    }

    /// Overall score below which a chapter always needs revision.
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Assess a chapter.
    ///
    /// An unreadable assessment yields [`QualityReport::fallback`]; only
    /// transport failures are errors.
    pub async fn check_chapter(
        &self,
        chapter: &Chapter,
        memory: &StoryMemory,
    ) -> Result<QualityReport, GenerationError> {
        info!(chapter = chapter.chapter_number, "Assessing chapter quality");

        let response = self
            .client
            .generate(
                GenerationRequest::new(self.assessment_prompt(chapter, memory))
                    .with_system(self.system_prompt())
                    .with_temperature(TEMPERATURE),
            )
            .await?;

        let report = parse_report(&response, self.threshold);
        info!(
            overall = report.overall_score,
            style = report.style_score,
            voice = report.voice_consistency_score,
            pacing = report.pacing_score,
            needs_revision = report.needs_revision,
            "Quality assessment"
        );
        Ok(report)
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a story quality assessor for a {} serial.\n\n\
             Evaluate chapters objectively against the house style:\n\
             - Tone: {}\n\
             - Character-driven storytelling\n\
             - Mystery layering and foreshadowing\n\
             - Compelling cliffhangers\n\
             - World-building through action\n\n\
             Core themes: {}\n\n\
             Give constructive feedback with specific examples.\n\
             Return the assessment in JSON format.",
            self.style.name,
            self.style.tone,
            self.style.themes_line()
        )
    }

    fn assessment_prompt(&self, chapter: &Chapter, memory: &StoryMemory) -> String {
        let mut prompt = format!(
            "Assess the quality of this chapter against the house style.\n\n\
             CHAPTER INFO:\n\
             Title: {}\n\
             Number: {} (of {} written so far)\n\
             Story: {}\n\n",
            chapter.title,
            chapter.chapter_number,
            memory.chapters.len(),
            memory.story_title
        );

        let recent = memory.recent_chapters(2);
        if !recent.is_empty() {
            prompt.push_str("RECENT CHAPTERS:\n");
            for ch in recent {
                prompt.push_str(&format!(
                    "- Ch {}: {} (cliffhanger: {})\n",
                    ch.chapter_number, ch.title, ch.cliffhanger_type
                ));
            }
            prompt.push('\n');
        }

        prompt.push_str(&format!(
            "CHAPTER TEXT:\n{}\n\n---\n\n\
             Score each criterion from 0 to 100:\n\
             1. Style: does it match the house tone and themes?\n\
             2. Voice consistency: do characters sound like themselves?\n\
             3. Pacing and structure: do scenes flow and build?\n\
             Then answer yes/no: cliffhanger present, foreshadowing present, callbacks to past events.\n\
             List 2-3 strengths and 2-3 suggestions. Needs revision if overall < {}.\n\n\
             {REPORT_FORMAT}",
            chapter.content, self.threshold
        ));
        prompt
    }
}

fn score(value: Option<f64>) -> u8 {
    value.unwrap_or(NEUTRAL_SCORE).clamp(0.0, 100.0).round() as u8
}

/// Parse a model assessment; reports below `threshold` always need revision.
pub(crate) fn parse_report(response: &str, threshold: u8) -> QualityReport {
    let parsed: ReportResponse = match serde_json::from_str(extract_json(response)) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Could not parse quality assessment, flagging for review");
            return QualityReport::fallback();
        }
    };

    let overall_score = score(parsed.overall_score);
    QualityReport {
        overall_score,
        style_score: score(parsed.style_score),
        voice_consistency_score: score(parsed.voice_consistency_score),
        pacing_score: score(parsed.pacing_score),
        has_cliffhanger: parsed.has_cliffhanger,
        has_foreshadowing: parsed.has_foreshadowing,
        has_callbacks: parsed.has_callbacks,
        strengths: parsed.strengths,
        suggestions: parsed.suggestions,
        needs_revision: parsed.needs_revision || overall_score < threshold,
    }
}
