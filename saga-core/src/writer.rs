//! Chapter writing: expands an outline into prose.

use llm::{estimate_tokens, GenerationRequest, LlmClient};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::StyleGuide;
use crate::error::GenerationError;
use crate::models::{Chapter, ChapterOutline, Character, StoryMemory};

const TEMPERATURE: f32 = 0.9;
const MAX_TOKENS: usize = 4096;

/// Writes full chapters from outlines.
pub struct ChapterWriter {
    client: Arc<dyn LlmClient>,
    style: StyleGuide,
}

impl ChapterWriter {
    pub fn new(client: Arc<dyn LlmClient>, style: StyleGuide) -> Self {
        Self { client, style }
    }

    /// Write the chapter described by `outline`.
    pub async fn write_chapter(
        &self,
        outline: &ChapterOutline,
        memory: &StoryMemory,
    ) -> Result<Chapter, GenerationError> {
        info!(chapter = outline.chapter_number, title = %outline.title, "Writing chapter");

        let prompt = writing_prompt(outline, memory);
        debug!(
            prompt_tokens = estimate_tokens(&prompt),
            target_words = outline.expected_word_count,
            "Writing prompt built"
        );

        let content = self
            .client
            .generate(
                GenerationRequest::new(prompt)
                    .with_system(system_prompt(&self.style))
                    .with_temperature(TEMPERATURE)
                    .with_max_tokens(MAX_TOKENS),
            )
            .await?;

        let chapter = Chapter::from_outline(outline, content.trim().to_string());
        info!(words = chapter.word_count, "Chapter written");
        Ok(chapter)
    }
}

/// House-style system prompt shared by writing and revision.
pub(crate) fn system_prompt(style: &StyleGuide) -> String {
    let mut prompt = format!(
        "You are a master storyteller writing a {} serial.\n\n\
         Your writing style:\n\
         - Vivid, cinematic descriptions\n\
         - Character-driven dialogue that reveals personality\n\
         - Balance action, emotion, and humor\n\
         - Build tension and release it strategically\n\
         - Rich sensory details\n\
         - Pacing: mix fast action with slower character moments\n\n\
         Tone: {}\n\
         Target length: ~{} words\n",
        style.name, style.tone, style.chapter.target_word_count
    );
    for rule in &style.guidelines {
        prompt.push_str(&format!("- {rule}\n"));
    }
    prompt.push_str(
        "\nWrite in present tense, third person.\n\
         Make every scene visual and emotionally engaging.\n\
         End with the specified cliffhanger.",
    );
    prompt
}

fn character_details(c: &Character) -> String {
    let mut out = format!("- {}: {}\n", c.name, c.personality);
    if let Some(speech) = c.speech_pattern.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(&format!("  Speech: {speech}\n"));
    }
    if !c.quirks.is_empty() {
        out.push_str(&format!("  Quirks: {}\n", c.quirks.join(", ")));
    }
    out
}

fn writing_prompt(outline: &ChapterOutline, memory: &StoryMemory) -> String {
    let mut prompt = format!(
        "Write Chapter {}: {}\n\nSTORY: {} - {}\n\nCHAPTER SUMMARY:\n{}\n\n",
        outline.chapter_number, outline.title, memory.story_title, memory.world_name, outline.summary
    );

    if let Some(previous) = memory
        .latest_chapter()
        .filter(|ch| ch.chapter_number < outline.chapter_number)
    {
        prompt.push_str(&format!(
            "PREVIOUS CHAPTER:\n\"{}\" ended with: {}\nContinue naturally from this point.\n\n",
            previous.title, previous.cliffhanger
        ));
    }

    let known: Vec<&Character> = outline
        .scene_characters()
        .iter()
        .filter_map(|name| memory.find_character(name))
        .collect();
    if !known.is_empty() {
        prompt.push_str("CHARACTER DETAILS:\n");
        for c in known {
            prompt.push_str(&character_details(c));
        }
        prompt.push('\n');
    }

    prompt.push_str("SCENE STRUCTURE:\n");
    for (i, scene) in outline.scenes.iter().enumerate() {
        let or = |s: &str, default: &'static str| if s.is_empty() { default.to_string() } else { s.to_string() };
        prompt.push_str(&format!(
            "\nScene {}: {}\nPurpose: {}\nTone: {}\n",
            i + 1,
            or(&scene.location, "Unknown"),
            or(&scene.purpose, "Advance plot"),
            or(&scene.tone, "balanced")
        ));
        if !scene.characters.is_empty() {
            prompt.push_str(&format!("Characters: {}\n", scene.characters.join(", ")));
        }
    }
    prompt.push('\n');

    if !outline.key_events.is_empty() {
        prompt.push_str("KEY EVENTS TO INCLUDE:\n");
        for event in &outline.key_events {
            prompt.push_str(&format!("- {event}\n"));
        }
        prompt.push('\n');
    }

    if !outline.character_moments.is_empty() {
        prompt.push_str("CHARACTER DEVELOPMENT MOMENTS:\n");
        for (name, moment) in &outline.character_moments {
            prompt.push_str(&format!("- {name}: {moment}\n"));
        }
        prompt.push('\n');
    }

    if !outline.themes_present.is_empty() {
        prompt.push_str(&format!(
            "THEMES TO WEAVE IN: {}\n\n",
            outline.themes_present.join(", ")
        ));
    }

    if !outline.foreshadowing.is_empty() {
        prompt.push_str("FORESHADOWING (subtle hints):\n");
        for hint in &outline.foreshadowing {
            prompt.push_str(&format!("- {hint}\n"));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "ENDING:\nMust end with this cliffhanger ({}):\n{}\n\n---\n\n\
         Now write the full chapter. Show, don't tell. Use dialogue to reveal character.\n\n\
         Begin the chapter now:",
        outline.cliffhanger_type, outline.cliffhanger
    ));
    prompt
}
