//! Chapter planning: one LLM call producing a structured outline.

use llm::{extract_json, estimate_tokens, GenerationRequest, LlmClient};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::StyleGuide;
use crate::error::GenerationError;
use crate::memory::PlanningContext;
use crate::models::{string_list, ChapterOutline, Scene, StoryMemory};

const TEMPERATURE: f32 = 0.7;
const DEFAULT_ARC_ID: &str = "default_arc";
const DEFAULT_CLIFFHANGER: &str = "To be continued...";
const DEFAULT_CLIFFHANGER_TYPE: &str = "mystery";

const OUTLINE_FORMAT: &str = r#"Return ONLY valid JSON in this format:
{
  "title": "Chapter Title",
  "summary": "Brief chapter summary",
  "scenes": [
    {
      "location": "Location name",
      "characters": ["Character names"],
      "purpose": "What this scene accomplishes",
      "tone": "emotional tone"
    }
  ],
  "key_events": ["Event 1", "Event 2"],
  "character_moments": {"Character Name": "Development moment"},
  "cliffhanger": "How it ends",
  "cliffhanger_type": "revelation/danger/mystery/character_arrival/emotional_peak/twist",
  "themes_present": ["theme1", "theme2"],
  "foreshadowing": ["Hint at future event"]
}"#;

/// Outline as the model returns it; every field may be missing.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OutlineResponse {
    title: Option<String>,
    summary: String,
    scenes: Vec<Scene>,
    #[serde(deserialize_with = "string_list")]
    key_events: Vec<String>,
    character_moments: BTreeMap<String, String>,
    cliffhanger: Option<String>,
    cliffhanger_type: Option<String>,
    #[serde(deserialize_with = "string_list")]
    themes_present: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    foreshadowing: Vec<String>,
}

/// Plans the next chapter.
pub struct ChapterPlanner {
    client: Arc<dyn LlmClient>,
    style: StyleGuide,
}

impl ChapterPlanner {
    pub fn new(client: Arc<dyn LlmClient>, style: StyleGuide) -> Self {
        Self { client, style }
    }

    /// Plan chapter `current_chapter_number + 1` within the current arc.
    ///
    /// Output that is not JSON is an error; missing fields take defaults.
    pub async fn plan_chapter(
        &self,
        memory: &StoryMemory,
        retrieved: Option<&PlanningContext>,
    ) -> Result<ChapterOutline, GenerationError> {
        let chapter_number = memory.next_chapter_number();
        info!(chapter = chapter_number, "Planning chapter");

        let prompt = self.planning_prompt(memory, retrieved, chapter_number);
        debug!(prompt_tokens = estimate_tokens(&prompt), "Planning prompt built");

        let response = self
            .client
            .generate(
                GenerationRequest::new(prompt)
                    .with_system(self.system_prompt())
                    .with_temperature(TEMPERATURE),
            )
            .await?;

        let arc_id = memory
            .current_arc()
            .map(|arc| arc.arc_id.as_str())
            .unwrap_or(DEFAULT_ARC_ID);
        let outline = parse_outline(&response, chapter_number, arc_id, self.style.chapter.target_word_count)?;

        info!(
            title = %outline.title,
            scenes = outline.scenes.len(),
            cliffhanger = %outline.cliffhanger_type,
            "Chapter outline created"
        );
        Ok(outline)
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a master story planner for a long-running {} serial.\n\n\
             Create chapter outlines that:\n\
             - Advance the plot while maintaining excitement\n\
             - Develop characters through actions and dialogue\n\
             - Balance action, emotion, and mystery\n\
             - Include foreshadowing and callbacks\n\
             - End with a compelling cliffhanger\n\n\
             Core themes to weave in: {}\n\n\
             Tone: {}\n\n\
             Generate a structured chapter outline in JSON format.",
            self.style.name,
            self.style.themes_line(),
            self.style.tone
        )
    }

    fn planning_prompt(
        &self,
        memory: &StoryMemory,
        retrieved: Option<&PlanningContext>,
        chapter_number: u32,
    ) -> String {
        let goal = if memory.saga_goal.is_empty() {
            "Ongoing adventure"
        } else {
            &memory.saga_goal
        };
        let mut prompt = format!(
            "Plan Chapter {chapter_number} of \"{}\"\n\n\
             STORY CONTEXT:\n\
             World: {}\n\
             Current Chapter: {}\n\
             Saga Goal: {goal}\n\n",
            memory.story_title, memory.world_name, memory.current_chapter_number
        );

        let recent = memory.recent_chapters(3);
        if !recent.is_empty() {
            prompt.push_str("RECENT CHAPTERS:\n");
            for ch in recent {
                prompt.push_str(&format!(
                    "- Ch {}: {}\n  {}\n  Ended with: {}\n",
                    ch.chapter_number, ch.title, ch.summary, ch.cliffhanger
                ));
            }
            prompt.push('\n');
        }

        if let Some(arc) = memory.current_arc() {
            prompt.push_str(&format!(
                "CURRENT ARC: {} ({})\nPhase: {} - {}\nConflict: {}\nLocation: {}\n\n",
                arc.name,
                arc.arc_type,
                arc.current_phase,
                arc.current_phase.description(),
                arc.central_conflict,
                arc.primary_location
            ));
        }

        let characters = memory.active_characters();
        if !characters.is_empty() {
            prompt.push_str("ACTIVE CHARACTERS:\n");
            for c in characters.iter().take(10) {
                prompt.push_str(&format!("- {} ({})\n", c.name, c.role));
            }
            prompt.push('\n');
        }

        match retrieved.filter(|c| !c.open_threads.is_empty()) {
            Some(context) => prompt.push_str(&context.threads_prompt()),
            None => {
                let threads = memory.major_open_threads();
                if !threads.is_empty() {
                    prompt.push_str("OPEN PLOT THREADS:\n");
                    for t in threads.iter().take(5) {
                        prompt.push_str(&format!("- {} ({})\n", t.name, t.thread_type));
                    }
                    prompt.push('\n');
                }
            }
        }

        if let Some(context) = retrieved.filter(|c| c.has_long_range()) {
            prompt.push_str(&context.to_prompt());
        }

        prompt.push_str(&format!(
            "Create a chapter outline with:\n\
             1. A compelling title\n\
             2. 3-5 scenes with: location, characters present, purpose, tone\n\
             3. Key events that occur\n\
             4. Character development moments\n\
             5. Thematic elements\n\
             6. Foreshadowing elements\n\
             7. A MANDATORY cliffhanger ending\n\n\
             Aim for about {} words of prose.\n\n{OUTLINE_FORMAT}",
            self.style.chapter.target_word_count
        ));
        prompt
    }
}

/// Parse a model outline, filling defaults for missing fields.
pub fn parse_outline(
    response: &str,
    chapter_number: u32,
    arc_id: &str,
    expected_word_count: usize,
) -> Result<ChapterOutline, GenerationError> {
    let parsed: OutlineResponse = serde_json::from_str(extract_json(response)).map_err(|e| {
        warn!(error = %e, "Outline was not valid JSON");
        GenerationError::Parse(format!("chapter outline: {e}"))
    })?;

    let non_empty = |s: Option<String>, default: String| {
        s.filter(|s| !s.trim().is_empty()).unwrap_or(default)
    };

    Ok(ChapterOutline {
        chapter_number,
        arc_id: arc_id.to_string(),
        title: non_empty(parsed.title, format!("Chapter {chapter_number}")),
        summary: parsed.summary,
        scenes: parsed.scenes,
        key_events: parsed.key_events,
        character_moments: parsed.character_moments,
        cliffhanger: non_empty(parsed.cliffhanger, DEFAULT_CLIFFHANGER.to_string()),
        cliffhanger_type: non_empty(parsed.cliffhanger_type, DEFAULT_CLIFFHANGER_TYPE.to_string()),
        themes_present: parsed.themes_present,
        foreshadowing: parsed.foreshadowing,
        expected_word_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ThreadDigest;
    use crate::models::{Arc as StoryArc, Character, Importance, ThreadStatus};
    use crate::testing::ScriptedLlm;

    #[test]
    fn test_parse_fenced_outline() {
        let response = "Here you go:\n```json\n{\"title\": \"The Drift\", \"scenes\": [{\"location\": \"Dock\", \"characters\": \"Kael, Mira\"}], \"key_events\": [\"Kael jumps\"]}\n```";
        let outline = parse_outline(response, 3, "arc_001", 1500).unwrap();
        assert_eq!(outline.title, "The Drift");
        assert_eq!(outline.scenes[0].characters, vec!["Kael", "Mira"]);
        assert_eq!(outline.cliffhanger, "To be continued...");
        assert_eq!(outline.cliffhanger_type, "mystery");
        assert_eq!(outline.chapter_number, 3);
    }

    #[test]
    fn test_parse_defaults_title() {
        let outline = parse_outline("{}", 9, DEFAULT_ARC_ID, 1200).unwrap();
        assert_eq!(outline.title, "Chapter 9");
        assert_eq!(outline.arc_id, "default_arc");
        assert_eq!(outline.expected_word_count, 1200);
    }

    #[test]
    fn test_parse_garbage_is_error() {
        let result = parse_outline("I could not plan this chapter.", 1, "arc_001", 1500);
        assert!(matches!(result, Err(GenerationError::Parse(_))));
    }

    #[tokio::test]
    async fn test_plan_uses_current_arc_and_context() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            r#"{"title": "Storm Front", "cliffhanger": "A sail on the horizon", "cliffhanger_type": "danger"}"#,
        ]));
        let mut memory = StoryMemory::new("Chronicles", "Aether", "Reach the Edge");
        memory.characters.insert(
            "char_001".to_string(),
            Character::new("char_001", "Kael", "reckless"),
        );
        let mut arc = StoryArc::new("arc_001", 1, "Arrival", "exploration", "Drift Port", "Find a ship");
        arc.status = crate::models::ArcStatus::Active;
        memory.arcs.insert("arc_001".to_string(), arc);
        memory.current_arc_id = Some("arc_001".to_string());

        let planner = ChapterPlanner::new(llm.clone(), StyleGuide::default());
        let outline = planner.plan_chapter(&memory, None).await.unwrap();

        assert_eq!(outline.chapter_number, 1);
        assert_eq!(outline.arc_id, "arc_001");
        assert_eq!(outline.cliffhanger_type, "danger");

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, Some(0.7));
        assert!(requests[0].prompt.contains("CURRENT ARC: Arrival (exploration)"));
        assert!(requests[0].prompt.contains("- Kael (supporting)"));
    }

    #[tokio::test]
    async fn test_plan_lists_retrieved_threads() {
        let llm = Arc::new(ScriptedLlm::new(vec![r#"{"title": "Side Roads"}"#]));
        let memory = StoryMemory::new("Chronicles", "Aether", "Reach the Edge");
        let context = PlanningContext {
            open_threads: vec![ThreadDigest {
                thread_id: "thread_004".to_string(),
                name: "The smuggler's debt".to_string(),
                thread_type: "quest".to_string(),
                importance: Importance::Minor,
                status: ThreadStatus::Progressing,
            }],
            ..PlanningContext::default()
        };

        let planner = ChapterPlanner::new(llm.clone(), StyleGuide::default());
        planner.plan_chapter(&memory, Some(&context)).await.unwrap();

        let prompt = &llm.requests()[0].prompt;
        assert!(prompt.contains("OPEN PLOT THREADS:\n- The smuggler's debt (quest, minor importance, progressing)"));
    }
}
