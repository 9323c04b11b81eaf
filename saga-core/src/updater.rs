//! State updates: extract what changed in a chapter and merge it into memory.
//!
//! The model reports changes by name. Names are matched against memory with
//! normalization and recorded aliases, so "The Navigator" and "navigator"
//! land on the same character and duplicate threads are not created.

use chrono::Utc;
use llm::{extract_json, GenerationRequest, LlmClient};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::GenerationError;
use crate::memory::VectorStore;
use crate::names::normalize_character_name;
use crate::models::arc::push_unique;
use crate::models::tracker::{
    CharacterUpdate, LocationUpdate, MajorEvent, NewCharacter, RelationshipUpdate, ThreadUpdate,
};
use crate::models::{
    next_id, Chapter, Character, CharacterRole, CharacterStatus, Impact, Relationship,
    RelationshipType, StateChanges, StoryMemory, WorldEvent, WorldLocation,
};

const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: usize = 2000;
const DEFAULT_THREAD_TYPE: &str = "mystery";
const DEFAULT_EVENT_TYPE: &str = "discovery";

/// Leading words that may be dropped when matching a new name to a known character.
const TITLES: [&str; 10] = [
    "captain", "old", "young", "lord", "lady", "sir", "master", "doctor", "dr.", "elder",
];

const SYSTEM_PROMPT: &str = "You are a story analysis expert. Extract factual state changes from narrative text.\n\
Focus on concrete, verifiable changes like:\n\
- New characters introduced (named characters who appear or speak)\n\
- Character injuries, captures, or status changes\n\
- Locations discovered, destroyed, or modified\n\
- Plot threads introduced, advanced, or resolved\n\n\
Only include new characters with names or significant roles (not unnamed townspeople or guards).\n\
Be conservative: only report changes explicitly stated or strongly implied in the text.";

const EXTRACTION_FORMAT: &str = r#"Extract the following in JSON:

1. new_characters: [{"name": "Name", "role": "protagonist/antagonist/ally/mentor/neutral", "personality": "brief description", "first_description": "how they were introduced"}]
2. character_updates: [{"character_name": "Name", "updates": {"status": "injured/captured/etc", "location": "new location", "items_gained": ["item"], "items_lost": ["item"]}}]
3. location_updates: [{"location_name": "Name", "change": "description of change", "status": "active/destroyed"}]
4. thread_updates: [{"action": "introduce/progress/resolve", "thread_name": "Name", "description": "what happened"}]
5. relationships: [{"character_a": "Name", "character_b": "Name", "type": "ally/friend/rival/enemy/mentor/family/romantic", "description": "context"}]
6. major_events: [{"description": "what happened", "type": "battle/discovery/death/alliance/betrayal/revelation", "impact": "minor/moderate/major/critical", "characters": ["Name"], "locations": ["Place"]}]

Return ONLY valid JSON with these six keys. Use [] for a category with no changes."#;

/// What a thread update asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadAction {
    Introduce,
    Progress,
    Resolve,
}

impl ThreadAction {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "introduce" | "introduced" | "new" | "setup" | "open" => Some(ThreadAction::Introduce),
            "progress" | "progressed" | "advance" | "advanced" | "develop" | "developed" => {
                Some(ThreadAction::Progress)
            }
            "resolve" | "resolved" | "close" | "closed" | "conclude" | "concluded" => {
                Some(ThreadAction::Resolve)
            }
            _ => None,
        }
    }
}

/// Counts of what an update changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub characters_added: usize,
    pub characters_merged: usize,
    pub characters_updated: usize,
    pub locations_added: usize,
    pub threads_introduced: usize,
    pub threads_progressed: usize,
    pub threads_resolved: usize,
    pub relationships_added: usize,
    pub relationships_updated: usize,
    pub events_added: usize,
    /// Ids of threads created or changed by this chapter.
    pub touched_threads: Vec<String>,
}

/// Extracts state changes from chapters and merges them into memory.
pub struct StateUpdater {
    client: Arc<dyn LlmClient>,
}

impl StateUpdater {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Ask the model what changed in `chapter`.
    ///
    /// Unreadable output is treated as no changes.
    pub async fn extract_changes(&self, chapter: &Chapter) -> Result<StateChanges, GenerationError> {
        let prompt = format!(
            "Analyze this chapter and extract state changes.\n\n\
             CHAPTER: {}\nCONTENT:\n{}\n\n{EXTRACTION_FORMAT}",
            chapter.title, chapter.content
        );
        let response = self
            .client
            .generate(
                GenerationRequest::new(prompt)
                    .with_system(SYSTEM_PROMPT)
                    .with_temperature(TEMPERATURE)
                    .with_max_tokens(MAX_TOKENS),
            )
            .await?;

        Ok(parse_changes(&response))
    }

    /// Record `chapter` in memory along with everything it changed.
    ///
    /// With a vector store, the chapter and the threads it touched are
    /// indexed; indexing failures are logged and do not fail the update.
    pub async fn update_from_chapter(
        &self,
        mut chapter: Chapter,
        memory: &mut StoryMemory,
        vectors: Option<&mut VectorStore>,
    ) -> Result<UpdateSummary, GenerationError> {
        info!(chapter = chapter.chapter_number, "Updating memory from chapter");
        chapter.state_changes = self.extract_changes(&chapter).await?;

        let summary = apply_changes(memory, &chapter);

        if let Some(vectors) = vectors {
            if let Err(e) = vectors.add_chapter(&chapter).await {
                warn!(error = %e, "Failed to index chapter");
            }
            for thread_id in &summary.touched_threads {
                if let Some(thread) = memory.plot_threads.get(thread_id) {
                    if let Err(e) = vectors.add_thread(thread).await {
                        warn!(error = %e, thread = %thread_id, "Failed to index thread");
                    }
                }
            }
        }

        memory.chapters.insert(chapter.chapter_id.clone(), chapter);
        info!(?summary, "Memory updated");
        Ok(summary)
    }
}

/// Parse extracted changes, falling back to none.
pub fn parse_changes(response: &str) -> StateChanges {
    serde_json::from_str(extract_json(response)).unwrap_or_else(|e| {
        warn!(error = %e, "Could not parse state changes, using empty changes");
        StateChanges::default()
    })
}

/// Merge a chapter's extracted changes into memory.
///
/// Advances the chapter counter, arc progress and theme counts. The chapter
/// itself is not inserted.
pub fn apply_changes(memory: &mut StoryMemory, chapter: &Chapter) -> UpdateSummary {
    let changes = &chapter.state_changes;
    let ch = chapter.chapter_id.as_str();
    let mut summary = UpdateSummary::default();

    memory.current_chapter_number = chapter.chapter_number;

    for new in &changes.new_characters {
        apply_new_character(memory, new, ch, &mut summary);
    }
    for update in &changes.character_updates {
        apply_character_update(memory, update, &mut summary);
    }
    for update in &changes.location_updates {
        apply_location_update(memory, update, ch, &mut summary);
    }
    for update in &changes.thread_updates {
        apply_thread_update(memory, update, ch, &mut summary);
    }
    for rel in &changes.relationships {
        apply_relationship(memory, rel, ch, &mut summary);
    }
    for event in &changes.major_events {
        apply_event(memory, event, chapter, &mut summary);
    }

    // Appearances
    for name in &chapter.characters_present {
        if let Some(id) = memory.find_character_id(name) {
            if let Some(c) = memory.characters.get_mut(&id) {
                c.mark_appearance(ch);
            }
        }
    }

    if let Some(arc) = memory.current_arc_mut() {
        arc.record_chapter();
        debug!(
            arc = %arc.name,
            progress = arc.current_chapter,
            expected = arc.expected_chapters,
            phase = %arc.current_phase,
            "Arc progress"
        );
    }

    for theme in &chapter.themes {
        *memory.theme_counts.entry(theme.clone()).or_insert(0) += 1;
    }

    summary
}

fn apply_new_character(
    memory: &mut StoryMemory,
    new: &NewCharacter,
    chapter_id: &str,
    summary: &mut UpdateSummary,
) {
    let name = new.name.trim();
    if name.is_empty() {
        return;
    }

    if let Some(id) = memory.find_character_id(name).or_else(|| find_titled_character(memory, name)) {
        memory.record_alias(&id, name);
        if let Some(existing) = memory.characters.get_mut(&id) {
            debug!(new = name, existing = %existing.name, "Merging into existing character");
            if existing.personality.is_empty() && !new.personality.is_empty() {
                existing.personality = new.personality.clone();
            }
            if existing.role == CharacterRole::Neutral && !new.role.is_empty() {
                existing.role = CharacterRole::from_label(&new.role);
            }
            existing.mark_appearance(chapter_id);
        }
        summary.characters_merged += 1;
        return;
    }

    let id = next_id("char", memory.characters.keys());
    let mut character = Character::new(&id, name, new.personality.clone())
        .with_role(CharacterRole::from_label(&new.role))
        .with_background(new.first_description.clone());
    character.mark_appearance(chapter_id);
    info!(id = %id, name, role = %character.role, "New character");
    memory.characters.insert(id.clone(), character);
    if let Some(arc) = memory.current_arc_mut() {
        push_unique(&mut arc.new_characters, &id);
    }
    summary.characters_added += 1;
}

/// Match names that differ only by a leading title, in either direction:
/// "Captain Mira" to a known "Mira", or "Voss" to a known "Captain Voss".
fn find_titled_character(memory: &StoryMemory, name: &str) -> Option<String> {
    let bare = untitled_key(name);
    if bare.is_empty() {
        return None;
    }
    memory.find_character_id(&bare).or_else(|| {
        memory
            .characters
            .values()
            .find(|c| untitled_key(&c.name) == bare)
            .map(|c| c.character_id.clone())
    })
}

/// Normalized name with any leading title dropped.
fn untitled_key(name: &str) -> String {
    let key = normalize_character_name(name);
    match key.split_once(' ') {
        Some((first, rest)) if TITLES.contains(&first) => rest.to_string(),
        _ => key,
    }
}

fn apply_character_update(memory: &mut StoryMemory, update: &CharacterUpdate, summary: &mut UpdateSummary) {
    let Some(id) = memory.find_character_id(&update.character_name) else {
        warn!(name = %update.character_name, "Character update for unknown character");
        return;
    };
    let Some(character) = memory.characters.get_mut(&id) else {
        return;
    };
    let fields = &update.updates;

    if let Some(label) = fields.status.as_deref().filter(|s| !s.trim().is_empty()) {
        let status = CharacterStatus::from_label(label);
        if status != character.status {
            debug!(name = %character.name, from = %character.status, to = %status, "Status change");
            character.status = status;
        }
    }
    if let Some(location) = fields.location.as_deref().filter(|s| !s.trim().is_empty()) {
        character.current_location = Some(location.trim().to_string());
    }
    for item in &fields.items_gained {
        character.gain_item(item);
    }
    for item in &fields.items_lost {
        character.lose_item(item);
    }
    summary.characters_updated += 1;
}

fn apply_location_update(
    memory: &mut StoryMemory,
    update: &LocationUpdate,
    chapter_id: &str,
    summary: &mut UpdateSummary,
) {
    let name = update.location_name.trim();
    if name.is_empty() {
        return;
    }
    let status = update.status.as_deref().map(str::trim).filter(|s| !s.is_empty());

    match memory.find_location_id(name) {
        Some(id) => {
            if let Some(location) = memory.locations.get_mut(&id) {
                if let Some(status) = status {
                    location.status = status.to_lowercase();
                }
                if !update.change.is_empty() {
                    if !location.history.is_empty() {
                        location.history.push('\n');
                    }
                    location.history.push_str(&format!("{chapter_id}: {}", update.change));
                }
            }
        }
        None => {
            let id = next_id("loc", memory.locations.keys());
            let mut location = WorldLocation::new(&id, name, update.change.clone()).first_seen_in(chapter_id);
            if let Some(status) = status {
                location.status = status.to_lowercase();
            }
            debug!(id = %id, name, "New location");
            memory.locations.insert(id, location);
            summary.locations_added += 1;
        }
    }
}

fn apply_thread_update(
    memory: &mut StoryMemory,
    update: &ThreadUpdate,
    chapter_id: &str,
    summary: &mut UpdateSummary,
) {
    let name = update.thread_name.trim();
    if name.is_empty() {
        return;
    }
    let Some(action) = ThreadAction::from_label(&update.action) else {
        warn!(action = %update.action, thread = name, "Unknown thread action");
        return;
    };
    let existing = memory.find_thread_id(name);

    let thread_id = match (action, existing) {
        (ThreadAction::Introduce, Some(id)) => {
            if let Some(thread) = memory.plot_threads.get_mut(&id) {
                debug!(new = name, existing = %thread.name, "Thread already exists");
                if thread.setup_description.is_empty() && !update.description.is_empty() {
                    thread.setup_description = update.description.clone();
                }
            }
            return;
        }
        (ThreadAction::Introduce, None) => {
            let id = next_id("thread", memory.plot_threads.keys());
            let thread = crate::models::PlotThread::new(
                &id,
                name,
                DEFAULT_THREAD_TYPE,
                chapter_id,
                update.description.clone(),
            );
            info!(id = %id, name, "New plot thread");
            memory.plot_threads.insert(id.clone(), thread);
            if let Some(arc) = memory.current_arc_mut() {
                push_unique(&mut arc.threads_introduced, &id);
            }
            summary.threads_introduced += 1;
            id
        }
        (ThreadAction::Progress, Some(id)) => {
            if let Some(thread) = memory.plot_threads.get_mut(&id) {
                thread.progress(chapter_id, update.description.clone());
            }
            if let Some(arc) = memory.current_arc_mut() {
                push_unique(&mut arc.threads_advanced, &id);
            }
            summary.threads_progressed += 1;
            id
        }
        (ThreadAction::Resolve, Some(id)) => {
            if let Some(thread) = memory.plot_threads.get_mut(&id) {
                info!(thread = %thread.name, "Plot thread resolved");
                thread.resolve(chapter_id, update.description.clone());
            }
            if let Some(arc) = memory.current_arc_mut() {
                push_unique(&mut arc.threads_resolved, &id);
            }
            summary.threads_resolved += 1;
            id
        }
        (_, None) => {
            warn!(thread = name, action = %update.action, "Thread update for unknown thread");
            return;
        }
    };
    push_unique(&mut summary.touched_threads, &thread_id);
}

fn apply_relationship(
    memory: &mut StoryMemory,
    rel: &RelationshipUpdate,
    chapter_id: &str,
    summary: &mut UpdateSummary,
) {
    let (Some(a), Some(b)) = (
        memory.find_character_id(&rel.character_a),
        memory.find_character_id(&rel.character_b),
    ) else {
        warn!(a = %rel.character_a, b = %rel.character_b, "Relationship between unknown characters");
        return;
    };
    if a == b {
        return;
    }

    let key = Relationship::key(&a, &b);
    let relationship_type = match memory.relationships.get_mut(&key) {
        Some(existing) => {
            existing.last_updated = chapter_id.to_string();
            if existing.relationship_type == RelationshipType::Neutral && !rel.kind.is_empty() {
                existing.relationship_type = RelationshipType::from_label(&rel.kind);
            }
            summary.relationships_updated += 1;
            existing.relationship_type
        }
        None => {
            let relationship = Relationship::new(&a, &b, RelationshipType::from_label(&rel.kind), chapter_id)
                .with_notes(rel.description.clone());
            let relationship_type = relationship.relationship_type;
            memory.relationships.insert(key, relationship);
            summary.relationships_added += 1;
            relationship_type
        }
    };

    for (from, to) in [(&a, &b), (&b, &a)] {
        if let Some(c) = memory.characters.get_mut(from) {
            c.relationships.insert(to.clone(), relationship_type.name().to_string());
        }
    }
}

fn apply_event(memory: &mut StoryMemory, event: &MajorEvent, chapter: &Chapter, summary: &mut UpdateSummary) {
    if event.description.trim().is_empty() {
        return;
    }
    let event_type = match event.event_type.trim() {
        "" => DEFAULT_EVENT_TYPE.to_string(),
        t => t.to_lowercase(),
    };
    let characters_involved: Vec<String> = event
        .characters
        .iter()
        .filter_map(|name| memory.find_character_id(name))
        .collect();

    let world_event = WorldEvent {
        event_id: format!("event_{}_{}", chapter.chapter_id, memory.world_timeline.len() + 1),
        chapter_id: chapter.chapter_id.clone(),
        chapter_number: chapter.chapter_number,
        description: event.description.trim().to_string(),
        event_type,
        characters_involved,
        locations_involved: event.locations.clone(),
        factions_involved: Vec::new(),
        timestamp: Utc::now(),
        impact: Impact::from_label(&event.impact),
    };

    if world_event.event_type == "revelation" {
        if let Some(arc) = memory.current_arc_mut() {
            push_unique(&mut arc.major_revelations, &world_event.description);
        }
    }
    debug!(id = %world_event.event_id, kind = %world_event.event_type, "Timeline event");
    memory.world_timeline.push(world_event);
    summary.events_added += 1;
}
