//! Planning context from recency, relevance and surprise.
//!
//! The planner sees the last few chapters verbatim. Once the story is longer
//! than that window, the vector index adds older chapters and events that are
//! semantically close to where the story is now, and a couple of random old
//! chapters are offered as callback opportunities.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::vector_store::{SearchResult, VectorError, VectorStore};
use crate::models::{Chapter, Importance, StoryMemory, ThreadStatus};

/// Chapters older than `current - recent - SURPRISE_GAP` are callback candidates.
const SURPRISE_GAP: i64 = 5;

/// How much of each kind of context to gather.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalLimits {
    pub recent_chapters: usize,
    pub relevant: usize,
    pub surprise_callbacks: usize,
    pub open_threads: usize,
}

impl Default for RetrievalLimits {
    fn default() -> Self {
        Self {
            recent_chapters: 3,
            relevant: 5,
            surprise_callbacks: 2,
            open_threads: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChapterDigest {
    pub chapter_id: String,
    pub chapter_number: u32,
    pub title: String,
    pub summary: String,
    pub cliffhanger: String,
}

impl From<&Chapter> for ChapterDigest {
    fn from(ch: &Chapter) -> Self {
        Self {
            chapter_id: ch.chapter_id.clone(),
            chapter_number: ch.chapter_number,
            title: ch.title.clone(),
            summary: ch.summary.clone(),
            cliffhanger: ch.cliffhanger.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelevantChapter {
    pub chapter_id: String,
    pub chapter_number: u32,
    pub title: String,
    pub document: String,
    pub relevance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelevantEvent {
    pub event: String,
    pub chapter_id: String,
    pub chapter_number: u32,
    pub relevance: f32,
}

/// An old chapter worth a subtle callback.
#[derive(Debug, Clone, PartialEq)]
pub struct SurpriseCallback {
    pub chapter_id: String,
    pub chapter_number: u32,
    pub title: String,
    pub key_event: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadDigest {
    pub thread_id: String,
    pub name: String,
    pub thread_type: String,
    pub importance: Importance,
    pub status: ThreadStatus,
}

/// Everything gathered for one planning call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanningContext {
    pub recent_chapters: Vec<ChapterDigest>,
    pub relevant_chapters: Vec<RelevantChapter>,
    pub relevant_events: Vec<RelevantEvent>,
    pub surprise_callbacks: Vec<SurpriseCallback>,
    pub open_threads: Vec<ThreadDigest>,
}

impl PlanningContext {
    /// Whether retrieval found anything beyond the recent window.
    pub fn has_long_range(&self) -> bool {
        !self.relevant_chapters.is_empty()
            || !self.relevant_events.is_empty()
            || !self.surprise_callbacks.is_empty()
    }

    /// Render the retrieved open threads, major first.
    pub fn threads_prompt(&self) -> String {
        let mut out = String::from("OPEN PLOT THREADS:\n");
        for t in &self.open_threads {
            out.push_str(&format!(
                "- {} ({}, {} importance, {})\n",
                t.name, t.thread_type, t.importance, t.status
            ));
        }
        out.push('\n');
        out
    }

    /// Render the long-range parts as prompt text.
    ///
    /// Recent chapters are already in the planner's base context.
    pub fn to_prompt(&self) -> String {
        let mut out = String::new();
        if !self.relevant_chapters.is_empty() {
            out.push_str("RELEVANT PAST CHAPTERS:\n");
            for ch in &self.relevant_chapters {
                out.push_str(&format!(
                    "- Chapter {} \"{}\" (relevance {:.2}): {}\n",
                    ch.chapter_number,
                    ch.title,
                    ch.relevance,
                    ch.document.replace('\n', " ")
                ));
            }
            out.push('\n');
        }
        if !self.relevant_events.is_empty() {
            out.push_str("RELEVANT PAST EVENTS:\n");
            for ev in &self.relevant_events {
                out.push_str(&format!("- (Chapter {}) {}\n", ev.chapter_number, ev.event));
            }
            out.push('\n');
        }
        if !self.surprise_callbacks.is_empty() {
            out.push_str("CALLBACK OPPORTUNITIES (consider a subtle reference):\n");
            for cb in &self.surprise_callbacks {
                match &cb.key_event {
                    Some(event) => out.push_str(&format!(
                        "- Chapter {} \"{}\": {}\n",
                        cb.chapter_number, cb.title, event
                    )),
                    None => out.push_str(&format!("- Chapter {} \"{}\"\n", cb.chapter_number, cb.title)),
                }
            }
            out.push('\n');
        }
        out
    }
}

/// One step in a thread's history.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadHistoryEntry {
    pub chapter_id: String,
    pub description: String,
    /// The chapter the development happened in, if it is still in memory.
    pub chapter: Option<ChapterDigest>,
}

/// Gathers planning context from memory and, when present, the vector index.
#[derive(Debug, Clone, Copy)]
pub struct SmartRetriever<'a> {
    vectors: Option<&'a VectorStore>,
    limits: RetrievalLimits,
}

impl<'a> SmartRetriever<'a> {
    pub fn new(vectors: Option<&'a VectorStore>) -> Self {
        Self {
            vectors,
            limits: RetrievalLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: RetrievalLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Gather context for planning the next chapter.
    ///
    /// Vector search failures are logged and leave the relevant sections empty.
    pub async fn retrieve_for_planning<R: Rng + ?Sized>(
        &self,
        memory: &StoryMemory,
        arc_id: Option<&str>,
        rng: &mut R,
    ) -> PlanningContext {
        let limits = self.limits;
        let mut context = PlanningContext::default();

        // Recency
        let recent = memory.recent_chapters(limits.recent_chapters);
        context.recent_chapters = recent.iter().map(|ch| ChapterDigest::from(*ch)).collect();

        // Relevance
        if let Some(vectors) = self.vectors {
            if memory.chapters.len() > limits.recent_chapters && limits.relevant > 0 {
                let query = match recent.first() {
                    Some(latest) => format!(
                        "{} {}",
                        latest.summary,
                        latest.key_events.iter().take(3).cloned().collect::<Vec<_>>().join(" ")
                    ),
                    None => format!("{} {}", memory.saga_goal, memory.world_name),
                };

                match vectors.search_chapters(&query, limits.relevant, arc_id).await {
                    Ok(results) => {
                        context.relevant_chapters = results
                            .into_iter()
                            .filter(|r| !recent.iter().any(|ch| ch.chapter_id == r.id))
                            .map(|r| RelevantChapter {
                                chapter_number: meta_number(&r),
                                title: r.meta_str("title").unwrap_or_default().to_string(),
                                relevance: r.relevance(),
                                chapter_id: r.id,
                                document: r.document,
                            })
                            .collect();
                    }
                    Err(e) => warn!(error = %e, "Chapter search failed, skipping relevant chapters"),
                }

                match vectors.search_events(&query, limits.relevant * 2).await {
                    Ok(results) => {
                        context.relevant_events = results
                            .into_iter()
                            .take(limits.relevant)
                            .map(|r| RelevantEvent {
                                chapter_id: r.meta_str("chapter_id").unwrap_or_default().to_string(),
                                chapter_number: meta_number(&r),
                                relevance: r.relevance(),
                                event: r.document,
                            })
                            .collect();
                    }
                    Err(e) => warn!(error = %e, "Event search failed, skipping relevant events"),
                }
            }
        }

        // Surprise
        let cutoff = memory.current_chapter_number as i64 - limits.recent_chapters as i64 - SURPRISE_GAP;
        let old: Vec<&Chapter> = memory
            .chapters
            .values()
            .filter(|ch| (ch.chapter_number as i64) < cutoff)
            .collect();
        context.surprise_callbacks = old
            .choose_multiple(rng, limits.surprise_callbacks)
            .map(|ch| SurpriseCallback {
                chapter_id: ch.chapter_id.clone(),
                chapter_number: ch.chapter_number,
                title: ch.title.clone(),
                key_event: ch.key_events.choose(rng).cloned(),
            })
            .collect();

        // Threads, major first
        let mut threads = memory.open_threads();
        threads.sort_by(|a, b| {
            a.importance
                .rank()
                .cmp(&b.importance.rank())
                .then_with(|| a.thread_id.cmp(&b.thread_id))
        });
        context.open_threads = threads
            .into_iter()
            .take(limits.open_threads)
            .map(|t| ThreadDigest {
                thread_id: t.thread_id.clone(),
                name: t.name.clone(),
                thread_type: t.thread_type.clone(),
                importance: t.importance,
                status: t.status,
            })
            .collect();

        debug!(
            recent = context.recent_chapters.len(),
            relevant_chapters = context.relevant_chapters.len(),
            relevant_events = context.relevant_events.len(),
            surprises = context.surprise_callbacks.len(),
            threads = context.open_threads.len(),
            "Retrieved planning context"
        );
        context
    }

    /// Past events involving a character.
    pub async fn search_character_history(
        &self,
        character_name: &str,
        n: usize,
    ) -> Result<Vec<SearchResult>, VectorError> {
        let query = format!("{character_name} character development moment action");
        match self.vectors {
            Some(vectors) => vectors.search_events(&query, n).await,
            None => Ok(Vec::new()),
        }
    }

    /// Past events resembling a described situation.
    pub async fn find_similar_situations(
        &self,
        situation: &str,
        n: usize,
    ) -> Result<Vec<SearchResult>, VectorError> {
        match self.vectors {
            Some(vectors) => vectors.search_events(situation, n).await,
            None => Ok(Vec::new()),
        }
    }

    /// A thread's developments in order, each with its chapter.
    ///
    /// The thread is found by normalized name; unknown threads have no history.
    pub fn get_thread_history(&self, memory: &StoryMemory, thread_name: &str) -> Vec<ThreadHistoryEntry> {
        let Some(thread) = memory
            .find_thread_id(thread_name)
            .and_then(|id| memory.plot_threads.get(&id))
        else {
            return Vec::new();
        };

        thread
            .developments
            .iter()
            .map(|dev| ThreadHistoryEntry {
                chapter_id: dev.chapter_id.clone(),
                description: dev.description.clone(),
                chapter: memory.chapters.get(&dev.chapter_id).map(ChapterDigest::from),
            })
            .collect()
    }
}

fn meta_number(result: &SearchResult) -> u32 {
    result
        .meta_u64("chapter_number")
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or_default()
}
