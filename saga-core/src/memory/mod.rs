//! Story persistence and recall.
//!
//! - [`JsonStore`]: the story state file, backups and chapter markdown
//! - [`VectorStore`]: a small embedded similarity index over chapters, events and threads
//! - [`SmartRetriever`]: planning context mixing recency, relevance and surprise

pub mod json_store;
pub mod retrieval;
pub mod vector_store;

pub use json_store::{BackupInfo, JsonStore, StoreError};
pub use retrieval::{
    ChapterDigest, PlanningContext, RelevantChapter, RelevantEvent, RetrievalLimits,
    SmartRetriever, SurpriseCallback, ThreadDigest, ThreadHistoryEntry,
};
pub use vector_store::{
    Embedder, HashingEmbedder, OpenAiEmbedder, SearchResult, VectorError, VectorStats,
    VectorStore,
};
