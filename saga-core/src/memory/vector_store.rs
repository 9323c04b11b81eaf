//! Embedded similarity index over chapters, key events and plot threads.
//!
//! The index is small enough to keep in memory and search by brute force.
//! It is written to `<memory_dir>/vectors/index.json` after every mutation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::models::{Chapter, PlotThread, ThreadStatus};

/// Errors from the vector index.
#[derive(Debug, Error)]
pub enum VectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] llm::Error),

    #[error("Embedder returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}

// ============================================================================
// Embedders
// ============================================================================

/// Turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Identifies the embedding space; indexes built with another embedder are discarded.
    fn name(&self) -> &str;
}

/// Deterministic feature-hashing embedder.
///
/// Each lowercase word and adjacent word pair is hashed with SHA-256 into one
/// of `dimensions` buckets with a hashed sign, then the vector is L2-normalized.
/// Needs no network, so it is always available.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    name: String,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            name: format!("hashing:{dimensions}"),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        let mut add = |feature: &str, weight: f32| {
            let digest = Sha256::digest(feature.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign * weight;
        };

        for word in &words {
            add(word.as_str(), 1.0);
        }
        for pair in words.windows(2) {
            add(&format!("{} {}", pair[0], pair[1]), 0.5);
        }

        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Embeddings from the OpenAI embeddings endpoint.
pub struct OpenAiEmbedder {
    client: llm::OpenAiEmbeddings,
    name: String,
}

impl OpenAiEmbedder {
    pub fn new(client: llm::OpenAiEmbeddings) -> Self {
        let name = format!("openai:{}", client.model());
        Self { client, name }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(self.client.embed(texts).await?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity, 0 when either vector is all zeros or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

// ============================================================================
// Index
// ============================================================================

type Metadata = BTreeMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Record {
    id: String,
    document: String,
    metadata: Metadata,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Index {
    embedder: String,
    #[serde(default)]
    chapters: Vec<Record>,
    #[serde(default)]
    events: Vec<Record>,
    #[serde(default)]
    threads: Vec<Record>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
    Chapters,
    Events,
    Threads,
}

impl Index {
    fn records(&self, collection: Collection) -> &Vec<Record> {
        match collection {
            Collection::Chapters => &self.chapters,
            Collection::Events => &self.events,
            Collection::Threads => &self.threads,
        }
    }

    fn records_mut(&mut self, collection: Collection) -> &mut Vec<Record> {
        match collection {
            Collection::Chapters => &mut self.chapters,
            Collection::Events => &mut self.events,
            Collection::Threads => &mut self.threads,
        }
    }

    fn upsert(&mut self, collection: Collection, record: Record) {
        let records = self.records_mut(collection);
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub document: String,
    pub metadata: BTreeMap<String, Value>,
    /// `1 - cosine similarity`; smaller is closer.
    pub distance: f32,
}

impl SearchResult {
    pub fn relevance(&self) -> f32 {
        1.0 - self.distance
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn meta_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(Value::as_u64)
    }
}

/// Record counts per collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VectorStats {
    pub chapters: usize,
    pub events: usize,
    pub threads: usize,
}

/// Persistent similarity index.
pub struct VectorStore {
    path: PathBuf,
    embedder: Arc<dyn Embedder>,
    index: Index,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("path", &self.path)
            .field("embedder", &self.embedder.name())
            .field("stats", &self.stats())
            .finish()
    }
}

impl VectorStore {
    /// Open the index under `memory_dir/vectors`, loading any saved records.
    ///
    /// A saved index built by a different embedder is discarded.
    pub async fn open(memory_dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, VectorError> {
        let dir = memory_dir.join("vectors");
        fs::create_dir_all(&dir).await?;
        let path = dir.join("index.json");

        let mut index = Index {
            embedder: embedder.name().to_string(),
            ..Index::default()
        };
        if fs::try_exists(&path).await? {
            let content = fs::read_to_string(&path).await?;
            let saved: Index = serde_json::from_str(&content)?;
            if saved.embedder == embedder.name() {
                index = saved;
            } else {
                warn!(
                    saved = %saved.embedder,
                    current = %embedder.name(),
                    "Vector index built with another embedder, starting fresh"
                );
            }
        }

        let store = Self {
            path,
            embedder,
            index,
        };
        info!(stats = ?store.stats(), "Opened vector store");
        Ok(store)
    }

    pub fn stats(&self) -> VectorStats {
        VectorStats {
            chapters: self.index.chapters.len(),
            events: self.index.events.len(),
            threads: self.index.threads.len(),
        }
    }

    /// Index a chapter summary and each of its key events.
    pub async fn add_chapter(&mut self, chapter: &Chapter) -> Result<(), VectorError> {
        let mut documents = vec![format!(
            "{}\n{}\n{}",
            chapter.title,
            chapter.summary,
            chapter.key_events.join("\n")
        )];
        documents.extend(chapter.key_events.iter().cloned());
        let mut embeddings = self.embed_all(&documents).await?.into_iter();

        let mut metadata = Metadata::new();
        metadata.insert("chapter_number".into(), chapter.chapter_number.into());
        metadata.insert("arc_id".into(), chapter.arc_id.clone().into());
        metadata.insert("title".into(), chapter.title.clone().into());
        metadata.insert(
            "cliffhanger_type".into(),
            chapter.cliffhanger_type.clone().into(),
        );
        if let Some(embedding) = embeddings.next() {
            self.index.upsert(
                Collection::Chapters,
                Record {
                    id: chapter.chapter_id.clone(),
                    document: documents[0].clone(),
                    metadata,
                    embedding,
                },
            );
        }

        for ((i, event), embedding) in chapter.key_events.iter().enumerate().zip(embeddings) {
            let mut metadata = Metadata::new();
            metadata.insert("chapter_id".into(), chapter.chapter_id.clone().into());
            metadata.insert("chapter_number".into(), chapter.chapter_number.into());
            metadata.insert("event_index".into(), i.into());
            self.index.upsert(
                Collection::Events,
                Record {
                    id: format!("{}_event_{i}", chapter.chapter_id),
                    document: event.clone(),
                    metadata,
                    embedding,
                },
            );
        }

        debug!(chapter = %chapter.chapter_id, events = chapter.key_events.len(), "Indexed chapter");
        self.persist().await
    }

    /// Index or refresh a plot thread.
    pub async fn add_thread(&mut self, thread: &PlotThread) -> Result<(), VectorError> {
        let document = format!("{}\n{}", thread.name, thread.setup_description);
        let embedding = self
            .embed_all(std::slice::from_ref(&document))
            .await?
            .pop()
            .unwrap_or_default();

        let mut metadata = Metadata::new();
        metadata.insert("type".into(), thread.thread_type.clone().into());
        metadata.insert("status".into(), thread.status.name().into());
        metadata.insert("importance".into(), thread.importance.name().into());
        self.index.upsert(
            Collection::Threads,
            Record {
                id: thread.thread_id.clone(),
                document,
                metadata,
                embedding,
            },
        );
        self.persist().await
    }

    /// Chapters closest to `query`, optionally limited to one arc.
    pub async fn search_chapters(
        &self,
        query: &str,
        n: usize,
        arc_id: Option<&str>,
    ) -> Result<Vec<SearchResult>, VectorError> {
        self.search(Collection::Chapters, query, n, |r| {
            arc_id.map_or(true, |arc| r.metadata.get("arc_id").and_then(Value::as_str) == Some(arc))
        })
        .await
    }

    pub async fn search_events(&self, query: &str, n: usize) -> Result<Vec<SearchResult>, VectorError> {
        self.search(Collection::Events, query, n, |_| true).await
    }

    /// Threads closest to `query`, optionally limited to one status.
    pub async fn search_threads(
        &self,
        query: &str,
        n: usize,
        status: Option<ThreadStatus>,
    ) -> Result<Vec<SearchResult>, VectorError> {
        self.search(Collection::Threads, query, n, |r| {
            status.map_or(true, |s| {
                r.metadata.get("status").and_then(Value::as_str) == Some(s.name())
            })
        })
        .await
    }

    /// Drop every record and persist the empty index.
    pub async fn reset(&mut self) -> Result<(), VectorError> {
        self.index = Index {
            embedder: self.embedder.name().to_string(),
            ..Index::default()
        };
        info!("Reset vector store");
        self.persist().await
    }

    async fn search(
        &self,
        collection: Collection,
        query: &str,
        n: usize,
        keep: impl Fn(&Record) -> bool,
    ) -> Result<Vec<SearchResult>, VectorError> {
        let records = self.index.records(collection);
        if n == 0 || records.is_empty() || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query_embedding = self
            .embed_all(&[query.to_string()])
            .await?
            .pop()
            .unwrap_or_default();

        let mut results: Vec<SearchResult> = records
            .iter()
            .filter(|r| keep(r))
            .map(|r| SearchResult {
                id: r.id.clone(),
                document: r.document.clone(),
                metadata: r.metadata.clone(),
                distance: 1.0 - cosine_similarity(&query_embedding, &r.embedding),
            })
            .collect();
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(n);
        Ok(results)
    }

    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorError> {
        let embeddings = self.embedder.embed(texts).await?;
        if embeddings.len() != texts.len() {
            return Err(VectorError::CountMismatch {
                expected: texts.len(),
                got: embeddings.len(),
            });
        }
        Ok(embeddings)
    }

    async fn persist(&self) -> Result<(), VectorError> {
        let content = serde_json::to_string(&self.index)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
