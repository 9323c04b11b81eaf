//! JSON persistence for the story state.
//!
//! Layout under the memory directory:
//!
//! ```text
//! memory/story_memory.json
//! memory/backups/story_memory_<YYYYmmdd_HHMMSS>[_N].json
//! chapters/ch_NNN.md
//! ```

use chrono::Utc;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::models::{StoryMemory, SCHEMA_VERSION};

const MEMORY_FILE: &str = "story_memory.json";
const BACKUP_DIR: &str = "backups";
const BACKUP_PREFIX: &str = "story_memory_";

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Invalid backup name: {0}")]
    InvalidBackupName(String),
}

/// A backup file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub name: String,
    pub path: PathBuf,
}

/// File-backed story memory.
#[derive(Debug, Clone)]
pub struct JsonStore {
    memory_dir: PathBuf,
    chapters_dir: PathBuf,
}

impl JsonStore {
    /// Open a store, creating the memory, backup and chapter directories.
    pub async fn open(
        memory_dir: impl Into<PathBuf>,
        chapters_dir: impl Into<PathBuf>,
    ) -> Result<Self, StoreError> {
        let store = Self {
            memory_dir: memory_dir.into(),
            chapters_dir: chapters_dir.into(),
        };
        fs::create_dir_all(store.backup_dir()).await?;
        fs::create_dir_all(&store.chapters_dir).await?;
        Ok(store)
    }

    pub fn memory_dir(&self) -> &Path {
        &self.memory_dir
    }

    pub fn memory_path(&self) -> PathBuf {
        self.memory_dir.join(MEMORY_FILE)
    }

    fn backup_dir(&self) -> PathBuf {
        self.memory_dir.join(BACKUP_DIR)
    }

    pub fn chapter_path(&self, chapter_id: &str) -> PathBuf {
        self.chapters_dir.join(format!("{chapter_id}.md"))
    }

    /// Whether a story state file exists.
    pub async fn exists(&self) -> bool {
        fs::try_exists(self.memory_path()).await.unwrap_or(false)
    }

    /// Save the story state, stamping `last_updated`.
    ///
    /// With `backup`, the previous file is copied into `backups/` first.
    /// The new file is written to a temp file and renamed into place.
    pub async fn save(&self, memory: &mut StoryMemory, backup: bool) -> Result<(), StoreError> {
        let path = self.memory_path();
        if backup && fs::try_exists(&path).await? {
            let backup_path = self.next_backup_path().await?;
            fs::copy(&path, &backup_path).await?;
            debug!(backup = %backup_path.display(), "Backed up story memory");
        }

        memory.schema_version = SCHEMA_VERSION;
        memory.last_updated = Utc::now();
        let content = serde_json::to_string_pretty(memory)?;

        write_atomic(&path, &content).await?;

        info!(
            chapter = memory.current_chapter_number,
            path = %path.display(),
            "Saved story memory"
        );
        Ok(())
    }

    /// Load the story state, or `None` if no story has been saved yet.
    pub async fn load(&self) -> Result<Option<StoryMemory>, StoreError> {
        let path = self.memory_path();
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        Ok(Some(parse_memory(&content)?))
    }

    /// Write a chapter's text as markdown.
    pub async fn save_chapter_text(
        &self,
        chapter_id: &str,
        markdown: &str,
    ) -> Result<PathBuf, StoreError> {
        let path = self.chapter_path(chapter_id);
        fs::write(&path, markdown).await?;
        debug!(path = %path.display(), "Saved chapter text");
        Ok(path)
    }

    /// Read a chapter's markdown, or `None` if it was never written.
    pub async fn load_chapter_text(&self, chapter_id: &str) -> Result<Option<String>, StoreError> {
        let path = self.chapter_path(chapter_id);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path).await?))
    }

    /// All backups, newest first.
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>, StoreError> {
        let mut backups = Vec::new();
        let dir = self.backup_dir();
        if !fs::try_exists(&dir).await? {
            return Ok(backups);
        }

        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with(BACKUP_PREFIX) && name.ends_with(".json") {
                backups.push(BackupInfo {
                    name: name.to_string(),
                    path: path.clone(),
                });
            }
        }

        // Timestamped names sort chronologically; a collision suffix sorts after its base.
        backups.sort_by(|a, b| backup_sort_key(&b.name).cmp(&backup_sort_key(&a.name)));
        Ok(backups)
    }

    /// Replace the story state with a named backup.
    ///
    /// The backup must parse before the current state is touched. The
    /// current state is not backed up first.
    pub async fn restore_backup(&self, name: &str) -> Result<(), StoreError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(StoreError::InvalidBackupName(name.to_string()));
        }
        let source = self.backup_dir().join(name);
        if !fs::try_exists(&source).await? {
            return Err(StoreError::BackupNotFound(name.to_string()));
        }
        let content = fs::read_to_string(&source).await?;
        parse_memory(&content)?;
        write_atomic(&self.memory_path(), &content).await?;
        info!(backup = name, "Restored story memory from backup");
        Ok(())
    }

    async fn next_backup_path(&self) -> Result<PathBuf, StoreError> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let dir = self.backup_dir();
        let mut candidate = dir.join(format!("{BACKUP_PREFIX}{stamp}.json"));
        let mut n = 1;
        while fs::try_exists(&candidate).await? {
            candidate = dir.join(format!("{BACKUP_PREFIX}{stamp}_{n}.json"));
            n += 1;
        }
        Ok(candidate)
    }
}

/// Parse saved story state. Files from a newer schema are rejected.
fn parse_memory(content: &str) -> Result<StoryMemory, StoreError> {
    let memory: StoryMemory = serde_json::from_str(content)?;
    if memory.schema_version > SCHEMA_VERSION {
        return Err(StoreError::VersionMismatch {
            expected: SCHEMA_VERSION,
            found: memory.schema_version,
        });
    }
    Ok(memory)
}

async fn write_atomic(path: &Path, content: &str) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

/// `(timestamp, collision suffix)` parsed from a backup file name.
fn backup_sort_key(name: &str) -> (String, u32) {
    let stem = name
        .trim_start_matches(BACKUP_PREFIX)
        .trim_end_matches(".json");
    // YYYYmmdd_HHMMSS is 15 characters
    match stem.get(..15) {
        Some(stamp) => {
            let suffix = stem[15..]
                .trim_start_matches('_')
                .parse::<u32>()
                .unwrap_or(0);
            (stamp.to_string(), suffix)
        }
        None => (stem.to_string(), 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> JsonStore {
        JsonStore::open(dir.path().join("memory"), dir.path().join("chapters"))
            .await
            .expect("open should succeed")
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        assert!(!store.exists().await);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let mut memory = StoryMemory::new("Chronicles", "Aether", "Reach the Edge");
        memory.current_chapter_number = 4;

        store.save(&mut memory, false).await.unwrap();
        assert!(store.exists().await);

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.story_title, "Chronicles");
        assert_eq!(loaded.current_chapter_number, 4);
        assert!(store.list_backups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backups_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let mut memory = StoryMemory::new("Chronicles", "Aether", "");

        store.save(&mut memory, true).await.unwrap();
        for n in 1..=3 {
            memory.current_chapter_number = n;
            store.save(&mut memory, true).await.unwrap();
        }

        let backups = store.list_backups().await.unwrap();
        assert_eq!(backups.len(), 3);

        // Newest backup holds the state before the last save.
        let content = std::fs::read_to_string(&backups[0].path).unwrap();
        let newest: StoryMemory = serde_json::from_str(&content).unwrap();
        assert_eq!(newest.current_chapter_number, 2);
    }

    #[tokio::test]
    async fn test_restore_backup() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let mut memory = StoryMemory::new("Chronicles", "Aether", "");
        store.save(&mut memory, false).await.unwrap();
        memory.current_chapter_number = 7;
        store.save(&mut memory, true).await.unwrap();

        let backups = store.list_backups().await.unwrap();
        store.restore_backup(&backups[0].name).await.unwrap();
        let restored = store.load().await.unwrap().unwrap();
        assert_eq!(restored.current_chapter_number, 0);
    }

    #[tokio::test]
    async fn test_restore_rejects_paths() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        for name in ["../story_memory.json", "a/b.json", ""] {
            assert!(matches!(
                store.restore_backup(name).await,
                Err(StoreError::InvalidBackupName(_))
            ));
        }
        assert!(matches!(
            store.restore_backup("story_memory_20990101_000000.json").await,
            Err(StoreError::BackupNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let mut memory = StoryMemory::new("Chronicles", "Aether", "");
        memory.schema_version = 99;
        let content = serde_json::to_string(&memory).unwrap();
        std::fs::write(store.memory_path(), content).unwrap();

        let result = store.load().await;
        assert!(matches!(
            result,
            Err(StoreError::VersionMismatch { expected: 1, found: 99 })
        ));
    }

    #[tokio::test]
    async fn test_older_version_loads() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let mut memory = StoryMemory::new("Chronicles", "Aether", "");
        memory.schema_version = 0;
        std::fs::write(store.memory_path(), serde_json::to_string(&memory).unwrap()).unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.schema_version, 0);

        // Saving upgrades the stored version.
        let mut loaded = loaded;
        store.save(&mut loaded, false).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().schema_version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_corrupt_backup_keeps_current_state() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let mut memory = StoryMemory::new("Chronicles", "Aether", "");
        memory.current_chapter_number = 3;
        store.save(&mut memory, false).await.unwrap();

        let name = "story_memory_20240101_000000.json";
        std::fs::write(store.backup_dir().join(name), "{\"story_title\": ").unwrap();

        assert!(matches!(store.restore_backup(name).await, Err(StoreError::Json(_))));
        let current = store.load().await.unwrap().unwrap();
        assert_eq!(current.current_chapter_number, 3);
    }

    #[tokio::test]
    async fn test_chapter_text() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        assert!(store.load_chapter_text("ch_001").await.unwrap().is_none());

        let path = store
            .save_chapter_text("ch_001", "# Chapter 1: Sails\n\nWind.\n")
            .await
            .unwrap();
        assert!(path.ends_with("ch_001.md"));
        let text = store.load_chapter_text("ch_001").await.unwrap().unwrap();
        assert!(text.starts_with("# Chapter 1"));
    }

    #[test]
    fn test_backup_sort_key() {
        assert_eq!(
            backup_sort_key("story_memory_20240101_120000_2.json"),
            ("20240101_120000".to_string(), 2)
        );
        assert!(
            backup_sort_key("story_memory_20240101_120000_10.json")
                > backup_sort_key("story_memory_20240101_120000_9.json")
        );
    }
}
