//! Configuration: environment settings and YAML config files.
//!
//! Three files live in the config directory:
//! - `llm_config.yaml`: provider, models, retries, embeddings, pipeline options
//! - `style_guide.yaml`: house style, tone and core themes
//! - `world_seed.yaml`: the world, protagonist, crew and opening threads

use llm::{Claude, Defaults, LlmClient, OpenAi, OpenAiEmbeddings, Provider, Retrying};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::memory::retrieval::RetrievalLimits;
use crate::memory::vector_store::{Embedder, HashingEmbedder, OpenAiEmbedder};
use crate::models::string_list;

/// Errors from loading configuration or building clients.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{0} is not set")]
    MissingApiKey(&'static str),
}

// ============================================================================
// Environment settings
// ============================================================================

/// Settings from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub data_dir: PathBuf,
    pub config_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            openai_api_key: None,
            data_dir: PathBuf::from("data"),
            config_dir: PathBuf::from("config"),
        }
    }
}

impl Settings {
    /// Read API keys and directories from the process environment.
    ///
    /// Callers load `.env` first if they want it honored.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            openai_api_key: var("OPENAI_API_KEY"),
            data_dir: var("SAGA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            config_dir: var("SAGA_CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.config_dir),
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    /// `data/memory`: story state, backups and the vector index.
    pub fn memory_dir(&self) -> PathBuf {
        self.data_dir.join("memory")
    }

    /// `data/chapters`: one markdown file per chapter.
    pub fn chapters_dir(&self) -> PathBuf {
        self.data_dir.join("chapters")
    }

    pub fn api_key(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Anthropic => self.anthropic_api_key.as_deref(),
            Provider::OpenAi => self.openai_api_key.as_deref(),
        }
    }
}

/// Load and parse `<config_dir>/<name>.yaml`.
pub fn load_yaml<T: DeserializeOwned>(config_dir: &Path, name: &str) -> Result<T, ConfigError> {
    let path = config_dir.join(format!("{name}.yaml"));
    if !path.exists() {
        return Err(ConfigError::NotFound(path));
    }
    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml { path, source })
}

// ============================================================================
// llm_config.yaml
// ============================================================================

/// Model settings for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> usize {
    4096
}

fn default_temperature() -> f32 {
    0.8
}

impl ProviderConfig {
    fn with_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }

    fn defaults(&self) -> Defaults {
        Defaults {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Retry and timeout behaviour for generation calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Total attempts per call, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_max_retries() -> usize {
    3
}

fn default_timeout() -> u64 {
    120
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    Hashing,
    #[serde(alias = "open_ai")]
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,
    /// Model name for remote backends.
    #[serde(default)]
    pub model: Option<String>,
    /// Vector width for the hashing backend.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

fn default_dimensions() -> usize {
    256
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            model: None,
            dimensions: default_dimensions(),
        }
    }
}

/// Options for the chapter pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Revision passes allowed per chapter.
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u32,
    /// Overall quality score below which a chapter is revised.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: u8,
    #[serde(default = "default_true")]
    pub enable_quality_checks: bool,
    #[serde(default = "default_true")]
    pub enable_vector_store: bool,
    #[serde(default)]
    pub retrieval: RetrievalLimits,
}

fn default_max_revisions() -> u32 {
    2
}

fn default_quality_threshold() -> u8 {
    70
}

fn default_true() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_revisions: default_max_revisions(),
            quality_threshold: default_quality_threshold(),
            enable_quality_checks: true,
            enable_vector_store: true,
            retrieval: RetrievalLimits::default(),
        }
    }
}

/// Contents of `llm_config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_anthropic")]
    pub anthropic: ProviderConfig,
    #[serde(default = "default_openai")]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_anthropic() -> ProviderConfig {
    ProviderConfig::with_model("claude-sonnet-4-20250514")
}

fn default_openai() -> ProviderConfig {
    ProviderConfig::with_model("gpt-4o")
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            anthropic: default_anthropic(),
            openai: default_openai(),
            generation: GenerationConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl LlmConfig {
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        load_yaml(config_dir, "llm_config")
    }

    /// Settings for the selected provider.
    pub fn active(&self) -> &ProviderConfig {
        match self.provider {
            Provider::Anthropic => &self.anthropic,
            Provider::OpenAi => &self.openai,
        }
    }
}

/// Build the configured provider client, wrapped in the retry layer.
pub fn create_client(
    settings: &Settings,
    config: &LlmConfig,
) -> Result<Arc<dyn LlmClient>, ConfigError> {
    let provider = config.provider;
    let api_key = settings
        .api_key(provider)
        .ok_or(ConfigError::MissingApiKey(provider.api_key_var()))?;
    let active = config.active();
    let timeout = Duration::from_secs(config.generation.timeout);
    let attempts = config.generation.max_retries;

    info!(%provider, model = %active.model, attempts, "Creating LLM client");

    let client: Arc<dyn LlmClient> = match provider {
        Provider::Anthropic => Arc::new(Retrying::new(
            Claude::new(api_key)
                .with_model(&active.model)
                .with_defaults(active.defaults())
                .with_timeout(timeout),
            attempts,
        )),
        Provider::OpenAi => Arc::new(Retrying::new(
            OpenAi::new(api_key)
                .with_model(&active.model)
                .with_defaults(active.defaults())
                .with_timeout(timeout),
            attempts,
        )),
    };
    Ok(client)
}

/// Build the configured embedder, falling back to feature hashing when the
/// remote backend has no API key.
pub fn create_embedder(settings: &Settings, config: &EmbeddingsConfig) -> Arc<dyn Embedder> {
    match config.backend {
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(config.dimensions)),
        EmbeddingBackend::OpenAi => match settings.api_key(Provider::OpenAi) {
            Some(key) => {
                let mut client = OpenAiEmbeddings::new(key);
                if let Some(model) = &config.model {
                    client = client.with_model(model);
                }
                Arc::new(OpenAiEmbedder::new(client))
            }
            None => {
                warn!("OPENAI_API_KEY not set, using hashing embeddings instead");
                Arc::new(HashingEmbedder::new(config.dimensions))
            }
        },
    }
}

// ============================================================================
// style_guide.yaml
// ============================================================================

/// Chapter-shape settings from the style guide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterStyle {
    #[serde(default = "default_word_target")]
    pub target_word_count: usize,
    #[serde(default)]
    pub structure: Vec<String>,
}

fn default_word_target() -> usize {
    crate::models::chapter::DEFAULT_WORD_COUNT
}

impl Default for ChapterStyle {
    fn default() -> Self {
        Self {
            target_word_count: default_word_target(),
            structure: Vec::new(),
        }
    }
}

/// Contents of `style_guide.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleGuide {
    /// Short name of the house style, used in prompts.
    #[serde(default = "default_style_name")]
    pub name: String,
    #[serde(default = "default_tone")]
    pub tone: String,
    #[serde(default, alias = "core_themes", deserialize_with = "string_list")]
    pub themes: Vec<String>,
    /// Free-form writing rules appended to system prompts.
    #[serde(default)]
    pub guidelines: Vec<String>,
    #[serde(default)]
    pub chapter: ChapterStyle,
}

fn default_style_name() -> String {
    "serialized adventure".to_string()
}

fn default_tone() -> String {
    "Optimistic adventure with real stakes, humor mixed with drama".to_string()
}

impl Default for StyleGuide {
    fn default() -> Self {
        Self {
            name: default_style_name(),
            tone: default_tone(),
            themes: vec![
                "adventure".to_string(),
                "friendship".to_string(),
                "freedom".to_string(),
            ],
            guidelines: Vec::new(),
            chapter: ChapterStyle::default(),
        }
    }
}

impl StyleGuide {
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        load_yaml(config_dir, "style_guide")
    }

    /// Themes joined for prompt text.
    pub fn themes_line(&self) -> String {
        self.themes.join(", ")
    }
}

// ============================================================================
// world_seed.yaml
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedLocation {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedProtagonist {
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    pub personality: String,
    #[serde(default)]
    pub dream: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub quirks: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub abilities: Vec<String>,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub speech_pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedCrewMember {
    pub name: String,
    pub personality: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub background: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedThread {
    /// The open question, also used as the thread name.
    pub thread: String,
    #[serde(rename = "type", default = "default_thread_type")]
    pub thread_type: String,
}

fn default_thread_type() -> String {
    "mystery".to_string()
}

/// Contents of `world_seed.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSeed {
    pub world_name: String,
    #[serde(default)]
    pub description: String,
    pub central_conflict: String,
    #[serde(default, deserialize_with = "string_list")]
    pub themes: Vec<String>,
    pub starting_location: SeedLocation,
    pub protagonist: SeedProtagonist,
    #[serde(default)]
    pub initial_crew: Vec<SeedCrewMember>,
    #[serde(default)]
    pub initial_threads: Vec<SeedThread>,
}

impl WorldSeed {
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        load_yaml(config_dir, "world_seed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_llm_config_defaults_fill_gaps() {
        let config: LlmConfig = serde_yaml::from_str(
            "provider: openai\nopenai:\n  model: gpt-4o-mini\n  temperature: 0.6\n",
        )
        .unwrap();
        assert_eq!(config.provider, Provider::OpenAi);
        assert_eq!(config.active().model, "gpt-4o-mini");
        assert_eq!(config.active().max_tokens, 4096);
        assert_eq!(config.generation.max_retries, 3);
        assert_eq!(config.pipeline.max_revisions, 2);
        assert_eq!(config.pipeline.quality_threshold, 70);
        assert_eq!(config.embeddings.backend, EmbeddingBackend::Hashing);
    }

    #[test]
    fn test_world_seed_accepts_comma_quirks() {
        let yaml = r#"
world_name: Aether Reach
central_conflict: The sky is falling
starting_location:
  name: Drift Port
protagonist:
  name: Kael
  personality: Reckless and loyal
  quirks: "Hums when nervous, Collects feathers"
  abilities:
    - Wind sense
initial_threads:
  - thread: Who sank the old fleet?
"#;
        let seed: WorldSeed = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(seed.protagonist.quirks, vec!["Hums when nervous", "Collects feathers"]);
        assert_eq!(seed.protagonist.abilities, vec!["Wind sense"]);
        assert_eq!(seed.initial_threads[0].thread_type, "mystery");
        assert!(seed.themes.is_empty());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = StyleGuide::load(dir.path());
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_invalid_yaml_reports_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("llm_config.yaml"), "provider: [unclosed").unwrap();
        let result = LlmConfig::load(dir.path());
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn test_missing_api_key() {
        let settings = Settings::default();
        let result = create_client(&settings, &LlmConfig::default());
        assert!(matches!(
            result,
            Err(ConfigError::MissingApiKey("ANTHROPIC_API_KEY"))
        ));
    }

    #[test]
    fn test_client_uses_selected_provider() {
        let settings = Settings {
            openai_api_key: Some("sk-test".to_string()),
            ..Settings::default()
        };
        let config = LlmConfig {
            provider: Provider::OpenAi,
            ..LlmConfig::default()
        };
        let client = create_client(&settings, &config).unwrap();
        assert_eq!(client.provider(), Provider::OpenAi);
        assert_eq!(client.model(), "gpt-4o");
    }

    #[test]
    fn test_embedder_falls_back_to_hashing() {
        let config = EmbeddingsConfig {
            backend: EmbeddingBackend::OpenAi,
            model: None,
            dimensions: 64,
        };
        let embedder = create_embedder(&Settings::default(), &config);
        assert_eq!(embedder.name(), "hashing:64");
    }

    #[test]
    fn test_shipped_config_files_parse() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config");
        let llm = LlmConfig::load(&dir).unwrap();
        assert_eq!(llm.provider, Provider::Anthropic);
        assert_eq!(llm.pipeline.retrieval, RetrievalLimits::default());

        let style = StyleGuide::load(&dir).unwrap();
        assert!(style.themes.contains(&"freedom".to_string()));

        let seed = WorldSeed::load(&dir).unwrap();
        assert_eq!(seed.protagonist.quirks.len(), 2);
        assert_eq!(seed.initial_crew.len(), 2);
    }

    #[test]
    fn test_derived_dirs() {
        let settings = Settings::default().with_data_dir("/tmp/story");
        assert_eq!(settings.memory_dir(), PathBuf::from("/tmp/story/memory"));
        assert_eq!(settings.chapters_dir(), PathBuf::from("/tmp/story/chapters"));
    }
}
