
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::config::secrets::optional_env;
use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;

pub const APP_DIR_NAME: &str = "pypsa-helper-bot";
/// Upper bound for `max_age_hours` (ten years)
pub const MAX_INDEX_AGE_HOURS: u64 = 24 * 365 * 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub distributor: DistributorConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "bge-large:latest".to_string(),
            batch_size: 32,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

/// Settings for building the on-disk vector index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexingConfig {
    /// Number of chunks embedded and merged per batch
    pub batch_size: usize,
    /// Directory name of the persisted index, relative to the base directory
    pub index_dir: String,
    /// Directory the source repositories are cloned into
    pub clone_dir: String,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            index_dir: "pypsa_ecosystem_faiss_index".to_string(),
            clone_dir: "cloned_repos".to_string(),
        }
    }
}

/// Where prebuilt index snapshots are published
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DistributorConfig {
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub tag_prefix: String,
    pub asset_name: String,
    pub max_age_hours: u64,
    pub download_timeout_seconds: u64,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            owner: "GbotemiB".to_string(),
            repo: "pypsa-helper-bot".to_string(),
            tag_prefix: "index-".to_string(),
            asset_name: "faiss-index.tar.gz".to_string(),
            max_age_hours: 24,
            download_timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.5-pro".to_string(),
            temperature: 0.3,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BotConfig {
    /// Number of preceding channel messages used as chat history
    pub history_limit: usize,
    /// Number of chunks retrieved per question
    pub retrieval_k: usize,
    /// Maximum characters per outbound message
    pub message_limit: usize,
    /// Maximum number of questions answered at the same time
    pub max_concurrent_answers: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            history_limit: 10,
            retrieval_k: 3,
            message_limit: 2000,
            max_concurrent_answers: 4,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Required environment variable {0} is not set")]
    MissingEnv(&'static str),
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid index batch size: {0} (must be between 1 and 10000)")]
    InvalidIndexBatchSize(usize),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid chunk size: {0} (must be between 100 and 8000)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid release tag prefix: {0:?} (cannot be empty)")]
    InvalidTagPrefix(String),
    #[error("Invalid {0}: must be greater than zero")]
    ZeroValue(&'static str),
    #[error("Message limit {0} exceeds the Discord maximum of 2000 characters")]
    MessageLimitTooLarge(usize),
    #[error("Invalid max_age_hours: {0} (must be at most 87600, ten years)")]
    MaxAgeTooLarge(u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Default base directory used when none is given on the command line
    #[inline]
    pub fn default_base_dir() -> Result<PathBuf, ConfigError> {
        dirs::data_local_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.validate_chunking_config()?;
        self.validate_indexing_config()?;
        self.distributor.validate()?;
        self.llm.validate()?;
        self.bot.validate()?;
        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(100..=8000).contains(&config.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }

        if config.chunk_overlap >= config.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                config.chunk_overlap,
                config.chunk_size,
            ));
        }

        Ok(())
    }

    fn validate_indexing_config(&self) -> Result<(), ConfigError> {
        if !(1..=10_000).contains(&self.indexing.batch_size) {
            return Err(ConfigError::InvalidIndexBatchSize(self.indexing.batch_size));
        }
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Directory holding the persisted vector index
    #[inline]
    pub fn index_path(&self) -> PathBuf {
        self.get_base_dir().join(&self.indexing.index_dir)
    }

    /// Parent directory of all cloned source repositories
    #[inline]
    pub fn clone_path(&self) -> PathBuf {
        self.get_base_dir().join(&self.indexing.clone_dir)
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}

/// Parse an API base so relative joins append to its path
///
/// `https://host/api/v3` becomes `https://host/api/v3/`; without the trailing
/// slash `Url::join` would replace `v3`.
#[inline]
pub fn api_base_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

impl DistributorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        api_base_url(&self.api_base)?;

        if self.tag_prefix.is_empty() {
            return Err(ConfigError::InvalidTagPrefix(self.tag_prefix.clone()));
        }

        if self.max_age_hours == 0 {
            return Err(ConfigError::ZeroValue("max_age_hours"));
        }

        if self.max_age_hours > MAX_INDEX_AGE_HOURS {
            return Err(ConfigError::MaxAgeTooLarge(self.max_age_hours));
        }

        Ok(())
    }

    /// Apply `GITHUB_REPO_OWNER` and `GITHUB_REPO_NAME` overrides
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(owner) = optional_env("GITHUB_REPO_OWNER") {
            self.owner = owner;
        }
        if let Some(repo) = optional_env("GITHUB_REPO_NAME") {
            self.repo = repo;
        }
        self
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        api_base_url(&self.api_base)?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        Ok(())
    }
}

impl BotConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval_k == 0 {
            return Err(ConfigError::ZeroValue("retrieval_k"));
        }
        if self.message_limit == 0 {
            return Err(ConfigError::ZeroValue("message_limit"));
        }
        if self.message_limit > 2000 {
            return Err(ConfigError::MessageLimitTooLarge(self.message_limit));
        }
        if self.max_concurrent_answers == 0 {
            return Err(ConfigError::ZeroValue("max_concurrent_answers"));
        }
        Ok(())
    }
}
