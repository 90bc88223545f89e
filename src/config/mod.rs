// Configuration management module
// Handles TOML configuration for the OpenAI endpoint, segmentation, and retry behavior


use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Environment variable holding the OpenAI API key. Never stored in the config file.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub max_tokens_per_batch: usize,
    pub max_concurrency: usize,
    pub timeout_seconds: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            max_tokens_per_batch: 8000,
            max_concurrency: 4,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Maximum tokens per chunk produced by the segmenter
    pub max_chunk_tokens: usize,
    /// Words per estimated page when the input carries no page boundaries
    pub words_per_page: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_chunk_tokens: 512,
            words_per_page: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            min_delay_ms: 1_000,
            max_delay_ms: 20_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid batch token limit: {0} (must be between 512 and 100000)")]
    InvalidBatchTokenLimit(usize),
    #[error("Invalid concurrency: {0} (must be between 1 and 64)")]
    InvalidConcurrency(usize),
    #[error("Invalid timeout: {0} (must be between 1 and 300 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid max chunk tokens: {0} (must be between 32 and 8192)")]
    InvalidMaxChunkTokens(usize),
    #[error("Invalid words per page: {0} (must be between 50 and 5000)")]
    InvalidWordsPerPage(usize),
    #[error("Invalid retry attempts: {0} (must be between 1 and 20)")]
    InvalidRetryAttempts(u32),
    #[error("Retry max delay ({0}ms) must not be less than min delay ({1}ms)")]
    RetryDelayRange(u64, u64),
    #[error("Missing API key: set the {0} environment variable")]
    MissingApiKey(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                openai: OpenAiConfig::default(),
                segmenter: SegmenterConfig::default(),
                retry: RetryConfig::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
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

    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.openai.validate()?;

        if !(32..=8192).contains(&self.segmenter.max_chunk_tokens) {
            return Err(ConfigError::InvalidMaxChunkTokens(
                self.segmenter.max_chunk_tokens,
            ));
        }
        if !(50..=5000).contains(&self.segmenter.words_per_page) {
            return Err(ConfigError::InvalidWordsPerPage(
                self.segmenter.words_per_page,
            ));
        }

        if !(1..=20).contains(&self.retry.max_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry.max_attempts));
        }
        if self.retry.max_delay_ms < self.retry.min_delay_ms {
            return Err(ConfigError::RetryDelayRange(
                self.retry.max_delay_ms,
                self.retry.min_delay_ms,
            ));
        }

        Ok(())
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    /// Path for the SQLite database holding documents, chunks, and embeddings
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("knowledge.db")
    }
}

impl OpenAiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if !(512..=100_000).contains(&self.max_tokens_per_batch) {
            return Err(ConfigError::InvalidBatchTokenLimit(self.max_tokens_per_batch));
        }

        if !(1..=64).contains(&self.max_concurrency) {
            return Err(ConfigError::InvalidConcurrency(self.max_concurrency));
        }

        if !(1..=300).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    pub fn embeddings_url(&self) -> Result<Url, ConfigError> {
        let base =
            Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        base.join("/v1/embeddings")
            .map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))
    }

    /// Read the API key from the environment. The key is deliberately never
    /// persisted in the config file.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var(API_KEY_ENV).map_err(|_| ConfigError::MissingApiKey(API_KEY_ENV))
    }
}

/// Get the default configuration directory path
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("docrag"))
        .ok_or(ConfigError::DirectoryError)
}
