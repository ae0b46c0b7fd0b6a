//! Configuration loading, validation, and management for PolicyGate.
//!
//! Loads configuration from `~/.policygate/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.policygate/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chunking window
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Scoped retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Embedding model
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Where collections, the registry and the audit log live
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window size in characters
    #[serde(default = "default_chunk_size")]
    pub size: usize,

    /// Characters shared by consecutive windows
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

fn default_chunk_size() -> usize {
    900
}
fn default_chunk_overlap() -> usize {
    150
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Snippets returned per layer
    #[serde(default = "default_k_per_layer")]
    pub k_per_layer: usize,

    /// Snippets sharing this many leading characters are duplicates
    #[serde(default = "default_dedup_prefix_chars")]
    pub dedup_prefix_chars: usize,

    /// Layers retrieved in parallel
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-call timeout on the embedder and the collections
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Query used by `policygate retrieve` when none is given
    #[serde(default = "default_query")]
    pub default_query: String,

    /// Re-stamp chunk status when a policy is approved
    #[serde(default = "default_true")]
    pub sync_chunk_status: bool,
}

fn default_k_per_layer() -> usize {
    5
}
fn default_dedup_prefix_chars() -> usize {
    220
}
fn default_max_concurrency() -> usize {
    4
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_query() -> String {
    "SME lending red flags, documentation requirements, GST vs bank mismatch, \
     cashflow volatility, rework escalation"
        .into()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_per_layer: default_k_per_layer(),
            dedup_prefix_chars: default_dedup_prefix_chars(),
            max_concurrency: default_max_concurrency(),
            timeout_secs: default_timeout_secs(),
            default_query: default_query(),
            sync_chunk_status: true,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "hashing" (offline) or "openai_compat" (any `/embeddings` endpoint)
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Base URL of the embedding endpoint (e.g. `http://localhost:11434/v1`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Vector length produced by the embedder
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

fn default_embedding_provider() -> String {
    "hashing".into()
}
fn default_embedding_model() -> String {
    "all-minilm".into()
}
fn default_dimensions() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_url: None,
            api_key: None,
            model: default_embedding_model(),
            dimensions: default_dimensions(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "sqlite" (durable) or "memory" (ephemeral)
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Data directory; defaults to `~/.policygate/data`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Registry file name inside the data directory
    #[serde(default = "default_registry_file")]
    pub registry_file: String,

    /// Audit log file name inside the data directory
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

fn default_storage_backend() -> String {
    "sqlite".into()
}
fn default_registry_file() -> String {
    "policy_registry.json".into()
}
fn default_audit_file() -> String {
    "audit_log.jsonl".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            data_dir: None,
            registry_file: default_registry_file(),
            audit_file: default_audit_file(),
        }
    }
}

impl StorageConfig {
    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("data"))
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir().join(&self.registry_file)
    }

    pub fn audit_path(&self) -> PathBuf {
        self.data_dir().join(&self.audit_file)
    }

    /// Directory holding one SQLite file per layer.
    pub fn layers_dir(&self) -> PathBuf {
        self.data_dir().join("layers")
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.policygate/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `POLICYGATE_DATA_DIR`
    /// - `POLICYGATE_EMBEDDING_URL`
    /// - `POLICYGATE_EMBEDDING_MODEL`
    /// - `POLICYGATE_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("POLICYGATE_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Ok(url) = std::env::var("POLICYGATE_EMBEDDING_URL") {
            self.embedding.api_url = Some(url);
            if self.embedding.provider == default_embedding_provider() {
                self.embedding.provider = "openai_compat".into();
            }
        }
        if let Ok(model) = std::env::var("POLICYGATE_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = std::env::var("POLICYGATE_API_KEY").ok();
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".policygate")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.size == 0 {
            return Err(ConfigError::ValidationError(
                "chunking.size must be > 0".into(),
            ));
        }
        if self.chunking.overlap >= self.chunking.size {
            return Err(ConfigError::ValidationError(format!(
                "chunking.overlap ({}) must be smaller than chunking.size ({})",
                self.chunking.overlap, self.chunking.size
            )));
        }
        if self.retrieval.k_per_layer == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.k_per_layer must be >= 1".into(),
            ));
        }
        if self.retrieval.dedup_prefix_chars == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.dedup_prefix_chars must be >= 1".into(),
            ));
        }
        if self.retrieval.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.max_concurrency must be >= 1".into(),
            ));
        }
        if self.retrieval.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.timeout_secs must be >= 1".into(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimensions must be > 0".into(),
            ));
        }
        match self.embedding.provider.as_str() {
            "hashing" => {}
            "openai_compat" | "ollama" => {
                if self.embedding.api_url.is_none() && self.embedding.provider != "ollama" {
                    return Err(ConfigError::ValidationError(
                        "embedding.api_url is required for the openai_compat provider".into(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown embedding.provider '{other}'"
                )));
            }
        }
        if !matches!(self.storage.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown storage.backend '{}'",
                self.storage.backend
            )));
        }
        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
