//! TOML configuration.
//!
//! Every section has defaults, so `Config::default()` is a complete
//! in-memory configuration (memory engine, hashing embedder, demo model)
//! and a config file only needs the sections it changes.
//!
//! ```toml
//! [store]
//! backend = "sqlite"
//! path = "./data/ckb.sqlite"
//!
//! [chunking]
//! chunk_size = 512
//! overlap = 50
//!
//! [retrieval]
//! top_k = 5
//!
//! [governance]
//! registry_path = "./data/sources/source_registry.yaml"
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-3.5-turbo"
//!
//! [embedding]
//! provider = "hash"
//! dims = 384
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub governance: GovernanceConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_db_path(),
        }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("./data/ckb.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    512
}
fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct GovernanceConfig {
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            registry_path: default_registry_path(),
        }
    }
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("./data/sources/source_registry.yaml")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    /// Provider default when unset.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Falls back to the provider's environment variable when unset.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

fn default_llm_provider() -> String {
    "demo".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    /// True for providers that call out over the network.
    pub fn is_remote(&self) -> bool {
        matches!(self.provider.as_str(), "openai" | "ollama")
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    match config.store.backend.as_str() {
        "sqlite" | "memory" => {}
        other => bail!(
            "Unknown store backend: '{}'. Must be sqlite or memory.",
            other
        ),
    }

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if !(1..=20).contains(&config.retrieval.top_k) {
        bail!("retrieval.top_k must be in [1, 20]");
    }

    match config.llm.provider.as_str() {
        "openai" | "anthropic" | "google" | "demo" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be openai, anthropic, google, or demo.",
            other
        ),
    }
    if config.llm.timeout_secs == 0 {
        bail!("llm.timeout_secs must be > 0");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "hash" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.is_remote() {
        if config.embedding.dims.is_none() {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_text)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        validate(&config).unwrap();
        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.chunking.chunk_size, 512);
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.llm.provider, "demo");
        assert_eq!(config.embedding.provider, "hash");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections() {
        let config = parse(
            r#"
[store]
backend = "sqlite"
path = "/tmp/kb.sqlite"

[llm]
provider = "anthropic"
"#,
        )
        .unwrap();
        assert_eq!(config.store.path, PathBuf::from("/tmp/kb.sqlite"));
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.chunking.chunk_size, 512);
    }

    #[test]
    fn test_rejects_overlap_not_below_chunk_size() {
        let err = parse("[chunking]\nchunk_size = 100\noverlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_rejects_top_k_out_of_range() {
        assert!(parse("[retrieval]\ntop_k = 0\n").is_err());
        assert!(parse("[retrieval]\ntop_k = 21\n").is_err());
        assert!(parse("[retrieval]\ntop_k = 20\n").is_ok());
    }

    #[test]
    fn test_rejects_unknown_providers() {
        assert!(parse("[llm]\nprovider = \"cohere\"\n").is_err());
        assert!(parse("[embedding]\nprovider = \"disabled\"\n").is_err());
        assert!(parse("[store]\nbackend = \"postgres\"\n").is_err());
    }

    #[test]
    fn test_remote_embedder_needs_model_and_dims() {
        assert!(parse("[embedding]\nprovider = \"openai\"\ndims = 1536\n").is_err());
        assert!(parse(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n"
        )
        .is_ok());
    }
}
