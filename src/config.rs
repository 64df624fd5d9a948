//! Configuration loading.
//!
//! `shelf` reads one TOML file (`--config`, default `./config/shelf.toml`).
//! Only `[paths]` is required:
//!
//! ```toml
//! [paths]
//! input = "/photos/inbox"
//! archive = "/photos/archive"
//!
//! [indexing]
//! scheme = "capture-serial"
//!
//! [names]
//! engine = "string"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use scanshelf_core::cluster::{DEFAULT_EMBEDDING_THRESHOLD, DEFAULT_STRING_THRESHOLD};
use scanshelf_core::indexing::IndexScheme;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub names: NamesConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Directory holding raw capture files.
    pub input: PathBuf,
    /// Archive root; also holds the index, staging and name state files.
    pub archive: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_scheme() -> String {
    "capture-serial".to_string()
}

fn default_include_globs() -> Vec<String> {
    ["*.png", "*.jpg", "*.jpeg", "*.webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl IndexingConfig {
    pub fn scheme(&self) -> Result<IndexScheme> {
        self.scheme.parse().map_err(anyhow::Error::msg)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NamesConfig {
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Distance threshold; defaults per engine when absent.
    #[serde(default)]
    pub threshold: Option<f64>,
}

impl Default for NamesConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            threshold: None,
        }
    }
}

fn default_engine() -> String {
    "string".to_string()
}

impl NamesConfig {
    pub fn threshold_for(&self, engine: &str) -> f64 {
        self.threshold.unwrap_or(match engine {
            "embedding" => DEFAULT_EMBEDDING_THRESHOLD,
            _ => DEFAULT_STRING_THRESHOLD,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
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
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
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

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    config.indexing.scheme()?;

    if config.indexing.include_globs.is_empty() {
        bail!("indexing.include_globs must not be empty");
    }

    match config.names.engine.as_str() {
        "string" | "embedding" => {}
        other => bail!(
            "Unknown names.engine: '{}'. Must be string or embedding.",
            other
        ),
    }

    if let Some(threshold) = config.names.threshold {
        if !(threshold > 0.0 && threshold <= 1.0) {
            bail!("names.threshold must be in (0.0, 1.0]");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
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
        if config.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
    }

    if config.names.engine == "embedding" && !config.embedding.is_enabled() {
        bail!("names.engine = \"embedding\" requires an enabled [embedding] provider");
    }

    Ok(config)
}
