//! Configuration parsing and validation.
//!
//! Interlink is configured via a TOML file (default: `config/interlink.toml`).
//! Only `[db]` is required; every other section falls back to defaults.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/interlink.sqlite"
//!
//! [indexing]
//! batch_size = 50
//!
//! [similarity]
//! default_limit = 5
//! min_similarity = 0.1
//!
//! [processor]
//! url_prefix = "/"
//!
//! [logging]
//! filter = "info"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use interlink_core::engine::EngineConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Pending documents vectorized per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    50
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimilarityConfig {
    /// Suggestions returned by `similar` when `--limit` is not given.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Lowest cosine score worth suggesting.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
}

fn default_limit() -> usize {
    5
}
fn default_min_similarity() -> f64 {
    0.1
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            min_similarity: default_min_similarity(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessorConfig {
    /// Prepended to each document slug to form its site URL.
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
}

fn default_url_prefix() -> String {
    "/".to_string()
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            url_prefix: default_url_prefix(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl Config {
    /// Engine settings derived from `[indexing]`.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            batch_size: self.indexing.batch_size,
        }
    }

    /// A config with defaults for everything but the database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            indexing: IndexingConfig::default(),
            similarity: SimilarityConfig::default(),
            processor: ProcessorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    Ok(config)
}

/// Parse and validate a TOML config string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.indexing.batch_size == 0 {
        anyhow::bail!("indexing.batch_size must be > 0");
    }

    if config.similarity.default_limit < 1 {
        anyhow::bail!("similarity.default_limit must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.similarity.min_similarity) {
        anyhow::bail!("similarity.min_similarity must be in [0.0, 1.0]");
    }

    Ok(config)
}
