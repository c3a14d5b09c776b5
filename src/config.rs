use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub precomputed: PrecomputedConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CacheConfig {
    /// Explicit cache root; when unset the `MCP_SCOUT_CACHE_DIR` env var and
    /// XDG conventions apply.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    3 * 60 * 60
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}
fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Lookahead window for promoting a documented near-tie to primary.
    #[serde(default = "default_promote_window")]
    pub promote_window: usize,
    /// Maximum score gap a promoted candidate may have from the top match.
    #[serde(default = "default_promote_margin")]
    pub promote_margin: f32,
    #[serde(default = "default_max_alternatives")]
    pub max_alternatives: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            promote_window: default_promote_window(),
            promote_margin: default_promote_margin(),
            max_alternatives: default_max_alternatives(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_similarity_threshold() -> f32 {
    0.1
}
fn default_promote_window() -> usize {
    4
}
fn default_promote_margin() -> f32 {
    0.1
}
fn default_max_alternatives() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7399".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PrecomputedConfig {
    #[serde(default = "default_precomputed_enabled")]
    pub enabled: bool,
    #[serde(default = "default_precomputed_base_url")]
    pub base_url: String,
}

impl Default for PrecomputedConfig {
    fn default() -> Self {
        Self {
            enabled: default_precomputed_enabled(),
            base_url: default_precomputed_base_url(),
        }
    }
}

fn default_precomputed_enabled() -> bool {
    true
}
fn default_precomputed_base_url() -> String {
    "https://github.com/mcp-scout/mcp-scout/releases/download/data-latest".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be > 0");
    }

    if config.search.top_k == 0 {
        anyhow::bail!("search.top_k must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.search.similarity_threshold) {
        anyhow::bail!("search.similarity_threshold must be in [0.0, 1.0]");
    }

    if config.search.promote_window == 0 {
        anyhow::bail!("search.promote_window must be >= 1");
    }

    if config.search.promote_margin < 0.0 {
        anyhow::bail!("search.promote_margin must be >= 0");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be >= 1");
    }

    if config.precomputed.base_url.trim_end_matches('/').is_empty() {
        anyhow::bail!("precomputed.base_url must not be empty");
    }

    Ok(config)
}

/// Load from `path` when given, otherwise use built-in defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => Ok(Config::default()),
    }
}
