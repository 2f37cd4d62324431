//! TOML configuration parsing and validation.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where raw blobs live and how they are split.
#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    /// Literal token joining documents inside one blob. Never auto-detected.
    pub separator: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            title_max_chars: default_title_max_chars(),
            max_document_bytes: default_max_document_bytes(),
        }
    }
}

fn default_title_max_chars() -> usize {
    80
}
fn default_max_document_bytes() -> usize {
    4 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
    #[serde(default)]
    pub extra_stopwords: Vec<String>,
    /// Multiplier applied to scores contributed by code-block postings.
    #[serde(default = "default_code_weight")]
    pub code_weight: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            min_token_len: default_min_token_len(),
            extra_stopwords: Vec::new(),
            code_weight: default_code_weight(),
        }
    }
}

fn default_min_token_len() -> usize {
    2
}
fn default_code_weight() -> f64 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResolverConfig {
    #[serde(default = "default_topical_threshold")]
    pub topical_threshold: f64,
    #[serde(default = "default_heading_max_level")]
    pub heading_max_level: u8,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            topical_threshold: default_topical_threshold(),
            heading_max_level: default_heading_max_level(),
        }
    }
}

fn default_topical_threshold() -> f64 {
    0.15
}
fn default_heading_max_level() -> u8 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            final_limit: default_final_limit(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_final_limit() -> usize {
    12
}
fn default_snippet_chars() -> usize {
    240
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
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// An in-memory configuration with every tunable at its default.
    ///
    /// The database path points inside `root`; callers that never persist
    /// can ignore it.
    pub fn minimal(root: impl Into<PathBuf>, separator: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            db: DbConfig {
                path: root.join(".docmesh").join("index.sqlite"),
            },
            corpus: CorpusConfig {
                root,
                separator: separator.into(),
                include_globs: default_include_globs(),
                exclude_globs: Vec::new(),
                follow_symlinks: false,
            },
            parser: ParserConfig::default(),
            index: IndexConfig::default(),
            resolver: ResolverConfig::default(),
            retrieval: RetrievalConfig::default(),
            server: ServerConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.corpus.separator.is_empty() {
            anyhow::bail!("corpus.separator must not be empty");
        }
        if self.parser.title_max_chars == 0 {
            anyhow::bail!("parser.title_max_chars must be > 0");
        }
        if self.parser.max_document_bytes == 0 {
            anyhow::bail!("parser.max_document_bytes must be > 0");
        }
        if self.index.min_token_len == 0 {
            anyhow::bail!("index.min_token_len must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.index.code_weight) {
            anyhow::bail!("index.code_weight must be in [0.0, 1.0]");
        }
        if !(0.0..1.0).contains(&self.resolver.topical_threshold) {
            anyhow::bail!("resolver.topical_threshold must be in [0.0, 1.0)");
        }
        if !(1..=6).contains(&self.resolver.heading_max_level) {
            anyhow::bail!("resolver.heading_max_level must be between 1 and 6");
        }
        if self.retrieval.final_limit < 1 {
            anyhow::bail!("retrieval.final_limit must be >= 1");
        }
        if self.retrieval.snippet_chars < 16 {
            anyhow::bail!("retrieval.snippet_chars must be >= 16");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
