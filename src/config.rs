use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    pub root: PathBuf,
    /// File names (relative to `root`) that are always imported when present.
    #[serde(default = "default_well_known_files")]
    pub well_known_files: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Explicit workflow policy file; otherwise discovered under `root`.
    #[serde(default)]
    pub policy_file: Option<PathBuf>,
}

pub fn default_well_known_files() -> Vec<String> {
    [
        "kb_corpus.jsonl",
        "managed_macs.jsonl",
        "managed_mobile_devices.jsonl",
        "assets.jsonl",
        "apple_intake_filtered.jsonl",
        "workflow_policy.json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_kb_limit")]
    pub kb_limit: i64,
    #[serde(default = "default_max_query_tokens")]
    pub max_query_tokens: usize,
    #[serde(default = "default_device_boost")]
    pub device_boost: f64,
    #[serde(default = "default_app_boost")]
    pub app_boost: f64,
    #[serde(default = "default_link_candidate_limit")]
    pub link_candidate_limit: i64,
    #[serde(default = "default_citation_limit")]
    pub citation_limit: usize,
    #[serde(default = "default_max_causes")]
    pub max_causes: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            kb_limit: default_kb_limit(),
            max_query_tokens: default_max_query_tokens(),
            device_boost: default_device_boost(),
            app_boost: default_app_boost(),
            link_candidate_limit: default_link_candidate_limit(),
            citation_limit: default_citation_limit(),
            max_causes: default_max_causes(),
        }
    }
}

fn default_kb_limit() -> i64 {
    5
}
fn default_max_query_tokens() -> usize {
    8
}
fn default_device_boost() -> f64 {
    0.35
}
fn default_app_boost() -> f64 {
    0.25
}
fn default_link_candidate_limit() -> i64 {
    20
}
fn default_citation_limit() -> usize {
    3
}
fn default_max_causes() -> usize {
    6
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

fn default_retention_days() -> i64 {
    30
}

impl Config {
    /// Default configuration for a database path and dataset root.
    pub fn for_paths(db_path: impl Into<PathBuf>, dataset_root: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            dataset: DatasetConfig {
                root: dataset_root.into(),
                well_known_files: default_well_known_files(),
                exclude_globs: Vec::new(),
                follow_symlinks: false,
                policy_file: None,
            },
            retrieval: RetrievalConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let r = &config.retrieval;
    if r.kb_limit < 1 {
        anyhow::bail!("retrieval.kb_limit must be >= 1");
    }
    if r.max_query_tokens == 0 {
        anyhow::bail!("retrieval.max_query_tokens must be > 0");
    }
    if r.link_candidate_limit < 1 {
        anyhow::bail!("retrieval.link_candidate_limit must be >= 1");
    }
    if r.device_boost < 0.0 || r.app_boost < 0.0 {
        anyhow::bail!("retrieval boosts must be non-negative");
    }
    if config.diagnostics.retention_days < 1 {
        anyhow::bail!("diagnostics.retention_days must be >= 1");
    }
    Ok(())
}
