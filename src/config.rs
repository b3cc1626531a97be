use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use suggestion_gate_core::gate::GateThresholds;
use suggestion_gate_core::retrieve::{RetrievalParams, RECENCY_BOOST_CAP};
use suggestion_gate_core::score::{PriorSmoothing, ScoreWeights};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
        }
    }
}

fn default_max_tokens() -> usize {
    300
}
fn default_overlap() -> usize {
    40
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_context_top_k")]
    pub context_top_k: i64,
    #[serde(default = "default_recency_boost")]
    pub recency_boost: f64,
    #[serde(default = "default_recency_window")]
    pub recency_window: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            context_top_k: default_context_top_k(),
            recency_boost: default_recency_boost(),
            recency_window: default_recency_window(),
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            top_k: self.context_top_k,
            recency_boost: self.recency_boost,
            recency_window: self.recency_window,
        }
    }
}

fn default_context_top_k() -> i64 {
    8
}
fn default_recency_boost() -> f64 {
    1.15
}
fn default_recency_window() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default = "default_w_signal")]
    pub w_signal: f64,
    #[serde(default = "default_w_relevance")]
    pub w_relevance: f64,
    #[serde(default = "default_w_prior")]
    pub w_prior: f64,
    #[serde(default = "default_prior_alpha")]
    pub prior_alpha: f64,
    #[serde(default = "default_prior_beta")]
    pub prior_beta: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            w_signal: default_w_signal(),
            w_relevance: default_w_relevance(),
            w_prior: default_w_prior(),
            prior_alpha: default_prior_alpha(),
            prior_beta: default_prior_beta(),
        }
    }
}

impl ScoringConfig {
    pub fn weights(&self) -> ScoreWeights {
        ScoreWeights {
            signal: self.w_signal,
            relevance: self.w_relevance,
            prior: self.w_prior,
        }
    }

    pub fn smoothing(&self) -> PriorSmoothing {
        PriorSmoothing {
            alpha: self.prior_alpha,
            beta: self.prior_beta,
        }
    }
}

fn default_w_signal() -> f64 {
    0.5
}
fn default_w_relevance() -> f64 {
    0.3
}
fn default_w_prior() -> f64 {
    0.2
}
fn default_prior_alpha() -> f64 {
    1.0
}
fn default_prior_beta() -> f64 {
    1.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct GateConfig {
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f64,
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout_seconds: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            high_threshold: default_high_threshold(),
            low_threshold: default_low_threshold(),
            approval_timeout_seconds: default_approval_timeout(),
        }
    }
}

impl GateConfig {
    pub fn thresholds(&self) -> GateThresholds {
        GateThresholds {
            high: self.high_threshold,
            low: self.low_threshold,
        }
    }
}

fn default_high_threshold() -> f64 {
    0.85
}
fn default_low_threshold() -> f64 {
    0.4
}
fn default_approval_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// `disabled`, `openai`, or `ollama`.
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_prompt_tokens")]
    pub max_prompt_tokens: usize,
    #[serde(default = "default_completion_tokens")]
    pub max_completion_tokens: u32,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            model: None,
            url: None,
            max_prompt_tokens: default_max_prompt_tokens(),
            max_completion_tokens: default_completion_tokens(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

impl ProviderConfig {
    pub fn is_enabled(&self) -> bool {
        self.kind != "disabled"
    }
}

fn default_kind() -> String {
    "disabled".to_string()
}
fn default_max_prompt_tokens() -> usize {
    2048
}
fn default_completion_tokens() -> u32 {
    512
}
fn default_provider_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `disabled`, `openai`, or `ollama`.
    #[serde(default = "default_kind")]
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
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_kind(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            history_cap: default_history_cap(),
        }
    }
}

fn default_retention_days() -> i64 {
    14
}
fn default_history_cap() -> usize {
    200
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
    "127.0.0.1:7343".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IndexingConfig {
    /// Root directory for `sgate index`.
    pub root: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.rs".to_string(),
        "**/*.py".to_string(),
        "**/*.ts".to_string(),
        "**/*.js".to_string(),
        "**/*.go".to_string(),
    ]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    // Validate retrieval
    if config.retrieval.context_top_k < 1 {
        anyhow::bail!("retrieval.context_top_k must be >= 1");
    }
    if !(1.0..=RECENCY_BOOST_CAP).contains(&config.retrieval.recency_boost) {
        anyhow::bail!(
            "retrieval.recency_boost must be in [1.0, {}]",
            RECENCY_BOOST_CAP
        );
    }

    // Validate scoring
    if !config.scoring.weights().is_valid() {
        anyhow::bail!("scoring weights must be non-negative and sum to 1.0");
    }
    if config.scoring.prior_alpha <= 0.0 || config.scoring.prior_beta <= 0.0 {
        anyhow::bail!("scoring.prior_alpha and scoring.prior_beta must be > 0");
    }

    // Validate gate
    if !config.gate.thresholds().is_valid() {
        anyhow::bail!("gate thresholds must satisfy 0.0 <= low_threshold <= high_threshold <= 1.0");
    }
    if config.gate.approval_timeout_seconds == 0 {
        anyhow::bail!("gate.approval_timeout_seconds must be > 0");
    }

    // Validate completion provider
    match config.provider.kind.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown completion provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.provider.is_enabled() {
        if config.provider.model.is_none() {
            anyhow::bail!(
                "provider.model must be specified when kind is '{}'",
                config.provider.kind
            );
        }
        if config.provider.max_prompt_tokens == 0 {
            anyhow::bail!("provider.max_prompt_tokens must be > 0");
        }
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    // Validate session retention
    if config.session.retention_days < 1 {
        anyhow::bail!("session.retention_days must be >= 1");
    }
    if config.session.history_cap == 0 {
        anyhow::bail!("session.history_cap must be > 0");
    }

    Ok(config)
}
