use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18990;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Vector length for session embeddings.
pub const EMBED_DIM: usize = 384;

/// Top-level config (prepwire.toml + PREPWIRE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PrepwireConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub interview: InterviewConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub rag: RagConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Language-model provider settings. A missing `api_key` is not an
/// error — the health beacon reports `configured: false` and every
/// chat call fails fast with a typed error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_retries")]
    pub retries: u32,
    #[serde(default = "default_llm_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_llm_base_url(),
            model: default_model(),
            timeout_secs: default_llm_timeout_secs(),
            retries: default_llm_retries(),
            backoff_ms: default_llm_backoff_ms(),
            max_tokens: default_llm_max_tokens(),
        }
    }
}

/// Remote sentence-embedding endpoint. When `base_url` is unset the
/// deterministic hash fallback is used (and flagged in logs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    pub base_url: Option<String>,
    #[serde(default = "default_embed_model")]
    pub model: String,
    /// Force the hash fallback even when an endpoint is configured.
    #[serde(default)]
    pub fallback: bool,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: default_embed_model(),
            fallback: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewConfig {
    #[serde(default = "default_max_questions")]
    pub max_questions: u32,
    #[serde(default = "default_max_followups")]
    pub max_followups_per_question: u32,
    #[serde(default = "default_behavioral_target")]
    pub default_behavioral_target: u32,
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,
    /// Accepted student turns per session per minute.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
    /// Wall-clock budget for one student turn end to end.
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            max_questions: default_max_questions(),
            max_followups_per_question: default_max_followups(),
            default_behavioral_target: default_behavioral_target(),
            ema_alpha: default_ema_alpha(),
            rate_limit_per_minute: default_rate_limit(),
            turn_timeout_secs: default_turn_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_message_max_chars")]
    pub message_max_chars: usize,
    #[serde(default = "default_reply_max_chars")]
    pub reply_max_chars: usize,
    /// How many recent messages feed prompt assembly.
    #[serde(default = "default_recent_messages")]
    pub recent_messages: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            message_max_chars: default_message_max_chars(),
            reply_max_chars: default_reply_max_chars(),
            recent_messages: default_recent_messages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Readiness gate: similar completed sessions required before any
    /// retrieval context is injected.
    #[serde(default = "default_min_neighbors")]
    pub min_neighbors: usize,
    #[serde(default = "default_min_examples")]
    pub min_examples: usize,
    #[serde(default = "default_similarity_floor")]
    pub similarity_floor: f64,
    #[serde(default = "default_max_neighbors")]
    pub max_neighbors: usize,
    #[serde(default = "default_max_examples")]
    pub max_examples: usize,
    /// Minimum quick-rubric mean for a student turn to become a
    /// response example.
    #[serde(default = "default_example_quality_floor")]
    pub example_quality_floor: f64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            min_neighbors: default_min_neighbors(),
            min_examples: default_min_examples(),
            similarity_floor: default_similarity_floor(),
            max_neighbors: default_max_neighbors(),
            max_examples: default_max_examples(),
            example_quality_floor: default_example_quality_floor(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.prepwire/prepwire.db", home)
}
fn default_llm_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    45
}
fn default_llm_retries() -> u32 {
    2
}
fn default_llm_backoff_ms() -> u64 {
    800
}
fn default_llm_max_tokens() -> u32 {
    1024
}
fn default_embed_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}
fn default_max_questions() -> u32 {
    7
}
fn default_max_followups() -> u32 {
    2
}
fn default_behavioral_target() -> u32 {
    2
}
fn default_ema_alpha() -> f64 {
    0.35
}
fn default_rate_limit() -> u32 {
    60
}
fn default_turn_timeout_secs() -> u64 {
    120
}
fn default_message_max_chars() -> usize {
    50_000
}
fn default_reply_max_chars() -> usize {
    800
}
fn default_recent_messages() -> usize {
    30
}
fn default_min_neighbors() -> usize {
    3
}
fn default_min_examples() -> usize {
    1
}
fn default_similarity_floor() -> f64 {
    0.5
}
fn default_max_neighbors() -> usize {
    3
}
fn default_max_examples() -> usize {
    2
}
fn default_example_quality_floor() -> f64 {
    7.0
}

impl PrepwireConfig {
    /// Load config from a TOML file with PREPWIRE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.prepwire/prepwire.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: PrepwireConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PREPWIRE_").split("_"))
            .extract()
            .map_err(|e| crate::error::PrepwireError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.prepwire/prepwire.toml", home)
}
