use std::fmt;

use arbor_llm::RateLimitConfig;
use arbor_tree::TreeConfig;
use serde::{Deserialize, Serialize};

/// Wrapper for sensitive strings with redacted Debug/Display.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Values that are resolved from the environment only and never written to disk.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSecrets {
    pub api_key: Option<Secret>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    /// Any OpenAI-compatible endpoint; the API key is optional.
    Compatible,
    /// Offline scripted provider, available when built with the `mock` feature.
    Mock,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Compatible => "compatible",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_max_retries() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    arbor_llm::http::DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Required by the `provider` embedding backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

fn default_sqlite_path() -> String {
    "arbor.db".into()
}

fn default_k() -> usize {
    20
}

fn default_context_chars() -> usize {
    200
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Database file, or `:memory:` for a throwaway store.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default = "default_k")]
    pub default_k: usize,
    /// Characters of parent text prepended to leaf and fact hits.
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            default_k: default_k(),
            context_chars: default_context_chars(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Deterministic feature hashing, no network calls.
    #[default]
    Hashed,
    /// The configured provider's embeddings endpoint.
    Provider,
}

fn default_dim() -> usize {
    128
}

fn default_segment_words() -> usize {
    32
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,
    /// Vector width of the hashed backend.
    #[serde(default = "default_dim")]
    pub dim: usize,
    /// Words per embedded segment for the provider backend.
    #[serde(default = "default_segment_words")]
    pub segment_words: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            dim: default_dim(),
            segment_words: default_segment_words(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}
