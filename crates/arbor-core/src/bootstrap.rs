//! Construction of the provider, encoder and graph store from [`Config`].

use std::sync::Arc;

use anyhow::{Context, bail};
use arbor_index::{AnyEncoder, GraphStore, HashedEncoder, ProviderEncoder, RetrievalConfig};
use arbor_llm::{AnyProvider, OpenAiProvider, RateLimiter};

use crate::config::{Config, EmbeddingBackend, ProviderKind};

/// Build the provider selected by `[llm] provider`.
///
/// Each call creates its own [`RateLimiter`], shared by every clone of the
/// returned provider.
///
/// # Errors
///
/// Returns an error if `openai` is selected without `ARBOR_API_KEY`, or if
/// `mock` is selected in a build without the `mock` feature.
pub fn create_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    let llm = &config.llm;
    match llm.provider {
        ProviderKind::OpenAi | ProviderKind::Compatible => {
            let api_key = match (&config.secrets.api_key, llm.provider) {
                (Some(key), _) => key.expose().to_owned(),
                (None, ProviderKind::OpenAi) => {
                    bail!("ARBOR_API_KEY must be set for the openai provider")
                }
                (None, _) => String::new(),
            };
            let limiter = Arc::new(RateLimiter::new(llm.rate_limit));
            let provider = OpenAiProvider::new(
                api_key,
                llm.base_url.clone(),
                llm.model.clone(),
                llm.embedding_model.clone(),
            )
            .with_client(arbor_llm::http::client_with_timeout(llm.timeout_secs))
            .with_name(llm.provider.as_str())
            .with_max_retries(llm.max_retries)
            .with_rate_limiter(limiter);
            tracing::debug!(provider = %llm.provider, model = %llm.model, "created provider");
            Ok(AnyProvider::OpenAi(provider))
        }
        #[cfg(feature = "mock")]
        ProviderKind::Mock => Ok(AnyProvider::Mock(
            arbor_llm::MockProvider::echoing().with_embedding(vec![1.0; 8]),
        )),
        #[cfg(not(feature = "mock"))]
        ProviderKind::Mock => bail!("the mock provider requires building with the `mock` feature"),
    }
}

/// Build the encoder selected by `[embedding] backend`.
///
/// # Errors
///
/// Returns an error if the provider backend is selected but `provider` cannot embed.
pub fn create_encoder(config: &Config, provider: &AnyProvider) -> anyhow::Result<AnyEncoder> {
    use arbor_llm::LlmProvider as _;

    match config.embedding.backend {
        EmbeddingBackend::Hashed => Ok(AnyEncoder::Hashed(HashedEncoder::new(config.embedding.dim))),
        EmbeddingBackend::Provider => {
            if !provider.supports_embeddings() {
                bail!("provider {} has no embedding model configured", provider.name());
            }
            Ok(AnyEncoder::Provider(ProviderEncoder::new(
                provider.clone(),
                config.embedding.segment_words,
            )))
        }
    }
}

/// Open (and migrate) the graph store at `[index] sqlite_path`.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrated.
pub async fn open_store(config: &Config) -> anyhow::Result<GraphStore> {
    GraphStore::new(&config.index.sqlite_path)
        .await
        .with_context(|| format!("failed to open graph store at {}", config.index.sqlite_path))
}

#[must_use]
pub fn retrieval_config(config: &Config) -> RetrievalConfig {
    RetrievalConfig {
        context_chars: config.index.context_chars,
    }
}
