//! End-to-end pipeline: facts in, digest tree built and indexed, queries answered.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use arbor_index::{
    AnyEncoder, GraphStore, HierarchicalIndex, IndexReport, QueryLevel, QueryRouter, Retrieval,
    TokenEncoder,
};
use arbor_llm::{AnyProvider, LlmProvider};
use arbor_tree::{DigestTree, Fact, Level, TreeBuilder, TreeConfig};

use crate::bootstrap;
use crate::config::Config;

/// Result of [`Pipeline::build`].
#[derive(Debug)]
pub struct BuildOutcome {
    pub tree: DigestTree,
    pub report: IndexReport,
    /// Documents encoded into the vector index.
    pub encoded: usize,
}

pub struct Pipeline<P, E> {
    builder: TreeBuilder<P>,
    index: HierarchicalIndex<P, E>,
    default_k: usize,
}

impl Pipeline<AnyProvider, AnyEncoder> {
    /// Assemble the pipeline described by `config`, reopening whatever tree the
    /// configured store already holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider, encoder or store cannot be created.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let provider = bootstrap::create_provider(config)?;
        let encoder = bootstrap::create_encoder(config, &provider)?;
        let store = bootstrap::open_store(config).await?;
        Self::open(provider, encoder, store, config).await
    }
}

impl<P, E> Pipeline<P, E>
where
    P: LlmProvider + Clone,
    E: TokenEncoder,
{
    /// Pipeline over an existing store, loading the documents it already holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored documents cannot be read.
    pub async fn open(provider: P, encoder: E, store: GraphStore, config: &Config) -> anyhow::Result<Self> {
        let index = HierarchicalIndex::open(
            store,
            QueryRouter::new(provider.clone()),
            encoder,
            bootstrap::retrieval_config(config),
        )
        .await
        .context("failed to load stored documents")?;
        Ok(Self {
            builder: TreeBuilder::new(provider, config.tree),
            index,
            default_k: config.index.default_k,
        })
    }

    #[must_use]
    pub fn index(&self) -> &HierarchicalIndex<P, E> {
        &self.index
    }

    #[must_use]
    pub fn tree_config(&self) -> &TreeConfig {
        self.builder.config()
    }

    #[must_use]
    pub fn default_k(&self) -> usize {
        self.default_k
    }

    /// Build the digest tree for `facts`, replace the indexed graph with it and
    /// encode the new documents.
    ///
    /// # Errors
    ///
    /// Returns an error if summarization, indexing or encoding fails. The
    /// previously indexed tree is kept when summarization fails.
    pub async fn build(&self, facts: Vec<Fact>) -> anyhow::Result<BuildOutcome> {
        let fact_count = facts.len();
        let tree = self
            .builder
            .build(facts)
            .await
            .context("failed to build digest tree")?;

        let report = self
            .index
            .index_tree(&tree)
            .await
            .context("failed to index digest tree")?;
        let encoded = self
            .index
            .build_vector_index()
            .await
            .context("failed to build vector index")?;

        tracing::info!(
            facts = fact_count,
            leaves = tree.leaves.len(),
            branches = tree.branches.len(),
            documents = report.documents,
            mentions = report.mentions,
            "digest tree indexed"
        );
        Ok(BuildOutcome {
            tree,
            report,
            encoded,
        })
    }

    /// Load facts from a JSON-lines file and [`build`](Self::build) them.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or any line is malformed,
    /// or if the build fails.
    pub async fn build_from_jsonl(&self, path: &Path) -> anyhow::Result<BuildOutcome> {
        let facts = arbor_tree::load_facts_jsonl(path)
            .with_context(|| format!("failed to load facts from {}", path.display()))?;
        tracing::info!(facts = facts.len(), path = %path.display(), "loaded facts");
        self.build(facts).await
    }

    /// Encode the documents of a reopened store so it can be queried.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub async fn prepare(&self) -> anyhow::Result<usize> {
        self.index
            .build_vector_index()
            .await
            .context("failed to build vector index")
    }

    /// Answer `query` with up to `k` hits, or `default_k` when `k` is `None`.
    pub async fn query(&self, query: &str, k: Option<usize>) -> Retrieval {
        self.index.search(query, k.unwrap_or(self.default_k)).await
    }

    /// # Errors
    ///
    /// Returns an error if the classifier call fails.
    pub async fn classify(&self, query: &str) -> anyhow::Result<QueryLevel> {
        self.index
            .classify(query)
            .await
            .context("failed to classify query")
    }

    /// Number of stored nodes per level.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn stats(&self) -> anyhow::Result<BTreeMap<Level, usize>> {
        self.index
            .store()
            .level_counts()
            .await
            .context("failed to count stored nodes")
    }
}
