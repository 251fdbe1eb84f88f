//! Facade tying the graph store, encoder and router into the retrieval index.

use arbor_llm::LlmProvider;
use arbor_tree::DigestTree;
use tokio::sync::RwLock;
use tracing::Instrument as _;

use crate::embedding::{MultiVector, TokenEncoder};
use crate::error::{IndexError, Result};
use crate::ranker::{self, RankedHit};
use crate::router::{QueryLevel, QueryRouter};
use crate::store::{GraphStore, IndexReport, StoredDocument};

/// Retrieval configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalConfig {
    /// Characters of parent text prepended to leaf and fact hits.
    pub context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { context_chars: 200 }
    }
}

/// Outcome of [`HierarchicalIndex::search`].
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    pub level: Option<QueryLevel>,
    pub hits: Vec<RankedHit>,
}

/// In-memory snapshot of the stored documents and their embeddings, aligned by position.
#[derive(Debug, Default)]
struct IndexState {
    documents: Vec<StoredDocument>,
    embeddings: Vec<MultiVector>,
}

/// Hierarchical retrieval index over one digest tree.
///
/// Writers (`reset`, `index_tree`, `build_vector_index`) hold the state write
/// lock for their whole run, so `retrieve` never sees a half-built index.
pub struct HierarchicalIndex<P, E> {
    store: GraphStore,
    router: QueryRouter<P>,
    encoder: E,
    config: RetrievalConfig,
    state: RwLock<IndexState>,
}

impl<P: LlmProvider, E: TokenEncoder> HierarchicalIndex<P, E> {
    #[must_use]
    pub fn new(store: GraphStore, router: QueryRouter<P>, encoder: E, config: RetrievalConfig) -> Self {
        Self {
            store,
            router,
            encoder,
            config,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Create an index over a store that already holds a tree, loading its documents.
    ///
    /// The vector index is not built; call [`Self::build_vector_index`] before querying.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored documents cannot be read.
    pub async fn open(
        store: GraphStore,
        router: QueryRouter<P>,
        encoder: E,
        config: RetrievalConfig,
    ) -> Result<Self> {
        let documents = store.documents().await?;
        tracing::debug!(documents = documents.len(), "loaded stored documents");
        let index = Self::new(store, router, encoder, config);
        index.state.write().await.documents = documents;
        Ok(index)
    }

    #[must_use]
    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Drop the persisted graph and the in-memory vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be cleared.
    pub async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        self.store.reset().await?;
        *state = IndexState::default();
        Ok(())
    }

    /// Persist `tree`, replacing whatever was indexed before.
    ///
    /// Embeddings from the previous tree are discarded. If the new graph is
    /// committed but cannot be read back, the in-memory state is left empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree is inconsistent or any store write fails.
    pub async fn index_tree(&self, tree: &DigestTree) -> Result<IndexReport> {
        let mut state = self.state.write().await;
        let report = self.store.index_tree(tree).await?;
        *state = IndexState::default();
        state.documents = self.store.documents().await?;
        Ok(report)
    }

    /// Encode every stored document, in storage order. Returns the number encoded.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder fails or returns the wrong number of vectors.
    pub async fn build_vector_index(&self) -> Result<usize> {
        let mut state = self.state.write().await;
        if state.documents.is_empty() {
            tracing::warn!("no documents to encode, vector index left empty");
            state.embeddings.clear();
            return Ok(0);
        }

        let texts: Vec<String> = state.documents.iter().map(|d| d.text.clone()).collect();
        let embeddings = self.encoder.encode(&texts, false).await?;
        if embeddings.len() != texts.len() {
            return Err(IndexError::Embedding(format!(
                "encoder returned {} vectors for {} documents",
                embeddings.len(),
                texts.len()
            )));
        }

        state.embeddings = embeddings;
        tracing::info!(documents = texts.len(), "built vector index");
        Ok(texts.len())
    }

    /// Number of documents currently loaded and encoded.
    pub async fn sizes(&self) -> (usize, usize) {
        let state = self.state.read().await;
        (state.documents.len(), state.embeddings.len())
    }

    /// Classify the abstraction level of `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the classifier call fails.
    pub async fn classify(&self, query: &str) -> Result<QueryLevel> {
        self.router.classify(query).await
    }

    /// Retrieve up to `k` texts for `query`.
    ///
    /// Never fails: if classification, vector search or graph enrichment
    /// fails, the first `k` documents in storage order are returned instead,
    /// and an empty list if even those cannot be read.
    pub async fn retrieve(&self, query: &str, k: usize) -> Vec<String> {
        self.retrieve_hits(query, k)
            .await
            .into_iter()
            .map(|hit| hit.text)
            .collect()
    }

    /// Like [`Self::retrieve`] but keeps score and level. Fallback hits carry a
    /// score of `0.0`.
    pub async fn retrieve_hits(&self, query: &str, k: usize) -> Vec<RankedHit> {
        self.search(query, k).await.hits
    }

    /// Retrieve up to `k` hits together with the level the query was routed to.
    ///
    /// `level` is `None` when classification failed and the fallback ran.
    pub async fn search(&self, query: &str, k: usize) -> Retrieval {
        if k == 0 {
            return Retrieval::default();
        }
        let span = tracing::info_span!("retrieve", k);
        async {
            let state = self.state.read().await;
            let level = match self.router.classify(query).await {
                Ok(level) => level,
                Err(e) => {
                    tracing::warn!("query classification failed ({e}), falling back to storage order");
                    return Retrieval {
                        level: None,
                        hits: self.fallback(k, &state).await,
                    };
                }
            };
            tracing::info!(%level, "routing query");

            let hits = match self.rank(query, level, k, &state).await {
                Ok(hits) => {
                    tracing::info!(results = hits.len(), "retrieved documents");
                    hits
                }
                Err(e) => {
                    tracing::warn!("hierarchical retrieval failed ({e}), falling back to storage order");
                    self.fallback(k, &state).await
                }
            };
            Retrieval {
                level: Some(level),
                hits,
            }
        }
        .instrument(span)
        .await
    }

    async fn rank(
        &self,
        query: &str,
        level: QueryLevel,
        k: usize,
        state: &IndexState,
    ) -> Result<Vec<RankedHit>> {
        if state.embeddings.is_empty() {
            tracing::warn!("vector index is empty, nothing to rank");
            return Ok(Vec::new());
        }

        let query_vec = self
            .encoder
            .encode(&[query.to_owned()], true)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::Embedding("encoder returned no query vector".into()))?;

        let candidates = ranker::vector_candidates(
            &query_vec,
            &state.documents,
            &state.embeddings,
            level.levels(),
            k.saturating_mul(level.candidate_factor()),
        );

        let mut hits = Vec::with_capacity(candidates.len());
        for (position, score) in candidates {
            let doc = &state.documents[position];
            let context = self.store.context(doc.id).await?;
            hits.push(ranker::enhance(
                query,
                doc,
                score,
                &context,
                self.config.context_chars,
            ));
        }

        ranker::finalize(&mut hits, k);
        Ok(hits)
    }

    async fn fallback(&self, k: usize, state: &IndexState) -> Vec<RankedHit> {
        let to_hits = |docs: &[StoredDocument]| -> Vec<RankedHit> {
            docs.iter()
                .take(k)
                .map(|d| RankedHit {
                    document_id: d.id,
                    level: d.level.as_str(),
                    score: 0.0,
                    text: d.text.clone(),
                })
                .collect()
        };

        if !state.documents.is_empty() {
            return to_hits(&state.documents);
        }
        match self.store.documents().await {
            Ok(docs) => to_hits(&docs),
            Err(e) => {
                tracing::warn!("fallback retrieval failed ({e}), returning no results");
                Vec::new()
            }
        }
    }
}
