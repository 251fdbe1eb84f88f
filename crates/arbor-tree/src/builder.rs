//! Map-reduce construction of the digest tree.

use std::collections::BTreeMap;

use arbor_llm::{GenerationParams, LlmError, LlmProvider, Message};
use futures::{StreamExt as _, TryStreamExt as _};
use serde::{Deserialize, Serialize};
use tracing::Instrument as _;

use crate::error::{Result, Stage, TreeError};
use crate::fact::Fact;
use crate::prompt;
use crate::slisum;
use crate::tree::{DigestNode, DigestTree, Level};

fn default_leaf_size() -> usize {
    10
}

fn default_branch_size() -> usize {
    10
}

fn default_slisum_min_facts() -> usize {
    5
}

fn default_window_size() -> usize {
    7
}

fn default_concurrency() -> usize {
    4
}

fn default_leaf_max_tokens() -> u32 {
    250
}

fn default_branch_max_tokens() -> u32 {
    500
}

fn default_root_max_tokens() -> u32 {
    900
}

fn default_temperature() -> f32 {
    0.1
}

/// Token limits and sampling temperature for each summarization step.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Applies to window abstracts and the consensus abstract as well.
    #[serde(default = "default_leaf_max_tokens")]
    pub leaf_max_tokens: u32,
    #[serde(default = "default_branch_max_tokens")]
    pub branch_max_tokens: u32,
    #[serde(default = "default_root_max_tokens")]
    pub root_max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            leaf_max_tokens: default_leaf_max_tokens(),
            branch_max_tokens: default_branch_max_tokens(),
            root_max_tokens: default_root_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TreeConfig {
    #[serde(default = "default_leaf_size")]
    pub leaf_size: usize,
    #[serde(default = "default_branch_size")]
    pub branch_size: usize,
    /// Chunks with fewer facts are summarized directly instead of through windows.
    #[serde(default = "default_slisum_min_facts")]
    pub slisum_min_facts: usize,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Chunk summaries in flight at once within one level.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            leaf_size: default_leaf_size(),
            branch_size: default_branch_size(),
            slisum_min_facts: default_slisum_min_facts(),
            window_size: default_window_size(),
            concurrency: default_concurrency(),
            generation: GenerationConfig::default(),
        }
    }
}

/// Builds a [`DigestTree`] by summarizing facts level by level.
///
/// Levels are strictly sequential. Chunks within a level are summarized
/// concurrently, bounded by [`TreeConfig::concurrency`], and results keep chunk
/// order. Summarizer failures are not retried here and abort the build.
pub struct TreeBuilder<P> {
    provider: P,
    config: TreeConfig,
}

impl<P: LlmProvider> TreeBuilder<P> {
    #[must_use]
    pub fn new(provider: P, config: TreeConfig) -> Self {
        Self { provider, config }
    }

    #[must_use]
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Build the complete tree for an ordered fact list.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Summarizer`] or [`TreeError::EmptySummary`] if any
    /// summarization call fails.
    pub async fn build(&self, facts: Vec<Fact>) -> Result<DigestTree> {
        let span = tracing::info_span!("build_tree", facts = facts.len());
        self.build_levels(facts).instrument(span).await
    }

    async fn build_levels(&self, facts: Vec<Fact>) -> Result<DigestTree> {
        if facts.is_empty() {
            tracing::info!("no facts to digest");
            return Ok(DigestTree::empty());
        }

        let (leaf_texts, leaf_fact_mapping) = self.leaf_level(&facts).await?;
        let fact_nodes: Vec<DigestNode> = facts
            .into_iter()
            .enumerate()
            .map(|(i, fact)| DigestNode::from_fact(i, fact))
            .collect();
        let leaves = into_nodes(Level::Leaf, leaf_texts.clone());

        if leaves.len() <= 1 {
            let root_text = leaf_texts.into_iter().next().unwrap_or_default();
            tracing::info!(
                facts = fact_nodes.len(),
                leaves = leaves.len(),
                "single leaf promoted to root"
            );
            return Ok(DigestTree {
                root: DigestNode::summary(Level::Root, 0, root_text),
                branches: Vec::new(),
                leaves,
                facts: fact_nodes,
                leaf_fact_mapping,
                branch_leaf_mapping: BTreeMap::new(),
            });
        }

        let (branch_texts, branch_leaf_mapping) = self.branch_level(&leaf_texts).await?;

        let root_text = if branch_texts.len() <= 1 {
            tracing::info!("single branch promoted to root");
            branch_texts.first().cloned().unwrap_or_default()
        } else {
            self.summarize(
                Stage::Root,
                prompt::root_prompt(&branch_texts),
                self.config.generation.root_max_tokens,
            )
            .await?
        };

        let tree = DigestTree {
            root: DigestNode::summary(Level::Root, 0, root_text),
            branches: into_nodes(Level::Branch, branch_texts),
            leaves,
            facts: fact_nodes,
            leaf_fact_mapping,
            branch_leaf_mapping,
        };
        tracing::info!(
            facts = tree.facts.len(),
            leaves = tree.leaves.len(),
            branches = tree.branches.len(),
            "digest tree built"
        );
        Ok(tree)
    }

    async fn leaf_level(&self, facts: &[Fact]) -> Result<(Vec<String>, BTreeMap<usize, Vec<usize>>)> {
        let leaf_size = self.config.leaf_size.max(1);
        let mapping = chunk_mapping(facts.len(), leaf_size);

        let texts = futures::stream::iter(facts.chunks(leaf_size).enumerate())
            .map(|(i, chunk)| {
                self.leaf_abstract(chunk)
                    .instrument(tracing::debug_span!("leaf", index = i, facts = chunk.len()))
            })
            .buffered(self.config.concurrency.max(1))
            .try_collect::<Vec<_>>()
            .await?;

        Ok((texts, mapping))
    }

    async fn branch_level(
        &self,
        leaf_texts: &[String],
    ) -> Result<(Vec<String>, BTreeMap<usize, Vec<usize>>)> {
        let branch_size = self.config.branch_size.max(1);
        let mapping = chunk_mapping(leaf_texts.len(), branch_size);
        let max_tokens = self.config.generation.branch_max_tokens;

        let texts = futures::stream::iter(leaf_texts.chunks(branch_size))
            .map(|chunk| self.summarize(Stage::Branch, prompt::branch_prompt(chunk), max_tokens))
            .buffered(self.config.concurrency.max(1))
            .try_collect::<Vec<_>>()
            .await?;

        Ok((texts, mapping))
    }

    /// Abstract for one leaf chunk, through window consensus when the chunk is large enough.
    async fn leaf_abstract(&self, facts: &[Fact]) -> Result<String> {
        let max_tokens = self.config.generation.leaf_max_tokens;
        if facts.len() < self.config.slisum_min_facts {
            return self
                .summarize(Stage::Leaf, prompt::leaf_prompt(facts), max_tokens)
                .await;
        }

        let windows = slisum::windows(facts.len(), self.config.window_size);
        let mut window_abstracts = Vec::with_capacity(windows.len());
        for range in windows {
            let text = self
                .summarize(Stage::Leaf, prompt::leaf_prompt(&facts[range]), max_tokens)
                .await?;
            window_abstracts.push(text);
        }

        match window_abstracts.len() {
            0 => {
                self.summarize(Stage::Leaf, prompt::leaf_prompt(facts), max_tokens)
                    .await
            }
            1 => Ok(window_abstracts.swap_remove(0)),
            n => {
                tracing::debug!(windows = n, "reconciling window abstracts");
                self.summarize(
                    Stage::Consensus,
                    prompt::consensus_prompt(&window_abstracts),
                    max_tokens,
                )
                .await
            }
        }
    }

    async fn summarize(&self, stage: Stage, prompt: String, max_tokens: u32) -> Result<String> {
        let params = GenerationParams::new(max_tokens, self.config.generation.temperature);
        let text = self
            .provider
            .chat(&[Message::user(prompt)], params)
            .await
            .map_err(|source| match source {
                LlmError::EmptyResponse { .. } => TreeError::EmptySummary { stage },
                source => TreeError::Summarizer { stage, source },
            })?;

        let text = text.trim();
        if text.is_empty() {
            return Err(TreeError::EmptySummary { stage });
        }
        Ok(text.to_owned())
    }
}

fn into_nodes(level: Level, texts: Vec<String>) -> Vec<DigestNode> {
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| DigestNode::summary(level, i, text))
        .collect()
}

/// Contiguous `chunk`-sized groups of `0..len`, keyed by group index.
fn chunk_mapping(len: usize, chunk: usize) -> BTreeMap<usize, Vec<usize>> {
    (0..len)
        .step_by(chunk)
        .enumerate()
        .map(|(i, start)| (i, (start..(start + chunk).min(len)).collect()))
        .collect()
}
