//! Multi-vector (one vector per token) document encoding and late-interaction scoring.

use std::future::Future;

use arbor_llm::{AnyProvider, LlmProvider};

use crate::error::{IndexError, Result};

/// Token-level embedding of one text: a `tokens x dim` matrix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiVector {
    tokens: Vec<Vec<f32>>,
}

impl MultiVector {
    #[must_use]
    pub fn new(tokens: Vec<Vec<f32>>) -> Self {
        Self { tokens }
    }

    #[must_use]
    pub fn tokens(&self) -> &[Vec<f32>] {
        &self.tokens
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn flatten(&self) -> impl Iterator<Item = f32> + '_ {
        self.tokens.iter().flatten().copied()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v {
            *x /= norm;
        }
    }
}

/// Sum over query tokens of the best dot product against any document token.
///
/// # Errors
///
/// Fails when either side has no tokens, when token dimensions disagree, or when
/// the score is not finite.
pub fn late_interaction(query: &MultiVector, doc: &MultiVector) -> Result<f32> {
    if query.is_empty() || doc.is_empty() {
        return Err(IndexError::Embedding("empty multi-vector".into()));
    }
    let dim = query.tokens[0].len();
    if query
        .tokens
        .iter()
        .chain(&doc.tokens)
        .any(|t| t.len() != dim)
    {
        return Err(IndexError::Embedding(format!(
            "token dimension mismatch (expected {dim})"
        )));
    }

    let score: f32 = query
        .tokens
        .iter()
        .map(|q| {
            doc.tokens
                .iter()
                .map(|d| dot(q, d))
                .fold(f32::NEG_INFINITY, f32::max)
        })
        .sum();

    if score.is_finite() {
        Ok(score)
    } else {
        Err(IndexError::Embedding("non-finite late-interaction score".into()))
    }
}

/// Cosine similarity between the two matrices flattened into single vectors.
///
/// # Errors
///
/// Fails when the flattened lengths differ or either vector has zero norm.
pub fn flat_cosine(query: &MultiVector, doc: &MultiVector) -> Result<f32> {
    let q: Vec<f32> = query.flatten().collect();
    let d: Vec<f32> = doc.flatten().collect();
    if q.len() != d.len() || q.is_empty() {
        return Err(IndexError::Embedding(format!(
            "cannot compare flattened lengths {} and {}",
            q.len(),
            d.len()
        )));
    }
    let norm_q = dot(&q, &q).sqrt();
    let norm_d = dot(&d, &d).sqrt();
    if norm_q == 0.0 || norm_d == 0.0 {
        return Err(IndexError::Embedding("zero-norm vector".into()));
    }
    Ok(dot(&q, &d) / (norm_q * norm_d))
}

/// Late-interaction score, falling back to flattened cosine and then to `0.0`.
///
/// The cosine fallback is on a different scale than late interaction; both end
/// up in the same ranking.
#[must_use]
pub fn score_pair(query: &MultiVector, doc: &MultiVector) -> f32 {
    match late_interaction(query, doc) {
        Ok(score) => score,
        Err(e) => {
            tracing::warn!("late-interaction scoring failed ({e}), using cosine fallback");
            flat_cosine(query, doc).unwrap_or(0.0)
        }
    }
}

/// Encodes texts into multi-vectors. Queries and documents may be encoded differently.
pub trait TokenEncoder: Send + Sync {
    /// Encode every text, returning one multi-vector per input in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying model call fails.
    fn encode(
        &self,
        texts: &[String],
        is_query: bool,
    ) -> impl Future<Output = Result<Vec<MultiVector>>> + Send;
}

/// Offline encoder: one feature-hashed vector per word token.
///
/// Each token contributes its whole form and its character trigrams to signed
/// buckets chosen by blake3, so near-identical spellings still overlap.
#[derive(Debug, Clone, Copy)]
pub struct HashedEncoder {
    dim: usize,
}

impl HashedEncoder {
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[must_use]
    pub fn encode_text(&self, text: &str) -> MultiVector {
        MultiVector::new(tokenize(text).iter().map(|t| self.token_vector(t)).collect())
    }

    fn token_vector(&self, token: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.dim];
        self.add_feature(&mut v, &format!("w:{token}"), 1.0);

        let chars: Vec<char> = format!("<{token}>").chars().collect();
        for gram in chars.windows(3) {
            let gram: String = gram.iter().collect();
            self.add_feature(&mut v, &format!("g:{gram}"), 0.5);
        }

        normalize(&mut v);
        v
    }

    fn add_feature(&self, v: &mut [f32], feature: &str, weight: f32) {
        let hash = blake3::hash(feature.as_bytes());
        let bytes = hash.as_bytes();
        let mut head = [0u8; 8];
        head.copy_from_slice(&bytes[..8]);
        let bucket = u64::from_le_bytes(head) % self.dim as u64;
        let bucket = usize::try_from(bucket).unwrap_or(0);
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

impl Default for HashedEncoder {
    fn default() -> Self {
        Self::new(128)
    }
}

impl TokenEncoder for HashedEncoder {
    async fn encode(&self, texts: &[String], _is_query: bool) -> Result<Vec<MultiVector>> {
        Ok(texts.iter().map(|t| self.encode_text(t)).collect())
    }
}

/// Lowercased alphanumeric word tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Encoder backed by a provider's dense embedding endpoint: each run of
/// `segment_words` words becomes one token vector.
#[derive(Debug, Clone)]
pub struct ProviderEncoder<P> {
    provider: P,
    segment_words: usize,
}

impl<P: LlmProvider> ProviderEncoder<P> {
    #[must_use]
    pub fn new(provider: P, segment_words: usize) -> Self {
        Self {
            provider,
            segment_words: segment_words.max(1),
        }
    }
}

impl<P: LlmProvider> TokenEncoder for ProviderEncoder<P> {
    async fn encode(&self, texts: &[String], _is_query: bool) -> Result<Vec<MultiVector>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let words: Vec<&str> = text.split_whitespace().collect();
            let mut tokens = Vec::with_capacity(words.len().div_ceil(self.segment_words));
            for segment in words.chunks(self.segment_words) {
                let mut v = self.provider.embed(&segment.join(" ")).await?;
                normalize(&mut v);
                tokens.push(v);
            }
            out.push(MultiVector::new(tokens));
        }
        Ok(out)
    }
}

/// Encoder selected from configuration.
#[derive(Debug, Clone)]
pub enum AnyEncoder {
    Hashed(HashedEncoder),
    Provider(ProviderEncoder<AnyProvider>),
}

impl TokenEncoder for AnyEncoder {
    async fn encode(&self, texts: &[String], is_query: bool) -> Result<Vec<MultiVector>> {
        match self {
            Self::Hashed(e) => e.encode(texts, is_query).await,
            Self::Provider(e) => e.encode(texts, is_query).await,
        }
    }
}
