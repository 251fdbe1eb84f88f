//! Hybrid re-ranking: vector score scaled by tree level plus an entity-overlap bonus.

use arbor_tree::Level;
use serde::Serialize;

use crate::embedding::{MultiVector, score_pair};
use crate::store::{GraphContext, StoredDocument};

/// Bonus per mentioned entity that matches a query term.
pub const ENTITY_BOOST: f32 = 0.1;

/// One re-ranked retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedHit {
    pub document_id: i64,
    pub level: &'static str,
    pub score: f32,
    pub text: String,
}

#[must_use]
pub fn level_boost(level: Level) -> f32 {
    match level {
        Level::Root => 1.3,
        Level::Branch => 1.2,
        Level::Leaf => 1.1,
        Level::Fact => 1.0,
    }
}

/// [`ENTITY_BOOST`] for each entity containing any whitespace-separated query
/// term, compared case-insensitively.
#[must_use]
pub fn entity_boost(query: &str, entities: &[String]) -> f32 {
    let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    let matches = entities
        .iter()
        .filter(|entity| {
            let entity = entity.to_lowercase();
            terms.iter().any(|term| entity.contains(term.as_str()))
        })
        .count();
    #[allow(clippy::cast_precision_loss)]
    let matches = matches as f32;
    ENTITY_BOOST * matches
}

/// Score every document whose level is allowed and keep the best `limit`
/// as `(position, score)`, highest first.
#[must_use]
pub fn vector_candidates(
    query: &MultiVector,
    documents: &[StoredDocument],
    embeddings: &[MultiVector],
    levels: Option<&[Level]>,
    limit: usize,
) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = documents
        .iter()
        .zip(embeddings)
        .enumerate()
        .filter(|(_, (doc, _))| levels.is_none_or(|allowed| allowed.contains(&doc.level)))
        .map(|(i, (_, emb))| (i, score_pair(query, emb)))
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

/// Document text, prefixed with a truncated parent excerpt for leaf and fact hits.
#[must_use]
pub fn enhanced_text(doc: &StoredDocument, parent: Option<&str>, context_chars: usize) -> String {
    match parent {
        Some(parent) if matches!(doc.level, Level::Leaf | Level::Fact) => {
            let excerpt: String = parent.chars().take(context_chars).collect();
            format!("CONTEXT: {excerpt}...\n\n{}", doc.text)
        }
        _ => doc.text.clone(),
    }
}

/// Apply level and entity boosts plus parent context to one candidate.
#[must_use]
pub fn enhance(
    query: &str,
    doc: &StoredDocument,
    vector_score: f32,
    context: &GraphContext,
    context_chars: usize,
) -> RankedHit {
    let score = vector_score * level_boost(doc.level) + entity_boost(query, &context.entities);
    RankedHit {
        document_id: doc.id,
        level: doc.level.as_str(),
        score,
        text: enhanced_text(doc, context.parent.as_deref(), context_chars),
    }
}

/// Sort by boosted score, highest first, and keep `k`.
pub fn finalize(hits: &mut Vec<RankedHit>, k: usize) {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(k);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEncoder;

    fn doc(id: i64, level: Level, text: &str) -> StoredDocument {
        StoredDocument {
            id,
            level,
            level_index: 0,
            text: text.to_owned(),
            tree_position: Vec::new(),
            confidence: 0.8,
        }
    }

    #[test]
    fn boosts_favor_abstraction() {
        assert!(level_boost(Level::Root) > level_boost(Level::Branch));
        assert!(level_boost(Level::Branch) > level_boost(Level::Leaf));
        assert!(level_boost(Level::Leaf) > level_boost(Level::Fact));
        assert!((level_boost(Level::Fact) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn entity_boost_counts_substring_matches() {
        let entities = vec!["Green Mosque".to_owned(), "Ahmad Hassan".to_owned(), "Haifa".to_owned()];
        let b = entity_boost("where did HASSAN meet at the mosque", &entities);
        assert!((b - 0.2).abs() < 1e-6, "{b}");
        assert!(entity_boost("nothing relevant", &[]).abs() < f32::EPSILON);
    }

    #[test]
    fn parent_context_only_for_low_levels() {
        let parent = "p".repeat(300);
        let leaf = enhanced_text(&doc(1, Level::Leaf, "leaf text"), Some(&parent), 200);
        assert!(leaf.starts_with(&format!("CONTEXT: {}...\n\n", "p".repeat(200))));
        assert!(leaf.ends_with("leaf text"));

        let branch = enhanced_text(&doc(2, Level::Branch, "branch text"), Some(&parent), 200);
        assert_eq!(branch, "branch text");

        let orphan = enhanced_text(&doc(3, Level::Fact, "fact text"), None, 200);
        assert_eq!(orphan, "fact text");
    }

    #[test]
    fn context_truncates_by_chars() {
        let parent = "שלום עולם ".repeat(40);
        let out = enhanced_text(&doc(1, Level::Fact, "x"), Some(&parent), 5);
        assert!(out.starts_with("CONTEXT: שלום ..."));
    }

    #[test]
    fn candidates_respect_level_filter_and_limit() {
        let enc = HashedEncoder::new(64);
        let docs = vec![
            doc(1, Level::Root, "border crossing summary"),
            doc(2, Level::Leaf, "border crossing at night"),
            doc(3, Level::Fact, "border crossing by Dana"),
            doc(4, Level::Fact, "unrelated budget item"),
        ];
        let embs: Vec<MultiVector> = docs.iter().map(|d| enc.encode_text(&d.text)).collect();
        let q = enc.encode_text("border crossing");

        let all = vector_candidates(&q, &docs, &embs, None, 10);
        assert_eq!(all.len(), 4);
        assert_eq!(all.last().unwrap().0, 3);

        let low = vector_candidates(&q, &docs, &embs, Some(&[Level::Leaf, Level::Fact]), 2);
        assert_eq!(low.len(), 2);
        assert!(low.iter().all(|(i, _)| docs[*i].level != Level::Root));
        assert!(low[0].1 >= low[1].1);
    }

    #[test]
    fn enhance_and_finalize() {
        let ctx = GraphContext {
            parent: Some("leaf abstract".into()),
            entities: vec!["Dana".into()],
            ..GraphContext::default()
        };
        let fact = enhance("dana", &doc(1, Level::Fact, "fact"), 1.0, &ctx, 200);
        assert!((fact.score - 1.1).abs() < 1e-6);
        assert!(fact.text.starts_with("CONTEXT: leaf abstract..."));

        let root = enhance("dana", &doc(2, Level::Root, "root"), 1.0, &GraphContext::default(), 200);
        assert!((root.score - 1.3).abs() < 1e-6);

        let mut hits = vec![fact, root];
        finalize(&mut hits, 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].level, "root");
    }
}
