//! The four-level digest tree and its index mappings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TreeError};
use crate::fact::Fact;

/// Confidence assigned to every node below the root.
pub const DEFAULT_CONFIDENCE: f32 = 0.8;
pub const ROOT_CONFIDENCE: f32 = 1.0;

/// Root text for a tree built from no facts.
pub const EMPTY_ROOT_TEXT: &str = "No facts available for digestion.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Fact,
    Leaf,
    Branch,
    Root,
}

impl Level {
    /// Levels in indexing order, most abstract first.
    pub const TOP_DOWN: [Level; 4] = [Level::Root, Level::Branch, Level::Leaf, Level::Fact];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Leaf => "leaf",
            Self::Branch => "branch",
            Self::Root => "root",
        }
    }

    /// The level this one is summarized into, if any.
    #[must_use]
    pub fn parent(self) -> Option<Level> {
        match self {
            Self::Fact => Some(Self::Leaf),
            Self::Leaf => Some(Self::Branch),
            Self::Branch => Some(Self::Root),
            Self::Root => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fact" => Ok(Self::Fact),
            "leaf" => Ok(Self::Leaf),
            "branch" => Ok(Self::Branch),
            "root" => Ok(Self::Root),
            other => Err(format!("unknown level: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestNode {
    pub level: Level,
    pub level_index: usize,
    pub text: String,
    pub confidence: f32,
    pub created: DateTime<Utc>,
    /// Source record, present only on fact nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact: Option<Fact>,
}

impl DigestNode {
    #[must_use]
    pub fn summary(level: Level, level_index: usize, text: String) -> Self {
        let confidence = if level == Level::Root {
            ROOT_CONFIDENCE
        } else {
            DEFAULT_CONFIDENCE
        };
        Self {
            level,
            level_index,
            text,
            confidence,
            created: Utc::now(),
            fact: None,
        }
    }

    #[must_use]
    pub fn from_fact(level_index: usize, fact: Fact) -> Self {
        Self {
            level: Level::Fact,
            level_index,
            text: fact.retrieval_text(),
            confidence: DEFAULT_CONFIDENCE,
            created: Utc::now(),
            fact: Some(fact),
        }
    }
}

/// Complete digest: one root, the branch, leaf and fact levels, and the
/// contiguous chunk mappings between them.
///
/// Every branch is implicitly summarized by the root, so no root mapping is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestTree {
    pub root: DigestNode,
    pub branches: Vec<DigestNode>,
    pub leaves: Vec<DigestNode>,
    pub facts: Vec<DigestNode>,
    pub leaf_fact_mapping: BTreeMap<usize, Vec<usize>>,
    pub branch_leaf_mapping: BTreeMap<usize, Vec<usize>>,
}

impl DigestTree {
    /// Tree for an empty fact list: a sentinel root and nothing else.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            root: DigestNode::summary(Level::Root, 0, EMPTY_ROOT_TEXT.to_owned()),
            branches: Vec::new(),
            leaves: Vec::new(),
            facts: Vec::new(),
            leaf_fact_mapping: BTreeMap::new(),
            branch_leaf_mapping: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    #[must_use]
    pub fn nodes(&self, level: Level) -> &[DigestNode] {
        match level {
            Level::Root => std::slice::from_ref(&self.root),
            Level::Branch => &self.branches,
            Level::Leaf => &self.leaves,
            Level::Fact => &self.facts,
        }
    }

    /// All nodes, root first, then branches, leaves and facts in index order.
    pub fn iter_top_down(&self) -> impl Iterator<Item = &DigestNode> {
        Level::TOP_DOWN
            .into_iter()
            .flat_map(move |level| self.nodes(level).iter())
    }

    /// Indices of the lower-level nodes a node summarizes.
    ///
    /// Empty for the root (its children are implied) and for facts.
    #[must_use]
    pub fn tree_position(&self, level: Level, level_index: usize) -> &[usize] {
        let mapping = match level {
            Level::Branch => &self.branch_leaf_mapping,
            Level::Leaf => &self.leaf_fact_mapping,
            Level::Root | Level::Fact => return &[],
        };
        mapping.get(&level_index).map_or(&[][..], Vec::as_slice)
    }

    /// Index of the parent node within its level.
    #[must_use]
    pub fn parent_index(&self, level: Level, level_index: usize) -> Option<usize> {
        let find = |mapping: &BTreeMap<usize, Vec<usize>>| {
            mapping
                .iter()
                .find(|(_, children)| children.contains(&level_index))
                .map(|(parent, _)| *parent)
        };
        match level {
            Level::Fact => find(&self.leaf_fact_mapping),
            Level::Leaf => find(&self.branch_leaf_mapping),
            Level::Branch => Some(0),
            Level::Root => None,
        }
    }

    /// Check that each mapping partitions the level below it.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Inconsistent`] describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        check_partition(
            "leaf_fact_mapping",
            &self.leaf_fact_mapping,
            self.leaves.len(),
            self.facts.len(),
        )?;
        if !self.branches.is_empty() {
            check_partition(
                "branch_leaf_mapping",
                &self.branch_leaf_mapping,
                self.branches.len(),
                self.leaves.len(),
            )?;
        }
        for level in Level::TOP_DOWN {
            for (i, node) in self.nodes(level).iter().enumerate() {
                if node.level != level || (level != Level::Root && node.level_index != i) {
                    return Err(TreeError::Inconsistent(format!(
                        "{level} node at position {i} is tagged {} #{}",
                        node.level, node.level_index
                    )));
                }
            }
        }
        Ok(())
    }
}

fn check_partition(
    name: &str,
    mapping: &BTreeMap<usize, Vec<usize>>,
    parents: usize,
    children: usize,
) -> Result<()> {
    if mapping.len() != parents || mapping.keys().any(|&k| k >= parents) {
        return Err(TreeError::Inconsistent(format!(
            "{name} has {} entries for {parents} parents",
            mapping.len()
        )));
    }
    let mut seen = vec![false; children];
    for child in mapping.values().flatten() {
        match seen.get_mut(*child) {
            Some(slot) if !*slot => *slot = true,
            Some(_) => {
                return Err(TreeError::Inconsistent(format!(
                    "{name} maps child {child} more than once"
                )));
            }
            None => {
                return Err(TreeError::Inconsistent(format!(
                    "{name} references missing child {child}"
                )));
            }
        }
    }
    if let Some(orphan) = seen.iter().position(|s| !s) {
        return Err(TreeError::Inconsistent(format!(
            "{name} leaves child {orphan} unmapped"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tree() -> DigestTree {
        let facts = (0..4)
            .map(|i| DigestNode::from_fact(i, Fact::new(format!("p{i}"), "w", "t", "l")))
            .collect();
        let leaves = vec![
            DigestNode::summary(Level::Leaf, 0, "leaf 0".into()),
            DigestNode::summary(Level::Leaf, 1, "leaf 1".into()),
        ];
        DigestTree {
            root: DigestNode::summary(Level::Root, 0, "root".into()),
            branches: vec![DigestNode::summary(Level::Branch, 0, "root".into())],
            leaves,
            facts,
            leaf_fact_mapping: BTreeMap::from([(0, vec![0, 1]), (1, vec![2, 3])]),
            branch_leaf_mapping: BTreeMap::from([(0, vec![0, 1])]),
        }
    }

    #[test]
    fn level_round_trips_through_str() {
        for level in Level::TOP_DOWN {
            assert_eq!(level.as_str().parse::<Level>().unwrap(), level);
        }
        assert!("trunk".parse::<Level>().is_err());
    }

    #[test]
    fn level_parent_chain() {
        assert_eq!(Level::Fact.parent(), Some(Level::Leaf));
        assert_eq!(Level::Branch.parent(), Some(Level::Root));
        assert_eq!(Level::Root.parent(), None);
    }

    #[test]
    fn confidence_by_level() {
        assert!((DigestNode::summary(Level::Root, 0, "r".into()).confidence - 1.0).abs() < f32::EPSILON);
        assert!((DigestNode::summary(Level::Leaf, 0, "l".into()).confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_tree_has_sentinel_root() {
        let tree = DigestTree::empty();
        assert!(tree.is_empty());
        assert_eq!(tree.root.text, EMPTY_ROOT_TEXT);
        assert!(tree.validate().is_ok());
        assert_eq!(tree.iter_top_down().count(), 1);
    }

    #[test]
    fn top_down_order() {
        let tree = small_tree();
        let levels: Vec<Level> = tree.iter_top_down().map(|n| n.level).collect();
        assert_eq!(
            levels,
            vec![
                Level::Root,
                Level::Branch,
                Level::Leaf,
                Level::Leaf,
                Level::Fact,
                Level::Fact,
                Level::Fact,
                Level::Fact
            ]
        );
    }

    #[test]
    fn positions_and_parents() {
        let tree = small_tree();
        assert_eq!(tree.tree_position(Level::Leaf, 1), &[2, 3]);
        assert_eq!(tree.tree_position(Level::Branch, 0), &[0, 1]);
        assert!(tree.tree_position(Level::Root, 0).is_empty());
        assert_eq!(tree.parent_index(Level::Fact, 3), Some(1));
        assert_eq!(tree.parent_index(Level::Leaf, 1), Some(0));
        assert_eq!(tree.parent_index(Level::Root, 0), None);
    }

    #[test]
    fn validate_accepts_partition() {
        assert!(small_tree().validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_child() {
        let mut tree = small_tree();
        tree.leaf_fact_mapping.insert(1, vec![1, 2, 3]);
        assert!(matches!(tree.validate(), Err(TreeError::Inconsistent(_))));
    }

    #[test]
    fn validate_rejects_dangling_child() {
        let mut tree = small_tree();
        tree.leaf_fact_mapping.insert(1, vec![2, 3, 9]);
        assert!(tree.validate().is_err());
    }

    #[test]
    fn validate_rejects_orphan() {
        let mut tree = small_tree();
        tree.leaf_fact_mapping.insert(1, vec![2]);
        assert!(tree.validate().is_err());
    }

    #[test]
    fn serde_round_trip_keeps_fact_payload() {
        let tree = small_tree();
        let json = serde_json::to_string(&tree).unwrap();
        let back: DigestTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back.facts[2].fact.as_ref().unwrap().who, "p2");
        assert!(back.leaves[0].fact.is_none());
    }
}
