use std::fmt;

use arbor_llm::LlmError;

/// Summarization step that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Leaf,
    Consensus,
    Branch,
    Root,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Leaf => "leaf",
            Self::Consensus => "consensus",
            Self::Branch => "branch",
            Self::Root => "root",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// The summarizer failed while building one level of the tree.
    #[error("{stage} summarization failed: {source}")]
    Summarizer {
        stage: Stage,
        #[source]
        source: LlmError,
    },

    /// The summarizer answered with nothing usable.
    #[error("{stage} summarization returned empty text")]
    EmptySummary { stage: Stage },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid fact on line {line}: {source}")]
    FactParse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A mapping references a node that does not exist, or a node is mapped twice.
    #[error("inconsistent tree: {0}")]
    Inconsistent(String),
}

pub type Result<T> = std::result::Result<T, TreeError>;
