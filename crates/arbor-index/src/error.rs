//! Error types for arbor-index.

use std::num::TryFromIntError;

/// Failures while persisting or loading the index.
///
/// Retrieval never surfaces these to callers; it degrades instead.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// `SQLite` database error.
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// Embedded schema migration failed.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// LLM provider error (classification or embedding).
    #[error("LLM error: {0}")]
    Llm(#[from] arbor_llm::LlmError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The tree handed to the store violates its own mappings.
    #[error("invalid tree: {0}")]
    Tree(#[from] arbor_tree::TreeError),

    /// Encoder produced vectors of the wrong shape or count.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// A stored row could not be mapped back to a tree node.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Integer conversion error.
    #[error("integer conversion failed: {0}")]
    IntConversion(#[from] TryFromIntError),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
