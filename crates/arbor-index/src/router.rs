//! Query abstraction-level classification and level routing.

use std::fmt;

use arbor_llm::{GenerationParams, LlmError, LlmProvider, Message};
use arbor_tree::Level;

use crate::error::Result;

/// Abstraction level a query asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryLevel {
    /// Big-picture assessment: searched against root and branches.
    Strategic,
    /// Trends across activities: branches and leaves.
    Pattern,
    /// Concrete details: leaves and facts.
    Specific,
    /// Unclear or mixed intent: every level.
    Mixed,
}

impl QueryLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strategic => "STRATEGIC",
            Self::Pattern => "PATTERN",
            Self::Specific => "SPECIFIC",
            Self::Mixed => "MIXED",
        }
    }

    /// Tree levels searched for this query level; `None` means no restriction.
    #[must_use]
    pub fn levels(self) -> Option<&'static [Level]> {
        match self {
            Self::Strategic => Some(&[Level::Root, Level::Branch]),
            Self::Pattern => Some(&[Level::Branch, Level::Leaf]),
            Self::Specific => Some(&[Level::Leaf, Level::Fact]),
            Self::Mixed => None,
        }
    }

    /// Vector-search candidates kept per requested result.
    #[must_use]
    pub fn candidate_factor(self) -> usize {
        if self == Self::Mixed { 3 } else { 2 }
    }

    /// Map free-text classifier output to a level. Anything that is not exactly
    /// one of the four labels, after trimming punctuation and case, is `Mixed`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        let label = label
            .trim()
            .trim_matches(|c: char| !c.is_alphabetic())
            .to_uppercase();
        match label.as_str() {
            "STRATEGIC" => Self::Strategic,
            "PATTERN" => Self::Pattern,
            "SPECIFIC" => Self::Specific,
            _ => Self::Mixed,
        }
    }
}

impl fmt::Display for QueryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn classification_prompt(query: &str) -> String {
    format!(
        "Classify the query by the level of abstraction it needs.\n\n\
         STRATEGIC: overall assessment, threat level, big-picture implications\n\
         PATTERN: trends, networks or recurring behavior across several activities\n\
         SPECIFIC: a particular person, place, time or event\n\
         MIXED: needs several levels or none of the above fits\n\n\
         Query: {query}\n\n\
         Respond with exactly one word: STRATEGIC, PATTERN, SPECIFIC, or MIXED."
    )
}

/// Classifies queries through an LLM. Stateless: every call asks the classifier again.
pub struct QueryRouter<P> {
    provider: P,
}

impl<P: LlmProvider> QueryRouter<P> {
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Classify `query`. Unrecognized labels and blank replies become
    /// [`QueryLevel::Mixed`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::IndexError::Llm`] if the classifier call itself fails.
    pub async fn classify(&self, query: &str) -> Result<QueryLevel> {
        let response = match self
            .provider
            .chat(
                &[Message::user(classification_prompt(query))],
                GenerationParams::new(10, 0.1),
            )
            .await
        {
            Ok(response) => response,
            Err(LlmError::EmptyResponse { provider }) => {
                tracing::debug!(%provider, "empty classification, using MIXED");
                return Ok(QueryLevel::Mixed);
            }
            Err(e) => return Err(e.into()),
        };

        let level = QueryLevel::from_label(&response);
        if level == QueryLevel::Mixed && !response.trim().eq_ignore_ascii_case("mixed") {
            tracing::debug!(raw = %response.trim(), "unrecognized classification, using MIXED");
        }
        tracing::debug!(%level, "query classified");
        Ok(level)
    }
}
