//! Atomic fact records and their text renderings.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, TreeError};

/// Placeholder for a field the extractor could not fill.
pub const UNKNOWN: &str = "unknown";

fn unknown() -> String {
    UNKNOWN.to_owned()
}

fn normalize(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        unknown()
    } else if trimmed.len() == value.len() {
        value
    } else {
        trimmed.to_owned()
    }
}

fn non_empty<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(normalize(value.unwrap_or_default()))
}

/// One extracted observation: who did what, when, and where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    #[serde(default = "unknown", deserialize_with = "non_empty")]
    pub who: String,
    #[serde(default = "unknown", deserialize_with = "non_empty")]
    pub what: String,
    #[serde(default = "unknown", deserialize_with = "non_empty")]
    pub when: String,
    #[serde(rename = "where", default = "unknown", deserialize_with = "non_empty")]
    pub location: String,
    #[serde(default)]
    pub confidence: f32,
}

impl Fact {
    #[must_use]
    pub fn new(
        who: impl Into<String>,
        what: impl Into<String>,
        when: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            who: normalize(who.into()),
            what: normalize(what.into()),
            when: normalize(when.into()),
            location: normalize(location.into()),
            confidence: 0.0,
        }
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Text stored for the fact node and embedded for retrieval.
    #[must_use]
    pub fn retrieval_text(&self) -> String {
        format!(
            "Individual: {} Action: {} Time: {} Location: {} Confidence: {:.2}",
            self.who, self.what, self.when, self.location, self.confidence
        )
    }
}

/// Returns true when `value` is the placeholder, ignoring case.
#[must_use]
pub fn is_unknown(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(UNKNOWN)
}

/// Numbered one-line-per-fact listing used inside summarization prompts.
#[must_use]
pub fn format_for_display(facts: &[Fact]) -> String {
    let mut out = String::new();
    for (i, fact) in facts.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(
            out,
            "{}. WHO: {} | WHAT: {} | WHEN: {} | WHERE: {} | CONFIDENCE: {:.2}",
            i + 1,
            fact.who,
            fact.what,
            fact.when,
            fact.location,
            fact.confidence
        );
    }
    out
}

/// Read facts from a JSON-lines file. Blank lines are skipped.
///
/// # Errors
///
/// Returns [`TreeError::Io`] if the file cannot be read, or
/// [`TreeError::FactParse`] naming the 1-based line that is not a valid fact.
pub fn load_facts_jsonl(path: &Path) -> Result<Vec<Fact>> {
    let content = std::fs::read_to_string(path)?;
    parse_facts_jsonl(&content)
}

/// Parse JSON-lines fact content. See [`load_facts_jsonl`].
///
/// # Errors
///
/// Returns [`TreeError::FactParse`] for the first malformed line.
pub fn parse_facts_jsonl(content: &str) -> Result<Vec<Fact>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| TreeError::FactParse {
                line: i + 1,
                source,
            })
        })
        .collect()
}
