//! Prompt construction for each summarization step.
//!
//! Builders keep items numbered and in input order so the summarizer can refer
//! back to them.

use std::fmt::Write as _;

use crate::fact::{Fact, format_for_display};

/// Prompt for a leaf abstract over a contiguous run of facts.
#[must_use]
pub fn leaf_prompt(facts: &[Fact]) -> String {
    format!(
        "You are an analyst writing a local abstract of {count} tactical facts.\n\
         Summarize them in at most 200 tokens. Keep names, places, times and methods \
         exactly as given, note low-confidence facts as uncertain, and describe what \
         happened rather than what it means.\n\n\
         Facts:\n{facts}\n\n\
         Local abstract:",
        count = facts.len(),
        facts = format_for_display(facts),
    )
}

/// Prompt reconciling overlapping window abstracts into a single consensus abstract.
#[must_use]
pub fn consensus_prompt(window_abstracts: &[String]) -> String {
    let mut out = format!(
        "These are {} overlapping abstracts of the same facts.\n\
         Write one consensus abstract of at most 200 tokens that keeps only information \
         consistent across the abstracts and drops claims that appear in just one.\n\n",
        window_abstracts.len()
    );
    for (i, text) in window_abstracts.iter().enumerate() {
        let _ = writeln!(out, "Abstract {}: {text}", i + 1);
    }
    out.push_str("\nConsensus abstract:");
    out
}

/// Prompt merging a chunk of leaf abstracts into a branch summary.
#[must_use]
pub fn branch_prompt(leaf_abstracts: &[String]) -> String {
    let numbered = leaf_abstracts
        .iter()
        .enumerate()
        .map(|(j, text)| format!("Abstract {}:\n{text}", j + 1))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "You are a senior analyst integrating {count} local abstracts into an operational \
         overview of at most 400 tokens. Connect related activities, people and places \
         across abstracts and track how they change over time.\n\n\
         {numbered}\n\n\
         Operational overview:",
        count = leaf_abstracts.len(),
    )
}

/// Prompt producing the final digest from every branch summary.
#[must_use]
pub fn root_prompt(branch_summaries: &[String]) -> String {
    let numbered = branch_summaries
        .iter()
        .enumerate()
        .map(|(i, text)| format!("Branch {}:\n{text}", i + 1))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "You are the lead analyst producing the final digest for decision makers from \
         {count} branch summaries. Lead with the most important findings, give the \
         broader assessment, and state how confident the assessment is. At most 800 tokens.\n\n\
         {numbered}\n\n\
         Final digest:",
        count = branch_summaries.len(),
    )
}
