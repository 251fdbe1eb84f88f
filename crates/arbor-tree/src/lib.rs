//! Hierarchical digest tree: facts are grouped into leaf abstracts, leaves into
//! branch summaries, and branches into a single root digest.

pub mod builder;
pub mod error;
pub mod fact;
pub mod prompt;
pub mod slisum;
pub mod tree;

pub use builder::{GenerationConfig, TreeBuilder, TreeConfig};
pub use error::{Stage, TreeError};
pub use fact::{Fact, format_for_display, load_facts_jsonl, parse_facts_jsonl};
pub use tree::{DigestNode, DigestTree, Level};
