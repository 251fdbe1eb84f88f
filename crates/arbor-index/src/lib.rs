//! Hierarchical retrieval index over a digest tree.
//!
//! Nodes and their relations live in a `SQLite` graph store, documents are
//! encoded into token-level multi-vectors, and each query is routed to the tree
//! levels that match its abstraction before hybrid re-ranking.

pub mod embedding;
pub mod entity;
pub mod error;
pub mod index;
pub mod ranker;
pub mod router;
pub mod store;

pub use embedding::{AnyEncoder, HashedEncoder, MultiVector, ProviderEncoder, TokenEncoder};
pub use entity::{Entity, EntityKind};
pub use error::IndexError;
pub use index::{HierarchicalIndex, Retrieval, RetrievalConfig};
pub use ranker::RankedHit;
pub use router::{QueryLevel, QueryRouter};
pub use store::{GraphContext, GraphStore, IndexReport, StoredDocument};
