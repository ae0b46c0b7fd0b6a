//! Storage for PolicyGate: chunking, per-layer vector collections, the
//! governance registry, and the audit log.

pub mod chunker;
pub mod vector;
pub mod in_memory;
pub mod layer_store;
pub mod registry;
pub mod audit;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use chunker::{Chunker, chunk_text};
pub use vector::{cosine_similarity, rank_by_similarity};
pub use in_memory::InMemoryCollection;
pub use layer_store::LayerStore;
pub use registry::{InMemoryRegistryStorage, JsonFileRegistryStorage, PolicyRegistry};
pub use audit::{AuditEvent, AuditLog};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCollection;
