//! # PolicyGate Core
//!
//! Domain types, traits, and error definitions for the layered policy
//! retrieval and governance core. This crate has **no storage or network
//! dependencies**; it defines the model every other crate implements against.
//!
//! ## Seams
//!
//! The external collaborators are traits here, implementations live in
//! their own crates:
//! - [`Embedder`] turns text into vectors (`policygate-embeddings`)
//! - [`VectorCollection`] is one nearest-neighbor collection per layer
//!   (`policygate-store`)
//! - [`RegistryStorage`] persists the governance registry (`policygate-store`)

pub mod error;
pub mod policy;
pub mod embedder;
pub mod collection;
pub mod registry;

// Re-export key types at crate root for ergonomics
pub use error::{Error, IngestError, RegistryError, Result, RetrievalError};
pub use policy::{ChunkMetadata, Layer, PolicyId, PolicyStatus, PolicyVersion, Scope, WILDCARD};
pub use embedder::Embedder;
pub use collection::{ChunkRecord, Metadata, MetadataFilter, ScoredChunk, VectorCollection};
pub use registry::RegistryStorage;
