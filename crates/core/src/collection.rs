//! Vector collection trait: one nearest-neighbor collection per layer.
//!
//! Filters are an exact-match conjunction over named metadata fields. There
//! is no disjunction and no wildcard matching at this level: `ALL` is just
//! a literal value. OR-over-wildcard is built above, by the scoped retriever.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::RetrievalError;
use crate::policy::fields;

/// Flat string metadata attached to every chunk.
pub type Metadata = BTreeMap<String, String>;

/// A chunk as stored in a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// `policy_id::chunk_<index>`
    pub id: String,

    /// The chunk text
    pub text: String,

    /// Embedding of `text`
    pub embedding: Vec<f32>,

    /// Denormalized policy metadata
    pub metadata: Metadata,
}

/// A query hit, best first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    /// Cosine similarity to the query vector
    pub score: f32,
}

impl ScoredChunk {
    /// The owning policy id, if the chunk carries one.
    pub fn policy_id(&self) -> Option<&str> {
        self.metadata.get(fields::POLICY_ID).map(String::as_str)
    }
}

/// Exact-match conjunction over metadata fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetadataFilter {
    conditions: Vec<(String, String)>,
}

impl MetadataFilter {
    /// The empty filter matches every chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `field == value` condition. A repeated field replaces the
    /// earlier condition.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        let field = field.into();
        let value = value.into();
        match self.conditions.iter_mut().find(|(f, _)| *f == field) {
            Some(existing) => existing.1 = value,
            None => self.conditions.push((field, value)),
        }
        self
    }

    pub fn conditions(&self) -> &[(String, String)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Value required for `field`, if constrained.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.conditions
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `metadata` satisfies every condition.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| metadata.get(field) == Some(value))
    }
}

/// The VectorCollection trait.
///
/// Implementations: in-memory (for testing), SQLite.
#[async_trait]
pub trait VectorCollection: Send + Sync {
    /// The collection name (usually the layer name).
    fn name(&self) -> &str;

    /// Insert records. Existing ids are overwritten.
    async fn add(&self, records: Vec<ChunkRecord>) -> Result<(), RetrievalError>;

    /// Delete every record matching `filter`; returns how many were removed.
    async fn delete(&self, filter: &MetadataFilter) -> Result<usize, RetrievalError>;

    /// Top-`k` records by similarity to `vector`, restricted to `filter`.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredChunk>, RetrievalError>;

    /// Set `field = value` on every record matching `filter`; returns how
    /// many were touched.
    async fn update_metadata(
        &self,
        filter: &MetadataFilter,
        field: &str,
        value: &str,
    ) -> Result<usize, RetrievalError>;

    /// Number of records matching `filter`.
    async fn count(&self, filter: &MetadataFilter) -> Result<usize, RetrievalError>;
}
