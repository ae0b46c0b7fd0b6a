//! In-memory collection: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use policygate_core::{ChunkRecord, MetadataFilter, RetrievalError, ScoredChunk, VectorCollection};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::vector;

/// A vector collection that keeps its records in a Vec.
/// Useful for testing and sessions where persistence isn't needed.
pub struct InMemoryCollection {
    name: String,
    records: Arc<RwLock<Vec<ChunkRecord>>>,
}

impl InMemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

#[async_trait]
impl VectorCollection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, new_records: Vec<ChunkRecord>) -> Result<(), RetrievalError> {
        let mut records = self.records.write().await;
        for record in new_records {
            match records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => records.push(record),
            }
        }
        Ok(())
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<usize, RetrievalError> {
        let mut records = self.records.write().await;
        let len_before = records.len();
        records.retain(|r| !filter.matches(&r.metadata));
        Ok(len_before - records.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let records = self.records.read().await;
        Ok(vector::rank_by_similarity(records.iter(), vector, k, filter))
    }

    async fn update_metadata(
        &self,
        filter: &MetadataFilter,
        field: &str,
        value: &str,
    ) -> Result<usize, RetrievalError> {
        let mut records = self.records.write().await;
        let mut touched = 0;
        for record in records.iter_mut().filter(|r| filter.matches(&r.metadata)) {
            record.metadata.insert(field.to_string(), value.to_string());
            touched += 1;
        }
        Ok(touched)
    }

    async fn count(&self, filter: &MetadataFilter) -> Result<usize, RetrievalError> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| filter.matches(&r.metadata)).count())
    }
}
