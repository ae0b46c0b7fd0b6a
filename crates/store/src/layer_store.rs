//! Layer store: one vector collection per policy layer.
//!
//! Upserts replace every chunk of a policy version (delete, then insert).
//! Queries embed the query text and return the nearest chunks that satisfy
//! an exact-match metadata filter. Every embedder and collection call is
//! bounded by a timeout; a timeout is a recoverable [`RetrievalError`].

use policygate_core::policy::fields;
use policygate_core::{
    ChunkMetadata, ChunkRecord, Embedder, Layer, MetadataFilter, PolicyId, PolicyStatus,
    RetrievalError, ScoredChunk, VectorCollection,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::in_memory::InMemoryCollection;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct LayerStore {
    collections: HashMap<Layer, Arc<dyn VectorCollection>>,
    embedder: Arc<dyn Embedder>,
    timeout: Duration,
}

impl LayerStore {
    /// A store with no collections; add them with [`LayerStore::with_collection`].
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            collections: HashMap::new(),
            embedder,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Every layer backed by an [`InMemoryCollection`].
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Layer::ALL.into_iter().fold(Self::new(embedder), |store, layer| {
            store.with_collection(layer, Arc::new(InMemoryCollection::new(layer.as_str())))
        })
    }

    /// Every layer backed by its own SQLite file under `dir`.
    #[cfg(feature = "sqlite")]
    pub async fn sqlite(
        dir: &std::path::Path,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RetrievalError> {
        use crate::sqlite::SqliteCollection;

        std::fs::create_dir_all(dir).map_err(|e| {
            RetrievalError::unavailable(format!("Failed to create layer directory: {e}"))
        })?;

        let mut store = Self::new(embedder);
        for layer in Layer::ALL {
            let path = format!("sqlite://{}", dir.join(format!("{layer}.sqlite")).display());
            let collection = SqliteCollection::new(layer.as_str(), &path).await?;
            store = store.with_collection(layer, Arc::new(collection));
        }
        Ok(store)
    }

    pub fn with_collection(mut self, layer: Layer, collection: Arc<dyn VectorCollection>) -> Self {
        self.collections.insert(layer, collection);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    fn collection(&self, layer: Layer) -> Result<&Arc<dyn VectorCollection>, RetrievalError> {
        self.collections
            .get(&layer)
            .ok_or_else(|| RetrievalError::unavailable(format!("no collection for layer {layer}")))
    }

    async fn timed<T, F>(&self, operation: &str, fut: F) -> Result<T, RetrievalError>
    where
        F: Future<Output = Result<T, RetrievalError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RetrievalError::Timeout {
                operation: operation.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// Replace all chunks of `policy_id` with `chunks`.
    ///
    /// Chunks are embedded first, so an unreachable embedder leaves the old
    /// chunks untouched. The delete is best-effort: if it fails the insert
    /// still runs. Returns the number of chunks written.
    pub async fn upsert(
        &self,
        policy_id: &PolicyId,
        chunks: &[String],
        metadata: &ChunkMetadata,
    ) -> Result<usize, RetrievalError> {
        let layer = metadata.layer;
        let collection = self.collection(layer)?;

        let embeddings = self
            .timed("embed_batch", self.embedder.embed_batch(chunks))
            .await?;
        if embeddings.len() != chunks.len() {
            return Err(RetrievalError::unavailable(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let by_policy = MetadataFilter::new().with(fields::POLICY_ID, policy_id.as_str());
        match self.timed("delete", collection.delete(&by_policy)).await {
            Ok(removed) => debug!(%policy_id, removed, "Removed previous chunks"),
            Err(e) => warn!(%policy_id, error = %e, "Could not delete previous chunks; inserting anyway"),
        }

        let mut base = metadata.to_metadata();
        base.insert(fields::POLICY_ID.to_string(), policy_id.to_string());

        let records: Vec<ChunkRecord> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| ChunkRecord {
                id: policy_id.chunk_id(i),
                text: text.clone(),
                embedding,
                metadata: base.clone(),
            })
            .collect();

        let written = records.len();
        self.timed("add", collection.add(records)).await?;
        info!(%policy_id, layer = %layer, chunks = written, "Upserted policy chunks");
        Ok(written)
    }

    /// Top-`k` chunks of `layer` nearest to `query_text` that satisfy `filter`.
    pub async fn query(
        &self,
        layer: Layer,
        query_text: &str,
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let vector = self.embed_query(query_text).await?;
        self.query_vector(layer, &vector, k, filter).await
    }

    /// Embed `query_text` once so several filtered queries can share it.
    pub async fn embed_query(&self, query_text: &str) -> Result<Vec<f32>, RetrievalError> {
        self.timed("embed", self.embedder.embed(query_text)).await
    }

    /// [`LayerStore::query`] with a precomputed query vector.
    pub async fn query_vector(
        &self,
        layer: Layer,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let collection = self.collection(layer)?;
        let hits = self
            .timed("query", collection.query(vector, k, filter))
            .await?;
        debug!(layer = %layer, k, hits = hits.len(), ?filter, "Layer query");
        Ok(hits)
    }

    /// Rewrite the `status` metadata of every chunk of `policy_id`.
    pub async fn set_status(
        &self,
        layer: Layer,
        policy_id: &PolicyId,
        status: PolicyStatus,
    ) -> Result<usize, RetrievalError> {
        let collection = self.collection(layer)?;
        let by_policy = MetadataFilter::new().with(fields::POLICY_ID, policy_id.as_str());
        let touched = self
            .timed(
                "update_metadata",
                collection.update_metadata(&by_policy, fields::STATUS, status.as_str()),
            )
            .await?;
        info!(%policy_id, layer = %layer, status = %status, touched, "Re-stamped chunk status");
        Ok(touched)
    }

    /// Delete every chunk of `policy_id`. Returns the number removed.
    pub async fn remove(&self, layer: Layer, policy_id: &PolicyId) -> Result<usize, RetrievalError> {
        let collection = self.collection(layer)?;
        let by_policy = MetadataFilter::new().with(fields::POLICY_ID, policy_id.as_str());
        let removed = self.timed("delete", collection.delete(&by_policy)).await?;
        info!(%policy_id, layer = %layer, removed, "Removed policy chunks");
        Ok(removed)
    }

    /// Number of chunks in `layer` matching `filter`.
    pub async fn count(&self, layer: Layer, filter: &MetadataFilter) -> Result<usize, RetrievalError> {
        let collection = self.collection(layer)?;
        self.timed("count", collection.count(filter)).await
    }
}
