//! Embedder trait: the abstraction over embedding models.
//!
//! An Embedder turns text into a fixed-length vector. Batch embedding must
//! preserve input order.

use async_trait::async_trait;

use crate::error::RetrievalError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// The embedder name (e.g., "hashing", "openai_compat").
    fn name(&self) -> &str;

    /// Length of every vector this embedder returns.
    fn dimensions(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;

    /// Embed many texts, order-preserving.
    ///
    /// The default implementation calls [`Embedder::embed`] sequentially;
    /// remote embedders override it with a single batched request.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}
