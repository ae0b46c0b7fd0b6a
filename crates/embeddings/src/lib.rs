//! Embedder implementations for PolicyGate.
//!
//! - [`HashingEmbedder`]: deterministic feature hashing, works offline
//! - [`OpenAiCompatEmbedder`]: any OpenAI-compatible `/embeddings` endpoint
//!   (OpenAI, Ollama, vLLM, LM Studio)

pub mod hashing;
pub mod openai_compat;

pub use hashing::HashingEmbedder;
pub use openai_compat::OpenAiCompatEmbedder;

use policygate_config::EmbeddingConfig;
use policygate_core::{Embedder, Error};
use std::sync::Arc;

/// Build the embedder selected by configuration.
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, Error> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dimensions))),
        "openai_compat" => {
            let url = config.api_url.as_deref().ok_or_else(|| Error::Config {
                message: "embedding.api_url is required for openai_compat".into(),
            })?;
            Ok(Arc::new(OpenAiCompatEmbedder::new(
                url,
                config.api_key.clone().unwrap_or_default(),
                &config.model,
                config.dimensions,
            )?))
        }
        "ollama" => Ok(Arc::new(OpenAiCompatEmbedder::ollama(
            config.api_url.as_deref(),
            &config.model,
            config.dimensions,
        )?)),
        other => Err(Error::Config {
            message: format!("unknown embedding provider '{other}'"),
        }),
    }
}
