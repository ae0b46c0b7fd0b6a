//! OpenAI-compatible embedding client.
//!
//! Works with: OpenAI, Ollama (`/v1/embeddings`), vLLM, LM Studio, and any
//! endpoint that accepts `{"model", "input": [..]}` and answers with
//! `{"data": [{"index", "embedding"}]}`.

use async_trait::async_trait;
use policygate_core::{Embedder, Error, RetrievalError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub struct OpenAiCompatEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    client: reqwest::Client,
}

impl OpenAiCompatEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
            client,
        })
    }

    /// Local Ollama (convenience constructor).
    pub fn ollama(
        base_url: Option<&str>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, Error> {
        Self::new(
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
            model,
            dimensions,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Reorder by `index` and check the shape of the response.
    fn collect_vectors(
        &self,
        mut data: Vec<ApiEmbedding>,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if data.len() != expected {
            return Err(RetrievalError::unavailable(format!(
                "embedding endpoint returned {} vectors for {expected} inputs",
                data.len()
            )));
        }
        data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
        if let Some(v) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(RetrievalError::unavailable(format!(
                "embedding has {} dimensions, expected {}",
                v.len(),
                self.dimensions
            )));
        }
        Ok(vectors)
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = ApiRequest {
            model: &self.model,
            input,
        };

        debug!(model = %self.model, inputs = input.len(), "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::unavailable(format!("embedding request failed: {e}")))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Embedding endpoint returned error");
            return Err(RetrievalError::unavailable(format!(
                "embedding endpoint returned status {status}"
            )));
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            RetrievalError::unavailable(format!("Failed to parse embedding response: {e}"))
        })?;

        self.collect_vectors(api_response.data, input.len())
    }
}

#[async_trait]
impl Embedder for OpenAiCompatEmbedder {
    fn name(&self) -> &str {
        "openai_compat"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RetrievalError::unavailable("empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct ApiResponse {
    data: Vec<ApiEmbedding>,
}

#[derive(Deserialize)]
struct ApiEmbedding {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}
