//! Feature-hashing embedder.
//!
//! Hashes lowercase word unigrams and bigrams into fixed-dimension buckets
//! (FNV-1a, signed) and L2-normalizes the result. Not semantically rich, but
//! deterministic, dependency-free and always available, which makes it the
//! default for air-gapped deployments and for tests.

use async_trait::async_trait;
use policygate_core::{Embedder, RetrievalError};

pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn fnv1a(term: &str) -> u64 {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        h
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
            .collect()
    }

    /// Embed synchronously; the trait methods delegate here.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let tokens = Self::tokenize(text);
        let mut vec = vec![0.0f32; self.dimensions];

        let bigrams = tokens.windows(2).map(|w| format!("{} {}", w[0], w[1]));
        for term in tokens.iter().cloned().chain(bigrams) {
            let h = Self::fnv1a(&term);
            let bucket = (h % self.dimensions as u64) as usize;
            // High bit picks the sign so collisions tend to cancel out.
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            vec[bucket] += sign;
        }

        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn output_has_configured_dimensions() {
        let e = HashingEmbedder::new(64);
        assert_eq!(e.embed_sync("GST turnover mismatch").len(), 64);
    }

    #[test]
    fn deterministic() {
        let e = HashingEmbedder::new(128);
        assert_eq!(
            e.embed_sync("cashflow volatility"),
            e.embed_sync("cashflow volatility")
        );
    }

    #[test]
    fn unit_length() {
        let e = HashingEmbedder::new(128);
        let v = e.embed_sync("documentation requirements for warehouse loans");
        assert!((dot(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let e = HashingEmbedder::new(16);
        assert!(e.embed_sync("  ,. ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn shared_terms_score_higher_than_disjoint() {
        let e = HashingEmbedder::new(256);
        let q = e.embed_sync("bank statement mismatch");
        let close = e.embed_sync("flag any mismatch between GST and bank statement credits");
        let far = e.embed_sync("environmental clearance for effluent discharge");
        assert!(dot(&q, &close) > dot(&q, &far));
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let e = HashingEmbedder::new(32);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = e.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], e.embed_sync("alpha"));
        assert_eq!(batch[1], e.embed_sync("beta"));
    }
}
