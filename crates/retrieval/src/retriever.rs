//! Scoped retriever: fan out over the scope lattice, merge, dedupe.

use futures::future::join_all;
use policygate_core::{Layer, RetrievalError, ScoredChunk};
use policygate_store::LayerStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::scope::{active_only, scope_lattice};

/// Snippets sharing this many leading characters are duplicates.
pub const DEFAULT_DEDUP_PREFIX_CHARS: usize = 220;

/// Where a snippet came from in the scope fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnippetOrigin {
    /// Rank in the scope lattice, 0 being the case's exact scope.
    Scope { rank: usize },
    /// The unfiltered active-only query substituted for a failed scope.
    Degraded,
}

/// A retrieved chunk with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    pub chunk_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    pub origin: SnippetOrigin,
    pub score: f32,
}

impl Snippet {
    fn from_chunk(chunk: ScoredChunk, origin: SnippetOrigin) -> Self {
        Self {
            policy_id: chunk.policy_id().map(str::to_string),
            text: chunk.text,
            chunk_id: chunk.id,
            origin,
            score: chunk.score,
        }
    }
}

#[derive(Clone)]
pub struct ScopedRetriever {
    store: Arc<LayerStore>,
    dedup_prefix_chars: usize,
}

impl ScopedRetriever {
    pub fn new(store: Arc<LayerStore>) -> Self {
        Self {
            store,
            dedup_prefix_chars: DEFAULT_DEDUP_PREFIX_CHARS,
        }
    }

    pub fn with_dedup_prefix(mut self, chars: usize) -> Self {
        self.dedup_prefix_chars = chars.max(1);
        self
    }

    pub fn store(&self) -> &Arc<LayerStore> {
        &self.store
    }

    /// At most `k` deduplicated snippets from `layer` for a case scoped to
    /// `(state, sector)`.
    ///
    /// Scope queries run concurrently and are merged most specific first;
    /// no score comparison happens across scopes. A failed scope query is
    /// replaced by one unfiltered active-only query. If that also fails, or
    /// the query cannot be embedded, the error is returned.
    pub async fn retrieve_layer(
        &self,
        layer: Layer,
        query: &str,
        k: usize,
        state: &str,
        sector: &str,
    ) -> Result<Vec<Snippet>, RetrievalError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let variants = scope_lattice(state, sector);
        let vector = self.store.embed_query(query).await?;

        let results = join_all(
            variants
                .iter()
                .map(|v| self.store.query_vector(layer, &vector, k, &v.filter)),
        )
        .await;

        let mut merged: Vec<Snippet> = Vec::new();
        let mut degraded_used = false;
        for (variant, result) in variants.iter().zip(results) {
            match result {
                Ok(hits) => merged.extend(
                    hits.into_iter()
                        .map(|h| Snippet::from_chunk(h, SnippetOrigin::Scope { rank: variant.rank })),
                ),
                Err(e) if !degraded_used => {
                    warn!(
                        layer = %layer,
                        state = %variant.state,
                        sector = %variant.sector,
                        error = %e,
                        "Scope query failed, falling back to unfiltered active query"
                    );
                    degraded_used = true;
                    let hits = self
                        .store
                        .query_vector(layer, &vector, k, &active_only())
                        .await?;
                    merged.extend(
                        hits.into_iter()
                            .map(|h| Snippet::from_chunk(h, SnippetOrigin::Degraded)),
                    );
                }
                Err(e) => {
                    debug!(layer = %layer, rank = variant.rank, error = %e, "Scope query failed after fallback");
                }
            }
        }

        let snippets = dedupe(merged, k, self.dedup_prefix_chars);
        debug!(layer = %layer, state, sector, returned = snippets.len(), "Layer retrieved");
        Ok(snippets)
    }
}

/// Keep the first snippet per `prefix_chars`-character prefix, up to `k`.
pub fn dedupe(snippets: Vec<Snippet>, k: usize, prefix_chars: usize) -> Vec<Snippet> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(k);
    for snippet in snippets {
        if out.len() >= k {
            break;
        }
        let key: String = snippet.text.chars().take(prefix_chars).collect();
        if seen.insert(key) {
            out.push(snippet);
        }
    }
    out
}
