//! Retrieval orchestrator: one case run across every layer.
//!
//! A run fails fast with [`Error::NoActivePolicy`] when the registry has no
//! active record. Otherwise the four layers are retrieved concurrently and
//! assembled into a [`SnippetBundle`] whose snippets are labeled
//! `<TAG>-<n>` for citation.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream;
use policygate_core::{Error, Layer, Result, RetrievalError};
use policygate_store::{AuditEvent, AuditLog, PolicyRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::retriever::{ScopedRetriever, Snippet};

/// One case run's inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    pub state: String,
    pub sector: String,
    pub query: String,
    pub k_per_layer: usize,
}

impl CaseQuery {
    pub fn new(
        state: impl Into<String>,
        sector: impl Into<String>,
        query: impl Into<String>,
        k_per_layer: usize,
    ) -> Self {
        Self {
            case_id: None,
            state: state.into(),
            sector: sector.into(),
            query: query.into(),
            k_per_layer,
        }
    }

    pub fn with_case_id(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = Some(case_id.into());
        self
    }
}

/// A snippet with its citation label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSnippet {
    /// `<TAG>-<n>`, 1-based within the layer.
    pub label: String,
    #[serde(flatten)]
    pub snippet: Snippet,
}

/// Per-layer snippet lists for one case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetBundle {
    pub state: String,
    pub sector: String,
    pub query: String,
    pub retrieved_at: DateTime<Utc>,
    pub layers: BTreeMap<Layer, Vec<LabeledSnippet>>,
    /// Layers whose retrieval failed entirely; their lists are empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<Layer>,
}

impl SnippetBundle {
    pub fn layer(&self, layer: Layer) -> &[LabeledSnippet] {
        self.layers.get(&layer).map(Vec::as_slice).unwrap_or_default()
    }

    /// Look a snippet up by its citation label.
    pub fn get(&self, label: &str) -> Option<&LabeledSnippet> {
        self.layers.values().flatten().find(|s| s.label == label)
    }

    pub fn total(&self) -> usize {
        self.layers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn counts(&self) -> BTreeMap<String, usize> {
        Layer::ALL
            .into_iter()
            .map(|l| (l.as_str().to_string(), self.layer(l).len()))
            .collect()
    }

    /// The grounding block handed to the generation step: one section per
    /// layer, each snippet prefixed by its label.
    pub fn render_context(&self) -> String {
        let mut out = String::new();
        for layer in Layer::ALL {
            out.push_str(&format!("## {}\n", layer.as_str().to_uppercase()));
            let snippets = self.layer(layer);
            if snippets.is_empty() {
                out.push_str("(no applicable policy text)\n");
            }
            for s in snippets {
                out.push_str(&format!("[{}] {}\n", s.label, s.snippet.text.trim()));
            }
            out.push('\n');
        }
        out
    }
}

pub struct RetrievalOrchestrator {
    registry: Arc<PolicyRegistry>,
    retriever: ScopedRetriever,
    audit: Option<Arc<AuditLog>>,
    max_concurrency: usize,
}

impl RetrievalOrchestrator {
    pub fn new(registry: Arc<PolicyRegistry>, retriever: ScopedRetriever) -> Self {
        Self {
            registry,
            retriever,
            audit: None,
            max_concurrency: Layer::ALL.len(),
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub async fn retrieve_case(
        &self,
        state: &str,
        sector: &str,
        query: &str,
        k_per_layer: usize,
    ) -> Result<SnippetBundle> {
        self.run(&CaseQuery::new(state, sector, query, k_per_layer)).await
    }

    pub async fn run(&self, case: &CaseQuery) -> Result<SnippetBundle> {
        if !self.registry.has_active().await? {
            warn!(state = %case.state, sector = %case.sector, "Case run aborted: no active policy");
            return Err(Error::NoActivePolicy);
        }

        let retriever = &self.retriever;
        let results: Vec<(Layer, std::result::Result<Vec<Snippet>, RetrievalError>)> =
            stream::iter(Layer::ALL)
                .map(|layer| async move {
                    let result = retriever
                        .retrieve_layer(layer, &case.query, case.k_per_layer, &case.state, &case.sector)
                        .await;
                    (layer, result)
                })
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;

        let mut layers = BTreeMap::new();
        let mut degraded = Vec::new();
        for (layer, result) in results {
            let snippets = match result {
                Ok(snippets) => snippets,
                Err(e) => {
                    warn!(layer = %layer, error = %e, "Layer retrieval failed, continuing without it");
                    degraded.push(layer);
                    Vec::new()
                }
            };
            let labeled = snippets
                .into_iter()
                .enumerate()
                .map(|(i, snippet)| LabeledSnippet {
                    label: format!("{}-{}", layer.tag(), i + 1),
                    snippet,
                })
                .collect();
            layers.insert(layer, labeled);
        }
        degraded.sort();

        let bundle = SnippetBundle {
            state: case.state.clone(),
            sector: case.sector.clone(),
            query: case.query.clone(),
            retrieved_at: Utc::now(),
            layers,
            degraded,
        };

        info!(
            state = %bundle.state,
            sector = %bundle.sector,
            snippets = bundle.total(),
            degraded = bundle.degraded.len(),
            "Case retrieved"
        );

        if let Some(audit) = &self.audit {
            let event = AuditEvent::CaseRetrieved {
                timestamp: bundle.retrieved_at,
                case_id: case.case_id.clone(),
                state: bundle.state.clone(),
                sector: bundle.sector.clone(),
                query: bundle.query.clone(),
                k_per_layer: case.k_per_layer,
                snippets: bundle.counts(),
                degraded: bundle.degraded.clone(),
            };
            if let Err(e) = audit.append(&event).await {
                warn!(error = %e, "Failed to write audit event");
            }
        }

        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use policygate_core::{
        ChunkRecord, Embedder, MetadataFilter, PolicyStatus, PolicyVersion, Scope, ScoredChunk,
        VectorCollection,
    };
    use policygate_embeddings::HashingEmbedder;
    use policygate_store::{InMemoryCollection, LayerStore};

    struct OfflineCollection;

    #[async_trait]
    impl VectorCollection for OfflineCollection {
        fn name(&self) -> &str {
            "offline"
        }
        async fn add(&self, _records: Vec<ChunkRecord>) -> std::result::Result<(), RetrievalError> {
            Err(RetrievalError::unavailable("offline"))
        }
        async fn delete(&self, _f: &MetadataFilter) -> std::result::Result<usize, RetrievalError> {
            Err(RetrievalError::unavailable("offline"))
        }
        async fn query(
            &self,
            _vector: &[f32],
            _k: usize,
            _filter: &MetadataFilter,
        ) -> std::result::Result<Vec<ScoredChunk>, RetrievalError> {
            Err(RetrievalError::unavailable("offline"))
        }
        async fn update_metadata(
            &self,
            _f: &MetadataFilter,
            _field: &str,
            _value: &str,
        ) -> std::result::Result<usize, RetrievalError> {
            Err(RetrievalError::unavailable("offline"))
        }
        async fn count(&self, _f: &MetadataFilter) -> std::result::Result<usize, RetrievalError> {
            Err(RetrievalError::unavailable("offline"))
        }
    }

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(HashingEmbedder::new(256))
    }

    async fn seed(
        store: &LayerStore,
        registry: &PolicyRegistry,
        layer: Layer,
        status: PolicyStatus,
        text: &str,
    ) -> PolicyVersion {
        let pv = PolicyVersion::new(layer, Scope::wildcard(), "2024-01-01", status, "doc").unwrap();
        store
            .upsert(&pv.policy_id, &[text.to_string()], &pv.chunk_metadata())
            .await
            .unwrap();
        registry.add(pv.clone()).await.unwrap();
        pv
    }

    #[tokio::test]
    async fn draft_only_registry_is_gated() {
        let store = Arc::new(LayerStore::in_memory(embedder()));
        let registry = Arc::new(PolicyRegistry::in_memory());
        let pv = seed(&store, &registry, Layer::BasePolicy, PolicyStatus::Draft, "rule").await;

        let orchestrator = RetrievalOrchestrator::new(registry.clone(), ScopedRetriever::new(store));
        let err = orchestrator
            .retrieve_case("Goa", "retail", "rule", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoActivePolicy));

        registry
            .set_status(&pv.policy_id, PolicyStatus::Active, None)
            .await
            .unwrap();
        assert!(orchestrator.retrieve_case("Goa", "retail", "rule", 3).await.is_ok());
    }

    #[tokio::test]
    async fn labels_are_tagged_and_one_based() {
        let store = Arc::new(LayerStore::in_memory(embedder()));
        let registry = Arc::new(PolicyRegistry::in_memory());
        seed(&store, &registry, Layer::BasePolicy, PolicyStatus::Active, "Base rule on GST filings").await;
        seed(&store, &registry, Layer::Environment, PolicyStatus::Active, "Effluent discharge consent").await;

        let orchestrator = RetrievalOrchestrator::new(registry, ScopedRetriever::new(store))
            .with_max_concurrency(2);
        let bundle = orchestrator
            .retrieve_case("Uttarakhand", "warehouse", "GST", 5)
            .await
            .unwrap();

        assert_eq!(bundle.layers.len(), 4);
        assert_eq!(bundle.layer(Layer::BasePolicy)[0].label, "BASE-1");
        assert_eq!(bundle.layer(Layer::Environment)[0].label, "ENV-1");
        assert!(bundle.layer(Layer::StateRules).is_empty());
        assert_eq!(bundle.total(), 2);
        assert!(bundle.get("ENV-1").is_some());
        assert!(bundle.degraded.is_empty());

        let context = bundle.render_context();
        assert!(context.contains("[BASE-1] Base rule on GST filings"));
        assert!(context.contains("## STATE_RULES\n(no applicable policy text)"));
        let base_at = context.find("## BASE_POLICY").unwrap();
        let env_at = context.find("## ENVIRONMENT").unwrap();
        assert!(base_at < env_at);
    }

    #[tokio::test]
    async fn failed_layer_is_reported_not_fatal() {
        let embedder = embedder();
        let store = Arc::new(
            LayerStore::new(embedder)
                .with_collection(Layer::BasePolicy, Arc::new(InMemoryCollection::new("base_policy")))
                .with_collection(Layer::StateRules, Arc::new(OfflineCollection))
                .with_collection(Layer::SectorRules, Arc::new(InMemoryCollection::new("sector_rules")))
                .with_collection(Layer::Environment, Arc::new(InMemoryCollection::new("environment"))),
        );
        let registry = Arc::new(PolicyRegistry::in_memory());
        seed(&store, &registry, Layer::BasePolicy, PolicyStatus::Active, "Base rule").await;

        let orchestrator = RetrievalOrchestrator::new(registry, ScopedRetriever::new(store));
        let bundle = orchestrator
            .retrieve_case("Goa", "retail", "rule", 3)
            .await
            .unwrap();
        assert_eq!(bundle.degraded, vec![Layer::StateRules]);
        assert!(bundle.layer(Layer::StateRules).is_empty());
        assert_eq!(bundle.layer(Layer::BasePolicy).len(), 1);
    }

    #[tokio::test]
    async fn successful_run_is_audited_and_gated_run_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(AuditLog::new(dir.path().join("audit_log.jsonl")));
        let store = Arc::new(LayerStore::in_memory(embedder()));
        let registry = Arc::new(PolicyRegistry::in_memory());
        let pv = seed(&store, &registry, Layer::BasePolicy, PolicyStatus::Draft, "rule").await;

        let orchestrator =
            RetrievalOrchestrator::new(registry.clone(), ScopedRetriever::new(store.clone()))
                .with_audit(audit.clone());

        let case = CaseQuery::new("Goa", "retail", "rule", 2).with_case_id("case-17");
        assert!(orchestrator.run(&case).await.is_err());
        assert!(audit.read_all().await.unwrap().is_empty());

        registry
            .set_status(&pv.policy_id, PolicyStatus::Active, None)
            .await
            .unwrap();
        store
            .set_status(Layer::BasePolicy, &pv.policy_id, PolicyStatus::Active)
            .await
            .unwrap();
        orchestrator.run(&case).await.unwrap();

        let events = audit.read_all().await.unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            AuditEvent::CaseRetrieved { case_id, snippets, .. } => {
                assert_eq!(case_id.as_deref(), Some("case-17"));
                assert_eq!(snippets.get("base_policy"), Some(&1));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
