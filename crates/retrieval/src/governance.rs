//! Policy governance: the `draft → active` approval.
//!
//! Approval rewrites the `status` metadata of the policy's chunks (unless
//! disabled) and then updates the registry. A failed registry write puts
//! the chunks back to their previous status.

use chrono::Utc;
use policygate_core::{PolicyId, PolicyStatus, RegistryError, Result};
use policygate_store::{AuditEvent, AuditLog, LayerStore, PolicyRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalReport {
    pub policy_id: PolicyId,
    pub records_updated: usize,
    pub chunks_updated: usize,
}

pub struct PolicyGovernance {
    store: Arc<LayerStore>,
    registry: Arc<PolicyRegistry>,
    audit: Option<Arc<AuditLog>>,
    sync_chunk_status: bool,
}

impl PolicyGovernance {
    pub fn new(store: Arc<LayerStore>, registry: Arc<PolicyRegistry>) -> Self {
        Self {
            store,
            registry,
            audit: None,
            sync_chunk_status: true,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// When false, approval only updates the registry.
    pub fn with_chunk_sync(mut self, enabled: bool) -> Self {
        self.sync_chunk_status = enabled;
        self
    }

    /// Activate every record of `policy_id`.
    pub async fn approve(
        &self,
        policy_id: &PolicyId,
        approved_by: Option<&str>,
    ) -> Result<ApprovalReport> {
        let entry = self
            .registry
            .get(policy_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(policy_id.to_string()))?;

        // Chunks first: a registry marked active over draft chunks would pass
        // the gate and retrieve nothing.
        let chunks_updated = if self.sync_chunk_status {
            self.store
                .set_status(entry.layer, policy_id, PolicyStatus::Active)
                .await?
        } else {
            0
        };

        let records_updated = match self
            .registry
            .set_status(policy_id, PolicyStatus::Active, approved_by)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                if self.sync_chunk_status {
                    if let Err(revert) = self
                        .store
                        .set_status(entry.layer, policy_id, entry.status)
                        .await
                    {
                        warn!(%policy_id, error = %revert, "Could not revert chunk status");
                    }
                }
                return Err(e.into());
            }
        };

        info!(
            %policy_id,
            approved_by = approved_by.unwrap_or("-"),
            records_updated,
            chunks_updated,
            "Policy approved"
        );

        if let Some(audit) = &self.audit {
            let event = AuditEvent::PolicyApproved {
                timestamp: Utc::now(),
                policy_id: policy_id.clone(),
                approved_by: approved_by.map(str::to_string),
                chunks_updated,
            };
            if let Err(e) = audit.append(&event).await {
                warn!(error = %e, "Failed to write audit event");
            }
        }

        Ok(ApprovalReport {
            policy_id: policy_id.clone(),
            records_updated,
            chunks_updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{IngestRequest, PolicyIngestor};
    use crate::retriever::ScopedRetriever;
    use async_trait::async_trait;
    use policygate_core::policy::fields;
    use policygate_core::{
        ChunkRecord, Error, Layer, MetadataFilter, PolicyVersion, RegistryStorage,
        RetrievalError, Scope, ScoredChunk, VectorCollection,
    };
    use policygate_embeddings::HashingEmbedder;
    use policygate_store::{Chunker, InMemoryCollection, InMemoryRegistryStorage};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// A collection whose metadata cannot be rewritten.
    struct FrozenCollection(InMemoryCollection);

    #[async_trait]
    impl VectorCollection for FrozenCollection {
        fn name(&self) -> &str {
            self.0.name()
        }
        async fn add(&self, records: Vec<ChunkRecord>) -> std::result::Result<(), RetrievalError> {
            self.0.add(records).await
        }
        async fn delete(&self, filter: &MetadataFilter) -> std::result::Result<usize, RetrievalError> {
            self.0.delete(filter).await
        }
        async fn query(
            &self,
            vector: &[f32],
            k: usize,
            filter: &MetadataFilter,
        ) -> std::result::Result<Vec<ScoredChunk>, RetrievalError> {
            self.0.query(vector, k, filter).await
        }
        async fn update_metadata(
            &self,
            _filter: &MetadataFilter,
            _field: &str,
            _value: &str,
        ) -> std::result::Result<usize, RetrievalError> {
            Err(RetrievalError::unavailable("metadata is read-only"))
        }
        async fn count(&self, filter: &MetadataFilter) -> std::result::Result<usize, RetrievalError> {
            self.0.count(filter).await
        }
    }

    /// Registry storage that starts rejecting writes once `read_only` is set.
    #[derive(Default)]
    struct LockableStorage {
        inner: InMemoryRegistryStorage,
        read_only: AtomicBool,
    }

    #[async_trait]
    impl RegistryStorage for LockableStorage {
        fn name(&self) -> &str {
            "lockable"
        }
        async fn load_all(&self) -> std::result::Result<Vec<PolicyVersion>, RegistryError> {
            self.inner.load_all().await
        }
        async fn replace_all(
            &self,
            records: &[PolicyVersion],
        ) -> std::result::Result<(), RegistryError> {
            if self.read_only.load(Ordering::SeqCst) {
                return Err(RegistryError::Storage("disk full".into()));
            }
            self.inner.replace_all(records).await
        }
    }

    fn active_chunks(id: &PolicyId) -> MetadataFilter {
        MetadataFilter::new()
            .with(fields::POLICY_ID, id.as_str())
            .with(fields::STATUS, PolicyStatus::Active.as_str())
    }

    struct Fixture {
        store: Arc<LayerStore>,
        registry: Arc<PolicyRegistry>,
        ingestor: PolicyIngestor,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(LayerStore::in_memory(Arc::new(HashingEmbedder::new(128))));
        let registry = Arc::new(PolicyRegistry::in_memory());
        let ingestor = PolicyIngestor::new(store.clone(), registry.clone(), Chunker::default());
        Fixture {
            store,
            registry,
            ingestor,
        }
    }

    fn draft_request() -> IngestRequest {
        IngestRequest {
            layer: Layer::SectorRules,
            state: "ALL".into(),
            sector: "warehouse".into(),
            version: "2024-06-30".into(),
            status: PolicyStatus::Draft,
            doc_name: "warehouse.pdf".into(),
            text: "Warehouse receipts must be pledged with the bank.".into(),
        }
    }

    #[tokio::test]
    async fn approval_makes_draft_retrievable() {
        let f = fixture();
        let report = f.ingestor.ingest(draft_request()).await.unwrap();
        let retriever = ScopedRetriever::new(f.store.clone());

        let before = retriever
            .retrieve_layer(Layer::SectorRules, "warehouse receipts", 5, "Goa", "warehouse")
            .await
            .unwrap();
        assert!(before.is_empty());

        let governance = PolicyGovernance::new(f.store.clone(), f.registry.clone());
        let approval = governance
            .approve(&report.policy_id, Some("credit-head"))
            .await
            .unwrap();
        assert_eq!(approval.records_updated, 1);
        assert_eq!(approval.chunks_updated, 1);
        assert!(f.registry.has_active().await.unwrap());

        let after = retriever
            .retrieve_layer(Layer::SectorRules, "warehouse receipts", 5, "Goa", "warehouse")
            .await
            .unwrap();
        assert_eq!(after.len(), 1);
    }

    #[tokio::test]
    async fn registry_only_approval_leaves_chunks_draft() {
        let f = fixture();
        let report = f.ingestor.ingest(draft_request()).await.unwrap();

        let governance =
            PolicyGovernance::new(f.store.clone(), f.registry.clone()).with_chunk_sync(false);
        let approval = governance.approve(&report.policy_id, None).await.unwrap();
        assert_eq!(approval.chunks_updated, 0);

        let snippets = ScopedRetriever::new(f.store.clone())
            .retrieve_layer(Layer::SectorRules, "warehouse", 5, "ALL", "warehouse")
            .await
            .unwrap();
        assert!(snippets.is_empty());
    }

    #[tokio::test]
    async fn unknown_policy_is_not_found() {
        let f = fixture();
        let governance = PolicyGovernance::new(f.store.clone(), f.registry.clone());
        let id = PolicyId::new(&Scope::wildcard(), Layer::BasePolicy, "missing");
        let err = governance.approve(&id, None).await.unwrap_err();
        assert!(matches!(err, Error::Registry(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn approval_is_audited() {
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(AuditLog::new(dir.path().join("audit_log.jsonl")));
        let f = fixture();
        let report = f.ingestor.ingest(draft_request()).await.unwrap();

        PolicyGovernance::new(f.store.clone(), f.registry.clone())
            .with_audit(audit.clone())
            .approve(&report.policy_id, Some("reviewer"))
            .await
            .unwrap();

        let events = audit.read_all().await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            AuditEvent::PolicyApproved { approved_by: Some(who), chunks_updated: 1, .. } if who == "reviewer"
        ));
    }

    #[tokio::test]
    async fn failed_chunk_update_leaves_registry_draft() {
        let store = Arc::new(
            LayerStore::in_memory(Arc::new(HashingEmbedder::new(128))).with_collection(
                Layer::SectorRules,
                Arc::new(FrozenCollection(InMemoryCollection::new("sector_rules"))),
            ),
        );
        let registry = Arc::new(PolicyRegistry::in_memory());
        let report = PolicyIngestor::new(store.clone(), registry.clone(), Chunker::default())
            .ingest(draft_request())
            .await
            .unwrap();

        let err = PolicyGovernance::new(store.clone(), registry.clone())
            .approve(&report.policy_id, Some("credit-head"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Retrieval(RetrievalError::Unavailable(_))));

        assert!(!registry.has_active().await.unwrap());
        let entry = registry.get(&report.policy_id).await.unwrap().unwrap();
        assert_eq!(entry.status, PolicyStatus::Draft);
    }

    #[tokio::test]
    async fn failed_registry_write_reverts_chunk_status() {
        let store = Arc::new(LayerStore::in_memory(Arc::new(HashingEmbedder::new(128))));
        let storage = Arc::new(LockableStorage::default());
        let registry = Arc::new(PolicyRegistry::new(storage.clone()));
        let report = PolicyIngestor::new(store.clone(), registry.clone(), Chunker::default())
            .ingest(draft_request())
            .await
            .unwrap();

        storage.read_only.store(true, Ordering::SeqCst);
        let err = PolicyGovernance::new(store.clone(), registry.clone())
            .approve(&report.policy_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Registry(RegistryError::Storage(_))));

        assert!(!registry.has_active().await.unwrap());
        let active = store
            .count(Layer::SectorRules, &active_chunks(&report.policy_id))
            .await
            .unwrap();
        assert_eq!(active, 0);
    }
}
