//! Service assembly from [`AppConfig`].
//!
//! Builds the embedder, the layer store, the registry and the audit log
//! once, and hands out the services that share them.

use chrono::Utc;
use policygate_config::AppConfig;
use policygate_core::{Error, Result};
use policygate_store::{AuditEvent, AuditLog, Chunker, LayerStore, PolicyRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::governance::PolicyGovernance;
use crate::ingest::PolicyIngestor;
use crate::orchestrator::RetrievalOrchestrator;
use crate::retriever::ScopedRetriever;

pub struct PolicyGate {
    config: AppConfig,
    store: Arc<LayerStore>,
    registry: Arc<PolicyRegistry>,
    audit: Arc<AuditLog>,
}

impl PolicyGate {
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        config.validate().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;

        let embedder = policygate_embeddings::from_config(&config.embedding)?;
        let timeout = Duration::from_secs(config.retrieval.timeout_secs);

        let (store, registry) = match config.storage.backend.as_str() {
            "memory" => (
                LayerStore::in_memory(embedder),
                PolicyRegistry::in_memory(),
            ),
            _ => (
                LayerStore::sqlite(&config.storage.layers_dir(), embedder).await?,
                PolicyRegistry::json_file(config.storage.registry_path()),
            ),
        };
        let audit = AuditLog::new(config.storage.audit_path());

        info!(
            backend = %config.storage.backend,
            registry = registry.storage_name(),
            data_dir = %config.storage.data_dir().display(),
            "PolicyGate runtime ready"
        );

        Ok(Self {
            store: Arc::new(store.with_timeout(timeout)),
            registry: Arc::new(registry),
            audit: Arc::new(audit),
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<LayerStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn ingestor(&self) -> Result<PolicyIngestor> {
        let chunker = Chunker::new(self.config.chunking.size, self.config.chunking.overlap)?;
        Ok(
            PolicyIngestor::new(self.store.clone(), self.registry.clone(), chunker)
                .with_audit(self.audit.clone()),
        )
    }

    pub fn governance(&self) -> PolicyGovernance {
        PolicyGovernance::new(self.store.clone(), self.registry.clone())
            .with_chunk_sync(self.config.retrieval.sync_chunk_status)
            .with_audit(self.audit.clone())
    }

    pub fn orchestrator(&self) -> RetrievalOrchestrator {
        let retriever = ScopedRetriever::new(self.store.clone())
            .with_dedup_prefix(self.config.retrieval.dedup_prefix_chars);
        RetrievalOrchestrator::new(self.registry.clone(), retriever)
            .with_max_concurrency(self.config.retrieval.max_concurrency)
            .with_audit(self.audit.clone())
    }

    /// Record a human escalation of a case.
    pub async fn escalate(
        &self,
        case_id: Option<&str>,
        raised_by: Option<&str>,
        reason: &str,
    ) -> Result<()> {
        let event = AuditEvent::Escalation {
            timestamp: Utc::now(),
            case_id: case_id.map(str::to_string),
            raised_by: raised_by.map(str::to_string),
            reason: reason.to_string(),
        };
        self.audit
            .append(&event)
            .await
            .map_err(|e| Error::Internal(format!("Failed to write audit log: {e}")))?;
        info!(case_id = case_id.unwrap_or("-"), "Escalation recorded");
        Ok(())
    }
}
