//! Policy ingestion: validate scope → chunk → upsert chunks → register.

use chrono::Utc;
use policygate_core::{
    Error, IngestError, Layer, PolicyId, PolicyStatus, PolicyVersion, Result, Scope,
};
use policygate_store::{AuditEvent, AuditLog, Chunker, LayerStore, PolicyRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub layer: Layer,
    pub state: String,
    pub sector: String,
    pub version: String,
    pub status: PolicyStatus,
    pub doc_name: String,
    /// Extracted document text
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub policy_id: PolicyId,
    pub layer: Layer,
    pub status: PolicyStatus,
    pub chunk_count: usize,
}

pub struct PolicyIngestor {
    store: Arc<LayerStore>,
    registry: Arc<PolicyRegistry>,
    chunker: Chunker,
    audit: Option<Arc<AuditLog>>,
}

impl PolicyIngestor {
    pub fn new(store: Arc<LayerStore>, registry: Arc<PolicyRegistry>, chunker: Chunker) -> Self {
        Self {
            store,
            registry,
            chunker,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Ingest one policy document.
    ///
    /// Scope and version are validated before anything is chunked or
    /// written. Re-ingesting an existing id replaces its chunks and appends
    /// a new registry record. Chunks are written before the registry record;
    /// if the record cannot be stored the chunks are removed again.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport> {
        let scope = Scope::new(&request.state, &request.sector)?;
        let entry = PolicyVersion::new(
            request.layer,
            scope,
            &request.version,
            request.status,
            request.doc_name,
        )?;

        if request.text.trim().is_empty() {
            return Err(IngestError::EmptyDocument(entry.doc_name.clone()).into());
        }

        let chunks = self.chunker.chunk(&request.text);
        let written = self
            .store
            .upsert(&entry.policy_id, &chunks, &entry.chunk_metadata())
            .await?;
        if written != chunks.len() {
            return Err(Error::Internal(format!(
                "wrote {written} of {} chunks for {}",
                chunks.len(),
                entry.policy_id
            )));
        }

        let report = IngestReport {
            policy_id: entry.policy_id.clone(),
            layer: entry.layer,
            status: entry.status,
            chunk_count: written,
        };
        let doc_name = entry.doc_name.clone();
        if let Err(e) = self.registry.add(entry).await {
            // Unregistered chunks must not stay retrievable.
            if let Err(cleanup) = self.store.remove(report.layer, &report.policy_id).await {
                warn!(
                    policy_id = %report.policy_id,
                    error = %cleanup,
                    "Could not remove unregistered chunks"
                );
            }
            return Err(e.into());
        }

        info!(
            policy_id = %report.policy_id,
            status = %report.status,
            chunks = report.chunk_count,
            "Policy ingested"
        );

        if let Some(audit) = &self.audit {
            let event = AuditEvent::PolicyIngested {
                timestamp: Utc::now(),
                policy_id: report.policy_id.clone(),
                layer: report.layer,
                status: report.status,
                doc_name,
                chunk_count: report.chunk_count,
            };
            if let Err(e) = audit.append(&event).await {
                warn!(error = %e, "Failed to write audit event");
            }
        }

        Ok(report)
    }
}
