//! Append-only audit trail: one JSON object per line.
//!
//! Each line is an [`AuditEvent`] tagged by its `event` field. Lines that
//! fail to parse are skipped on read so a torn final write does not hide
//! the rest of the history.

use chrono::{DateTime, Utc};
use policygate_core::{Layer, PolicyId, PolicyStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    PolicyIngested {
        timestamp: DateTime<Utc>,
        policy_id: PolicyId,
        layer: Layer,
        status: PolicyStatus,
        doc_name: String,
        chunk_count: usize,
    },
    PolicyApproved {
        timestamp: DateTime<Utc>,
        policy_id: PolicyId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        approved_by: Option<String>,
        chunks_updated: usize,
    },
    CaseRetrieved {
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        case_id: Option<String>,
        state: String,
        sector: String,
        query: String,
        k_per_layer: usize,
        /// Snippet count per layer name.
        snippets: BTreeMap<String, usize>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        degraded: Vec<Layer>,
    },
    Escalation {
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        case_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raised_by: Option<String>,
        reason: String,
    },
}

impl AuditEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AuditEvent::PolicyIngested { timestamp, .. }
            | AuditEvent::PolicyApproved { timestamp, .. }
            | AuditEvent::CaseRetrieved { timestamp, .. }
            | AuditEvent::Escalation { timestamp, .. } => *timestamp,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::PolicyIngested { .. } => "policy_ingested",
            AuditEvent::PolicyApproved { .. } => "policy_approved",
            AuditEvent::CaseRetrieved { .. } => "case_retrieved",
            AuditEvent::Escalation { .. } => "escalation",
        }
    }
}

pub struct AuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    /// The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, event: &AuditEvent) -> std::io::Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(event = event.kind(), path = %self.path.display(), "Audit event recorded");
        Ok(())
    }

    /// Every readable event, oldest first. A missing file reads as empty.
    pub async fn read_all(&self) -> std::io::Result<Vec<AuditEvent>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<AuditEvent>(line) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable audit line");
                    None
                }
            })
            .collect())
    }
}
