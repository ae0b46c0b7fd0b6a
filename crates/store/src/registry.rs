//! Policy registry: governance records for every ingested policy version.
//!
//! The registry is append-only history: re-ingesting a `policy_id` adds a
//! new record instead of replacing the old one. [`PolicyRegistry::latest`]
//! collapses the history to one record per id.
//!
//! Every mutation is read-modify-write through a [`RegistryStorage`];
//! an in-process mutex serializes mutations. Writers in different processes
//! are not coordinated (last write wins).

use async_trait::async_trait;
use chrono::Utc;
use policygate_core::{PolicyId, PolicyStatus, PolicyVersion, RegistryError, RegistryStorage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

pub struct PolicyRegistry {
    storage: Arc<dyn RegistryStorage>,
    write_lock: Mutex<()>,
}

impl PolicyRegistry {
    pub fn new(storage: Arc<dyn RegistryStorage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// Registry persisted as a JSON document at `path`.
    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(JsonFileRegistryStorage::new(path)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryRegistryStorage::default()))
    }

    pub fn storage_name(&self) -> &str {
        self.storage.name()
    }

    /// Append a record. No uniqueness check.
    pub async fn add(&self, entry: PolicyVersion) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.storage.load_all().await?;
        info!(policy_id = %entry.policy_id, status = %entry.status, "Registering policy version");
        records.push(entry);
        self.storage.replace_all(&records).await
    }

    /// Set `status` on every record with `policy_id`. Returns how many
    /// records were updated; zero means the id is unknown.
    pub async fn set_status(
        &self,
        policy_id: &PolicyId,
        status: PolicyStatus,
        approved_by: Option<&str>,
    ) -> Result<usize, RegistryError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.storage.load_all().await?;
        let now = Utc::now();

        let mut updated = 0;
        for record in records.iter_mut().filter(|r| &r.policy_id == policy_id) {
            record.status = status;
            record.status_updated_at = Some(now);
            record.approved_by = approved_by.map(str::to_string);
            updated += 1;
        }

        if updated > 0 {
            self.storage.replace_all(&records).await?;
        }
        debug!(%policy_id, status = %status, updated, "Registry status update");
        Ok(updated)
    }

    /// Every record in insertion order.
    pub async fn list(&self) -> Result<Vec<PolicyVersion>, RegistryError> {
        self.storage.load_all().await
    }

    /// One record per `policy_id`: the most recently appended, in the order
    /// each id was first seen.
    pub async fn latest(&self) -> Result<Vec<PolicyVersion>, RegistryError> {
        let records = self.storage.load_all().await?;
        let mut slots: HashMap<PolicyId, usize> = HashMap::new();
        let mut out: Vec<PolicyVersion> = Vec::new();
        for record in records {
            match slots.get(&record.policy_id) {
                Some(&i) => out[i] = record,
                None => {
                    slots.insert(record.policy_id.clone(), out.len());
                    out.push(record);
                }
            }
        }
        Ok(out)
    }

    pub async fn get(&self, policy_id: &PolicyId) -> Result<Option<PolicyVersion>, RegistryError> {
        let records = self.storage.load_all().await?;
        Ok(records.into_iter().rev().find(|r| &r.policy_id == policy_id))
    }

    /// Whether any record is `active`.
    pub async fn has_active(&self) -> Result<bool, RegistryError> {
        Ok(self.storage.load_all().await?.iter().any(PolicyVersion::is_active))
    }
}

/// On-disk document shape.
#[derive(Serialize)]
struct RegistryDocument<'a> {
    policies: &'a [PolicyVersion],
}

/// Either the current `{"policies": [...]}` document or a bare list.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRegistry {
    Document { policies: Vec<PolicyVersion> },
    List(Vec<PolicyVersion>),
}

/// Registry persisted as a single JSON file, replaced atomically by writing
/// a sibling temp file and renaming it over the target.
pub struct JsonFileRegistryStorage {
    path: PathBuf,
}

impl JsonFileRegistryStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "policy_registry.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RegistryStorage for JsonFileRegistryStorage {
    fn name(&self) -> &str {
        "json_file"
    }

    async fn load_all(&self) -> Result<Vec<PolicyVersion>, RegistryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(RegistryError::Storage(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<StoredRegistry>(&content) {
            Ok(StoredRegistry::Document { policies }) | Ok(StoredRegistry::List(policies)) => {
                Ok(policies)
            }
            Err(e) => Err(RegistryError::Corrupted(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn replace_all(&self, records: &[PolicyVersion]) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                RegistryError::Storage(format!("Failed to create registry directory: {e}"))
            })?;
        }

        let body = serde_json::to_string_pretty(&RegistryDocument { policies: records })
            .map_err(|e| RegistryError::Storage(format!("Failed to serialize registry: {e}")))?;

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| RegistryError::Storage(format!("Failed to write registry: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| RegistryError::Storage(format!("Failed to replace registry: {e}")))?;

        debug!(path = %self.path.display(), records = records.len(), "Registry flushed");
        Ok(())
    }
}

/// Registry held in memory only.
#[derive(Default)]
pub struct InMemoryRegistryStorage {
    records: RwLock<Vec<PolicyVersion>>,
}

#[async_trait]
impl RegistryStorage for InMemoryRegistryStorage {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load_all(&self) -> Result<Vec<PolicyVersion>, RegistryError> {
        Ok(self.records.read().await.clone())
    }

    async fn replace_all(&self, records: &[PolicyVersion]) -> Result<(), RegistryError> {
        *self.records.write().await = records.to_vec();
        Ok(())
    }
}
