//! Registry storage trait: durable load-all / replace-all of the policy
//! governance records.

use async_trait::async_trait;

use crate::error::RegistryError;
use crate::policy::PolicyVersion;

/// Persists the registry as a single record collection that survives
/// process restart.
///
/// Implementations: JSON file, in-memory (for testing).
#[async_trait]
pub trait RegistryStorage: Send + Sync {
    /// Backend name (e.g., "json_file", "in_memory").
    fn name(&self) -> &str;

    /// Load every record, insertion order.
    async fn load_all(&self) -> Result<Vec<PolicyVersion>, RegistryError>;

    /// Atomically replace the whole collection.
    async fn replace_all(&self, records: &[PolicyVersion]) -> Result<(), RegistryError>;
}
