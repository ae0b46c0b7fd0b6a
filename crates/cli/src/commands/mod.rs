pub mod approve;
pub mod escalate;
pub mod ingest;
pub mod init;
pub mod policies;
pub mod retrieve;
pub mod status;

use policygate_config::AppConfig;
use policygate_retrieval::PolicyGate;

/// Load the config and assemble the runtime every command works against.
pub async fn runtime() -> Result<PolicyGate, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(PolicyGate::from_config(config).await?)
}
