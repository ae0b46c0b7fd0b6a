//! `policygate approve`: Activate a draft policy version.

use policygate_core::PolicyId;

pub async fn run(policy_id: &str, approved_by: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let (scope, layer, version) = PolicyId::parse(policy_id)?;
    let policy_id = PolicyId::new(&scope, layer, &version);

    let gate = super::runtime().await?;
    let report = gate.governance().approve(&policy_id, approved_by).await?;

    println!("✅ Approved {}", report.policy_id);
    println!("   Registry records: {}", report.records_updated);
    println!("   Chunks activated: {}", report.chunks_updated);
    if report.chunks_updated == 0 && gate.config().retrieval.sync_chunk_status {
        println!("   ⚠️  No chunks found for this policy in the layer store");
    }

    Ok(())
}
