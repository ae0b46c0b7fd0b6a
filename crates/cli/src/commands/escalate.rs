//! `policygate escalate`: Record a case escalation.

pub async fn run(
    reason: &str,
    case_id: Option<&str>,
    raised_by: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let gate = super::runtime().await?;
    gate.escalate(case_id, raised_by, reason).await?;
    println!("⚠️  Escalation recorded in {}", gate.audit().path().display());
    Ok(())
}
